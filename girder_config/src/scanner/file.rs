use config::{File, FileFormat, FileSourceFile};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// A single config file, tagged by format.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ConfigFile {
    /// A file like `app.toml`.
    Toml(PathBuf),

    /// A file like `app.yaml` / `app.yml`.
    Yaml(PathBuf),
}

impl ConfigFile {
    /// Creates a [`ConfigFile`] if the extension of `path` is a supported one
    /// (case-insensitively).
    pub fn try_at(path: PathBuf) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();

        match extension.as_str() {
            "toml" => Some(Self::Toml(path)),
            "yml" | "yaml" => Some(Self::Yaml(path)),
            _ => None,
        }
    }

    /// The file path.
    pub fn path(&self) -> &Path {
        match self {
            Self::Toml(path) | Self::Yaml(path) => path,
        }
    }

    /// The `config` crate format of this file.
    pub fn format(&self) -> FileFormat {
        match self {
            Self::Toml(_) => FileFormat::Toml,
            Self::Yaml(_) => FileFormat::Yaml,
        }
    }
}

impl PartialOrd for ConfigFile {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ConfigFile {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path().cmp(other.path())
    }
}

impl From<ConfigFile> for File<FileSourceFile, FileFormat> {
    fn from(value: ConfigFile) -> Self {
        let format = value.format();

        match value {
            ConfigFile::Toml(path) | ConfigFile::Yaml(path) => File::from(path).format(format),
        }
    }
}
