use crate::ConfigFile;
use girder_core::Pivot;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub mod file;

/// A small facade for finding the [`ConfigFile`]s of the current binary.
pub struct Scanner;

impl Scanner {
    /// Returns every TOML (`.toml`) and YAML (`.yml`, `.yaml`) file directly
    /// inside the [config directory](Self::resolve_config_dir), ordered
    /// lexicographically by path. Later files override earlier ones.
    ///
    /// Nested directories are not scanned. A missing or unreadable directory
    /// yields no files.
    pub fn find_config_files(dir_name: Option<&str>) -> Vec<ConfigFile> {
        Self::find_config_files_in(&Self::resolve_config_dir(dir_name))
    }

    /// Same as [`find_config_files`](Self::find_config_files), for an already
    /// resolved directory.
    pub fn find_config_files_in(config_dir: &Path) -> Vec<ConfigFile> {
        let entries = match fs::read_dir(config_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut config_files = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|kind| kind.is_file()).unwrap_or(false))
            .filter_map(|entry| ConfigFile::try_at(entry.path()))
            .collect::<Vec<_>>();

        config_files.sort();

        config_files
    }

    /// Resolves the config directory from, in order: the `APP_CONFIG_DIR`
    /// environment variable, the non-blank `path` argument, `"config"`.
    ///
    /// A relative result is joined onto the [pivot directory](Pivot).
    pub fn resolve_config_dir(path: Option<&str>) -> PathBuf {
        let input_path = env::var("APP_CONFIG_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                path.map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from)
            })
            .unwrap_or_else(|| PathBuf::from("config"));

        if input_path.is_absolute() {
            input_path
        } else {
            Pivot::resolve().join(input_path)
        }
    }
}
