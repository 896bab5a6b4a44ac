use crate::TerraformError;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Component, Path};
use tracing::trace;
use walkdir::WalkDir;

/// Finds every directory under `root` that holds a `.tf` file.
///
/// Directories are returned relative to `root`, `/`-separated, sorted and
/// deduplicated, with `.` standing for `root` itself. Files whose relative
/// path matches any of `exclude_regexes` are ignored.
pub fn find_terraform_modules<I, S>(
    root: impl AsRef<Path>,
    exclude_regexes: I,
) -> Result<Vec<String>, TerraformError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let root = root.as_ref();
    let excludes = exclude_regexes
        .into_iter()
        .map(|pattern| Regex::new(pattern.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut modules = BTreeSet::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry?;

        if !entry.file_type().is_file() || entry.path().extension().is_none_or(|ext| ext != "tf") {
            continue;
        }

        let relative = slash_path(relative_to(entry.path(), root)?);

        if excludes.iter().any(|exclude| exclude.is_match(&relative)) {
            trace!(path = relative.as_str(), "Skipping excluded terraform file");
            continue;
        }

        let directory = match relative.rsplit_once('/') {
            Some((directory, _)) => directory.to_string(),
            None => ".".to_string(),
        };

        modules.insert(directory);
    }

    Ok(modules.into_iter().collect())
}

/// `path` relative to the walk `root` it was found under.
pub(crate) fn relative_to<'a>(path: &'a Path, root: &Path) -> Result<&'a Path, TerraformError> {
    path.strip_prefix(root)
        .map_err(|_| TerraformError::OutsideRoot {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        })
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use scopeguard::defer;

    #[test]
    fn root_module_is_dot() {
        // Given
        let dir = std::env::temp_dir().join(format!("girder-modules-{}", uuid::Uuid::new_v4()));
        defer! { let _ = std::fs::remove_dir_all(&dir); }
        std::fs::create_dir_all(dir.join("child")).unwrap();
        std::fs::write(dir.join("main.tf"), "").unwrap();
        std::fs::write(dir.join("child/outputs.tf"), "").unwrap();
        std::fs::write(dir.join("child/notes.tf.json.bak"), "").unwrap();

        // When
        let modules = find_terraform_modules(&dir, Vec::<String>::new()).unwrap();

        // Then
        assert_eq!(modules, vec![".".to_string(), "child".to_string()]);
    }

    #[test]
    fn relative_to_rejects_foreign_paths() {
        // When
        let inside = relative_to(Path::new("/work/modules/vpc/main.tf"), Path::new("/work"));
        let outside = relative_to(Path::new("/elsewhere/main.tf"), Path::new("/work")).unwrap_err();

        // Then
        assert_eq!(inside.unwrap(), Path::new("modules/vpc/main.tf"));
        assert_eq!(
            outside.to_string(),
            "path '/elsewhere/main.tf' is outside of '/work'",
        );
    }

    #[test]
    fn invalid_exclude_is_an_error() {
        // When
        let error = find_terraform_modules(".", ["("]).unwrap_err();

        // Then
        assert!(matches!(error, TerraformError::InvalidExclude(_)));
    }
}
