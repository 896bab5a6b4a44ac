use std::env;
use std::path::PathBuf;

/// Resolves the pivot directory: the directory relative to which config files,
/// dot-env files, templates and static assets are looked up.
///
/// Under Cargo (`cargo run`, `cargo test`, an IDE) this is the directory of the
/// crate's `Cargo.toml`, read from `CARGO_MANIFEST_DIR` at runtime. Otherwise
/// it is the current working directory, or `.` when that is inaccessible.
pub struct Pivot;

impl Pivot {
    /// Returns the pivot directory.
    pub fn resolve() -> PathBuf {
        env::var_os("CARGO_MANIFEST_DIR")
            .map(PathBuf::from)
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn resolves_manifest_dir_under_cargo() {
        // Given
        let expected = PathBuf::from(env!("CARGO_MANIFEST_DIR"));

        // When
        let pivot = Pivot::resolve();

        // Then
        assert_eq!(pivot, expected);
    }
}
