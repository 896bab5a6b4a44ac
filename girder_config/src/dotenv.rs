use girder_core::Pivot;
use std::sync::Once;

const FILE_DOT_ENV_LOCAL: &str = ".env.local";
const FILE_DOT_ENV_GLOBAL: &str = ".env";

/// Loads environment variables from `.env.local` and `.env` in the
/// [pivot directory](Pivot).
pub struct DotEnv;

impl DotEnv {
    /// [Loads](DotEnv::load) the dot-env files at most once per process.
    pub fn tap() {
        static INIT: Once = Once::new();

        INIT.call_once(Self::load);
    }

    /// Loads `.env.local`, then `.env`. Variables already present in the
    /// environment are never overridden, so `.env.local` wins over `.env`.
    /// Missing files are ignored.
    pub fn load() {
        let pivot = Pivot::resolve();

        let _ = dotenvy::from_path(pivot.join(FILE_DOT_ENV_LOCAL));
        let _ = dotenvy::from_path(pivot.join(FILE_DOT_ENV_GLOBAL));
    }
}
