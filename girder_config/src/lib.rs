#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![cfg_attr(test, deny(warnings))]

/// Implements a [`Scanner`] for config files in filesystem.
mod scanner;
pub use self::scanner::Scanner;
pub use self::scanner::file::ConfigFile;

/// Implements an [`Assembler`] for the opinionated [`ConfigBuilder`](config::ConfigBuilder).
mod assembler;
pub use self::assembler::{Assembler, AssemblerChoices};

/// Implements the [`DotEnv`] loader.
mod dotenv;
pub use self::dotenv::DotEnv;

/// Implements [`FlagBindings`] between `clap` arguments and config keys.
mod flags;
pub use self::flags::{BindError, FlagBindings};

/// Implements `serde` helpers shared by config sections.
pub mod de;
