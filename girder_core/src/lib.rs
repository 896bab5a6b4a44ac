#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![cfg_attr(test, deny(warnings))]

/// Application context.
mod context;
pub use self::context::AppContext;

/// Application spindown registry & tokens.
mod spindown;
pub use self::spindown::{AppSpindown, SpindownTimeout, token::AppSpindownToken};

/// Implements a [`Pivot`] facade for centralized resolution of the pivot directory
mod pivot;
pub use self::pivot::Pivot;

/// Globally recognized field name that, when present in a `tracing` macro call,
/// marks an event as worth an operator's attention.
pub const ALERT_FIELD_NAME: &str = "alert";

/// [Terminates](AppContext::terminate) the global [`AppContext`] and waits for
/// [`AppSpindown`] to complete.
///
/// This is the global shutdown routine for every workload that integrates with
/// the Girder family of crates via [`AppContext`] and [`AppSpindown`]. Await it
/// as the last thing before returning from `main` when the `girder` facade is
/// not used.
pub async fn girder_shutdown() {
    AppContext::terminate();

    AppSpindown::completed().await;
}
