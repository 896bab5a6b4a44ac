use self::registry::SpindownRegistry;
use crate::AppSpindownToken;
use parking_lot::Mutex;
use std::sync::OnceLock;
use std::time::Duration;

mod registry;
pub mod token;

pub use self::registry::SpindownTimeout;

// Process-wide wait-group
static GLOBAL: OnceLock<SpindownRegistry> = OnceLock::new();

const DEFAULT_TIMEOUT_SECS: u64 = 2;
static TIMEOUT_SECS: Mutex<u64> = Mutex::new(DEFAULT_TIMEOUT_SECS);

/// Facade over the process-wide spindown registry, a wait-group for background
/// workloads.
///
/// A background task [registers](AppSpindown::register) a named workload, waits
/// for the [`AppContext`](crate::AppContext) to be terminated, releases its
/// resources and finally [punches out](AppSpindownToken::punch_out). The main
/// routine terminates the context and then [waits](AppSpindown::completed) for
/// every registered workload, within a timeout.
///
/// Waiting happens in cycles that share one timeout: workloads registered while
/// an earlier batch spins down are awaited as well.
///
/// The registry does **not** tell workloads to stop. That is the job of the
/// [`AppContext`](crate::AppContext).
pub struct AppSpindown;

impl AppSpindown {
    /// Registers a workload with the given human-readable name. The returned
    /// token must be punched out (or dropped) once the workload has cleaned up.
    pub fn register(name: impl AsRef<str>) -> AppSpindownToken {
        Self::global_registry().register(name.as_ref())
    }

    /// Sets the timeout used by [`AppSpindown::completed`]. Only takes effect
    /// when called before the first interaction with the registry.
    pub fn set_timeout_secs(timeout_secs: impl Into<u64>) {
        *TIMEOUT_SECS.lock() = timeout_secs.into();
    }

    /// Waits for all registered workloads within the configured
    /// [timeout](AppSpindown::set_timeout_secs). Workloads that fail to
    /// complete in time are logged and stay registered for later waits.
    pub async fn completed() {
        let _ = Self::global_registry().spun_down().await;
    }

    /// Waits for all registered workloads within the given `timeout`, reporting
    /// how many completed, or how many did not make it.
    pub async fn completed_within(timeout: Duration) -> Result<usize, SpindownTimeout> {
        Self::global_registry().spun_down_within(timeout).await
    }

    fn global_registry() -> &'static SpindownRegistry {
        GLOBAL.get_or_init(|| SpindownRegistry::new(Duration::from_secs(*TIMEOUT_SECS.lock())))
    }
}
