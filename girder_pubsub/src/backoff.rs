use crate::BackoffConfig;
use backoff::backoff::Backoff as InnerBackoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use parking_lot::Mutex as SyncMutex;
use std::time::Duration;

/// Exponential backoff between reconnection attempts, shareable across tasks.
pub struct Backoff {
    inner: SyncMutex<ExponentialBackoff>,
}

impl Backoff {
    /// Builds a backoff from the given [`BackoffConfig`].
    pub fn new(config: impl AsRef<BackoffConfig>) -> Self {
        let config = config.as_ref();
        let inner = ExponentialBackoffBuilder::new()
            .with_initial_interval(config.initial_interval)
            .with_max_interval(config.max_interval)
            .with_randomization_factor(config.randomization_factor)
            .with_multiplier(config.multiplier)
            .with_max_elapsed_time(config.max_elapsed_time)
            .build();

        Self {
            inner: SyncMutex::new(inner),
        }
    }

    /// Returns the next delay, or [`None`] once the maximum elapsed time is
    /// exceeded.
    pub fn next(&self) -> Option<Duration> {
        self.inner.lock().next_backoff()
    }

    /// Resets this backoff to the initial interval.
    pub fn reset(&self) {
        self.inner.lock().reset();
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn grows_without_jitter() {
        // Given
        let backoff = Backoff::new(BackoffConfig {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(300),
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_elapsed_time: None,
        });

        // When
        let delays = (0..4).filter_map(|_| backoff.next()).collect::<Vec<_>>();

        // Then
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300),
                Duration::from_millis(300),
            ],
        );

        // When
        backoff.reset();

        // Then
        assert_eq!(backoff.next(), Some(Duration::from_millis(100)));
    }
}
