use crate::AppSpindownToken;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use parking_lot::Mutex;
use scopeguard::defer;
use std::future::Future;
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::select;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Growable set of named workloads that can be awaited together.
///
/// A workload leaves the set only once it has punched out, so any number of
/// waiters, one after another or concurrently, all see the unfinished ones.
pub(crate) struct SpindownRegistry {
    workloads: Mutex<Vec<Workload>>,
    next_id: AtomicU64,
    timeout: Duration,
}

/// Returned when some registered workloads did not punch out within the
/// spindown timeout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "failed to spin down all workloads within the timeout: {spun_down} completed, {timed_out} timed out"
)]
pub struct SpindownTimeout {
    /// Workloads that completed in time.
    pub spun_down: usize,
    /// Workloads still running when the timeout hit.
    pub timed_out: usize,
}

enum CycleState {
    Ongoing,
    Completed,
    TimedOut,
}

impl SpindownRegistry {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            workloads: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            timeout,
        }
    }

    /// Adds a workload (names need not be unique) and returns its token.
    pub(crate) fn register(&self, name: &str) -> AppSpindownToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let workload = Workload::new(id, name);
        let token = workload.token();

        self.workloads.lock().push(workload);

        token
    }

    /// Waits for every registered workload within the default timeout.
    pub(crate) async fn spun_down(&self) -> Result<usize, SpindownTimeout> {
        self.spun_down_within(self.timeout).await
    }

    /// Waits for every registered workload within `timeout`. Workloads
    /// registered during the wait are picked up in a further cycle.
    pub(crate) async fn spun_down_within(
        &self,
        timeout: Duration,
    ) -> Result<usize, SpindownTimeout> {
        info!(timeout = ?timeout, "Spindown initiated");

        let notify_in = Arc::new(Notify::new());
        let notify_out = Arc::clone(&notify_in);

        // `notify_one` stores a permit, so a timer firing between cycles is not lost
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            notify_in.notify_one();
        });
        defer! { timer.abort() }

        let mut seen = HashSet::new();
        let mut count = 0usize;

        loop {
            let batch = self
                .workloads
                .lock()
                .iter()
                .filter(|workload| seen.insert(workload.id))
                .cloned()
                .collect::<Vec<_>>();

            count += batch.len();

            if batch.is_empty() {
                info!(count = count, "Spindown completed");
                return Ok(count);
            }

            info!("Waiting for {} registered workload(s) to complete", batch.len());

            if let Err(error) = self.spin_down_batch(batch, &notify_out).await {
                return Err(SpindownTimeout {
                    spun_down: count - error.timed_out,
                    timed_out: error.timed_out,
                });
            }
        }
    }

    async fn spin_down_batch(
        &self,
        batch: Vec<Workload>,
        timer: &Notify,
    ) -> Result<(), SpindownTimeout> {
        let count = batch.len();
        let mut remaining = count;

        let mut futures = batch
            .into_iter()
            .map(WorkloadFuture::from)
            .collect::<FuturesUnordered<_>>();

        loop {
            let state = select! {
                biased;
                _ = timer.notified() => Self::on_timeout(&futures),
                finished = futures.next() => {
                    let name = finished.map(|(id, name)| {
                        self.forget(id);
                        name
                    });
                    Self::on_completed(name, &futures)
                }
            };

            match state {
                CycleState::Ongoing => remaining -= 1,
                CycleState::Completed => return Ok(()),
                CycleState::TimedOut => {
                    return Err(SpindownTimeout {
                        spun_down: count - remaining,
                        timed_out: remaining,
                    });
                }
            }
        }
    }

    fn forget(&self, id: u64) {
        self.workloads.lock().retain(|workload| workload.id != id);
    }

    fn on_timeout(futures: &FuturesUnordered<WorkloadFuture>) -> CycleState {
        for future in futures {
            error!(
                workload = future.name.as_ref(),
                "Did not complete in time during spindown",
            );
        }

        warn!("Some workloads did not complete gracefully");

        CycleState::TimedOut
    }

    fn on_completed(
        name: Option<Arc<str>>,
        futures: &FuturesUnordered<WorkloadFuture>,
    ) -> CycleState {
        match name {
            Some(name) => info!(workload = name.as_ref(), "Completed gracefully"),
            None => error!(
                alert = true,
                "Polled spindown futures while they are all already completed",
            ),
        }

        if futures.is_empty() {
            info!("All workloads completed gracefully");
            return CycleState::Completed;
        }

        CycleState::Ongoing
    }
}

/// A named workload; the name only shows up in logs.
#[derive(Clone)]
struct Workload {
    id: u64,
    name: Arc<str>,
    done: CancellationToken,
}

impl Workload {
    fn new(id: u64, name: &str) -> Self {
        Self {
            id,
            name: Arc::from(name),
            done: CancellationToken::new(),
        }
    }

    fn token(&self) -> AppSpindownToken {
        AppSpindownToken::new(self.done.clone())
    }
}

/// Resolves to the workload id and name once its token is punched out.
struct WorkloadFuture {
    id: u64,
    name: Arc<str>,
    done: Pin<Box<dyn Future<Output = ()> + Send>>,
}

impl From<Workload> for WorkloadFuture {
    fn from(workload: Workload) -> Self {
        let done = workload.done;

        Self {
            id: workload.id,
            name: workload.name,
            done: Box::pin(async move { done.cancelled().await }),
        }
    }
}

impl Future for WorkloadFuture {
    type Output = (u64, Arc<str>);

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.done.as_mut().poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(()) => Poll::Ready((self.id, Arc::clone(&self.name))),
        }
    }
}
