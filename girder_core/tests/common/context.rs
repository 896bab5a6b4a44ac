use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use girder_core::AppContext;

/// Spawns background listeners on the global [`AppContext`] and checks
/// whether they have been released.
pub struct QuitListeners {
    released: Vec<Arc<AtomicBool>>,
}

impl QuitListeners {
    pub fn new() -> Self {
        Self { released: vec![] }
    }

    /// Spawns a task that flips its marker once the context is terminated.
    pub async fn spawn(&mut self) {
        let marker = Arc::new(AtomicBool::new(false));

        tokio::spawn(Self::release_on_quit(Arc::clone(&marker)));
        self.released.push(marker);

        tokio::task::yield_now().await;
    }

    async fn release_on_quit(marker: Arc<AtomicBool>) {
        AppContext::terminated().await;

        marker.store(true, Ordering::SeqCst);
    }

    pub fn assert_all_waiting(&self) {
        for marker in &self.released {
            assert_eq!(marker.load(Ordering::SeqCst), false);
        }
    }

    pub fn assert_all_released(&self) {
        for marker in &self.released {
            assert_eq!(marker.load(Ordering::SeqCst), true);
        }
    }
}
