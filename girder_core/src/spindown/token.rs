use tokio_util::sync::CancellationToken;

/// Issued to every workload registered with [`AppSpindown`](crate::AppSpindown).
///
/// [Punching out](AppSpindownToken::punch_out) tells the registry that the
/// workload has released its resources. Dropping the token does the same.
pub struct AppSpindownToken {
    done: CancellationToken,
}

impl AppSpindownToken {
    pub(crate) fn new(done: CancellationToken) -> Self {
        Self { done }
    }

    /// Marks the associated workload as completed.
    pub fn punch_out(&self) {
        self.done.cancel();
    }
}

impl Drop for AppSpindownToken {
    fn drop(&mut self) {
        self.punch_out();
    }
}
