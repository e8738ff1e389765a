use tokio_util::sync::CancellationToken;

/// Cooperative cancellation for an in-flight stream, backoff sleep or poll loop.
///
/// Cloning shares the underlying token; cancelling any clone cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
