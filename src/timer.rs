use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// A one-shot delayed callback for a running round.
///
/// Expiry and cancellation race on a single compare-and-swap, so exactly one
/// of them wins. Dropping the timer cancels it.
#[derive(Debug)]
pub struct RoundTimer {
    state: Arc<AtomicU8>,
    task: AbortHandle,
}

impl RoundTimer {
    pub fn start<F, Fut>(duration: Duration, on_expire: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let state = Arc::new(AtomicU8::new(PENDING));
        let task = tokio::spawn({
            let state = state.clone();
            async move {
                tokio::time::sleep(duration).await;
                if state
                    .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    on_expire().await;
                }
            }
        })
        .abort_handle();

        Self { state, task }
    }

    /// Returns `true` if this call stopped the timer before it fired.
    /// Later calls, and calls after expiry, return `false`.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if cancelled {
            self.task.abort();
        }
        cancelled
    }

    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }

    pub fn has_fired(&self) -> bool {
        self.state.load(Ordering::Acquire) == FIRED
    }
}

impl Drop for RoundTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
