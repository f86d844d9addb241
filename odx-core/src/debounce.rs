//! Single-slot debounce timer.
//!
//! Every debounce site in the system (slider drag preview, storage
//! persistence, the background population trigger, mutation re-assertion)
//! follows the same discipline: one pending delayed task; a new request
//! unconditionally cancels and replaces it. There is no coalescing of
//! intermediate values beyond "last value wins".

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// A cancellable delayed task slot.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    /// Create a slot firing `delay` after the most recent request.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Schedule `action` to run after the delay, cancelling any pending one.
    pub fn call<F>(&mut self, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        }));
    }

    /// Drop any pending task without running it.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// Whether a task is scheduled and has not yet run to completion.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
