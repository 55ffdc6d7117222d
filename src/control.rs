//! Abort signalling for long-running acquisition loops.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Requests an abort. Cheap to clone and safe to call from any task.
#[derive(Clone)]
pub struct AbortHandle(Arc<watch::Sender<bool>>);

/// Observed by the loop between steps and during waits.
#[derive(Clone)]
pub struct AbortSignal(watch::Receiver<bool>);

/// Create a connected handle/signal pair.
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle(Arc::new(tx)), AbortSignal(rx))
}

impl AbortHandle {
    /// Ask the loop to stop at the next opportunity.
    pub fn abort(&self) {
        self.0.send_replace(true);
    }
}

impl AbortSignal {
    /// A signal that can never fire.
    pub fn never() -> Self {
        let (_, signal) = abort_pair();
        signal
    }

    /// Whether an abort has been requested.
    pub fn is_aborted(&self) -> bool {
        *self.0.borrow()
    }

    /// Sleep for `duration`, returning early when an abort arrives.
    ///
    /// Returns `true` if the wait ended because of an abort.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_aborted() {
            return true;
        }
        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);
        let rx = &mut self.0;
        let woken = tokio::select! {
            _ = &mut sleep => None,
            changed = rx.wait_for(|aborted| *aborted) => Some(changed.is_ok()),
        };
        match woken {
            None => self.is_aborted(),
            Some(true) => true,
            // Handle dropped: nobody can abort any more
            Some(false) => {
                sleep.await;
                false
            }
        }
    }
}
