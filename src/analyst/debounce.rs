use portable_atomic::{AtomicBool, Ordering};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

struct Armed {
    handle: JoinHandle<()>,
    fired: Arc<AtomicBool>,
}

/// Delay-and-cancel scheduler. Each `arm` replaces the pending job, so a
/// burst of arms inside the window runs only the last job, once.
///
/// A job whose timer already fired is left to finish; `shutdown` aborts
/// those too so nothing outlives the session.
pub struct Debouncer {
    delay: Duration,
    pending: Option<Armed>,
    running: Vec<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            running: Vec::new(),
        }
    }

    /// Schedule `job` to run after the delay, cancelling any un-fired job.
    pub fn arm<F>(&mut self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.running.retain(|h| !h.is_finished());

        let fired = Arc::new(AtomicBool::new(false));
        let task_fired = Arc::clone(&fired);
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task_fired.store(true, Ordering::Release);
            job.await;
        });

        self.pending = Some(Armed { handle, fired });
    }

    /// Cancel the pending job if its timer has not fired yet.
    /// Returns true when a job was actually cancelled.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(armed) if armed.fired.load(Ordering::Acquire) => {
                self.running.push(armed.handle);
                false
            }
            Some(armed) => {
                armed.handle.abort();
                true
            }
            None => false,
        }
    }

    /// True while a timer is armed and has not fired.
    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|a| !a.fired.load(Ordering::Acquire) && !a.handle.is_finished())
    }

    /// Abort the pending timer and any job still running.
    pub fn shutdown(&mut self) {
        if let Some(armed) = self.pending.take() {
            armed.handle.abort();
        }
        for handle in self.running.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
