use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// A single-use gate released by the terminal event of a call.
///
/// Cloning yields another handle to the same latch. `signal` releases it once;
/// later calls have no effect. Waiters can block a thread with
/// [`wait_timeout`](Self::wait_timeout) or suspend a task with
/// [`wait`](Self::wait).
#[derive(Clone, Default)]
pub struct CompletionLatch {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    released: Mutex<bool>,
    condvar: Condvar,
    notify: Notify,
}

impl CompletionLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release the latch. Returns `true` only for the call that released it.
    pub fn signal(&self) -> bool {
        let mut released = self.inner.released.lock();
        if *released {
            return false;
        }
        *released = true;
        drop(released);

        self.inner.condvar.notify_all();
        self.inner.notify.notify_waiters();
        true
    }

    pub fn is_signaled(&self) -> bool {
        *self.inner.released.lock()
    }

    /// Block the calling thread until released or `timeout` elapses.
    ///
    /// Must not be called from an async worker thread; use [`wait`](Self::wait)
    /// there instead.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut released = self.inner.released.lock();
        if !*released {
            self.inner
                .condvar
                .wait_while_for(&mut released, |released| !*released, timeout);
        }
        *released
    }

    /// Suspend the calling task until released or `timeout` elapses.
    pub async fn wait(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.signaled()).await.is_ok()
    }

    /// Resolves once the latch is released.
    pub async fn signaled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent signal is not missed.
            notified.as_mut().enable();
            if self.is_signaled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CompletionLatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionLatch")
            .field("signaled", &self.is_signaled())
            .finish()
    }
}
