use std::sync::Arc;
use std::time::{Duration, Instant};
use tonic::Status;
use tracing::{debug, warn};

/// Instrumentation attached around every call boundary.
///
/// `call_started` fires when a call is opened; `call_finished` fires exactly
/// once when it reaches a terminal outcome.
pub trait CallHooks: Send + Sync + 'static {
    fn call_started(&self, _method: &str) {}

    fn call_finished(&self, _method: &str, _elapsed: Duration, _outcome: Result<(), &Status>) {}
}

/// Logs call boundaries through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHooks;

impl CallHooks for TracingHooks {
    fn call_started(&self, method: &str) {
        debug!(method, "Call started");
    }

    fn call_finished(&self, method: &str, elapsed: Duration, outcome: Result<(), &Status>) {
        match outcome {
            Ok(()) => debug!(method, elapsed_ms = elapsed.as_millis() as u64, "Call finished"),
            Err(status) => warn!(
                method,
                elapsed_ms = elapsed.as_millis() as u64,
                code = ?status.code(),
                error = %status.message(),
                "Call failed"
            ),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl CallHooks for NoopHooks {}

/// Guard for one call: reports the start on creation and the end exactly once.
///
/// Dropping an unfinished scope reports the call as cancelled.
pub struct CallScope {
    hooks: Arc<dyn CallHooks>,
    method: &'static str,
    started: Instant,
    finished: bool,
}

impl CallScope {
    pub fn start(hooks: Arc<dyn CallHooks>, method: &'static str) -> Self {
        hooks.call_started(method);
        Self {
            hooks,
            method,
            started: Instant::now(),
            finished: false,
        }
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn finish(mut self, outcome: Result<(), &Status>) {
        self.report(outcome);
    }

    fn report(&mut self, outcome: Result<(), &Status>) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.hooks
            .call_finished(self.method, self.started.elapsed(), outcome);
    }
}

impl Drop for CallScope {
    fn drop(&mut self) {
        if !self.finished {
            let status = Status::cancelled("call dropped before completion");
            self.report(Err(&status));
        }
    }
}

impl std::fmt::Debug for CallScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallScope")
            .field("method", &self.method)
            .field("finished", &self.finished)
            .finish()
    }
}
