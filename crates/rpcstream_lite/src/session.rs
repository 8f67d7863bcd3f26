use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tonic::Status;
use tracing::{debug, warn};

use crate::channel::MessageSender;
use crate::error::SessionError;
use crate::hooks::{CallHooks, CallScope};
use crate::latch::CompletionLatch;

/// Lifecycle of a [`StreamSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Opened, nothing sent yet.
    Open,
    /// At least one request has been sent.
    Sending,
    /// The caller signalled that no more requests follow.
    HalfClosed,
    /// The remote completed the call successfully.
    Completed,
    /// The call ended with an error (remote, transport, or local cancel).
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }

    fn accepts_requests(self) -> bool {
        matches!(self, SessionState::Open | SessionState::Sending)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Open => "open",
            SessionState::Sending => "sending",
            SessionState::HalfClosed => "half-closed",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Upper bound on how long a cancelled call is driven before being dropped.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

type MessageHandler<Resp> = Box<dyn FnMut(Resp) + Send>;
type ErrorHandler = Box<dyn FnOnce(Status) + Send>;
type CompletedHandler = Box<dyn FnOnce() + Send>;

/// Callbacks for the receive side of a session.
///
/// `on_message` runs for each response in arrival order. Exactly one of
/// `on_error` / `on_completed` runs afterwards.
pub struct SessionObserver<Resp> {
    on_message: Option<MessageHandler<Resp>>,
    on_error: Option<ErrorHandler>,
    on_completed: Option<CompletedHandler>,
}

impl<Resp> SessionObserver<Resp> {
    pub fn new() -> Self {
        Self {
            on_message: None,
            on_error: None,
            on_completed: None,
        }
    }

    pub fn on_message<F>(mut self, f: F) -> Self
    where
        F: FnMut(Resp) + Send + 'static,
    {
        self.on_message = Some(Box::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Status) + Send + 'static,
    {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_completed<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_completed = Some(Box::new(f));
        self
    }
}

impl<Resp> Default for SessionObserver<Resp> {
    fn default() -> Self {
        Self::new()
    }
}

struct Lifecycle {
    state: SessionState,
    cause: Option<Status>,
    on_error: Option<ErrorHandler>,
    on_completed: Option<CompletedHandler>,
    scope: Option<CallScope>,
}

struct Shared {
    method: &'static str,
    lifecycle: Mutex<Lifecycle>,
    latch: CompletionLatch,
}

impl Shared {
    fn state(&self) -> SessionState {
        self.lifecycle.lock().state
    }

    /// Move to a terminal state. Only the first caller wins; it runs the
    /// terminal handler, reports the call end and releases the latch.
    fn finish(&self, outcome: Result<(), Status>) -> bool {
        let (on_error, on_completed, scope) = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state.is_terminal() {
                return false;
            }
            match &outcome {
                Ok(()) => lifecycle.state = SessionState::Completed,
                Err(status) => {
                    lifecycle.state = SessionState::Failed;
                    lifecycle.cause = Some(status.clone());
                }
            }
            (
                lifecycle.on_error.take(),
                lifecycle.on_completed.take(),
                lifecycle.scope.take(),
            )
        };

        if let Some(scope) = scope {
            scope.finish(outcome.as_ref().map(|_| ()));
        }
        match outcome {
            Ok(()) => {
                debug!(method = self.method, "Session completed");
                if let Some(on_completed) = on_completed {
                    on_completed();
                }
            }
            Err(status) => {
                debug!(method = self.method, error = %status, "Session failed");
                if let Some(on_error) = on_error {
                    on_error(status);
                }
            }
        }
        self.latch.signal();
        true
    }
}

/// One duplex call: an outbound request channel plus a receive task that
/// drives the inbound response stream into a [`SessionObserver`].
///
/// The receive task runs on its own tokio task so responses are delivered
/// concurrently with sends. Entering `Completed` or `Failed` releases the
/// session's [`CompletionLatch`] exactly once.
pub struct StreamSession<Req> {
    shared: Arc<Shared>,
    outbound: Option<MessageSender<Req>>,
}

impl<Req> StreamSession<Req> {
    /// Open a session and start receiving.
    ///
    /// `inbound` is the response stream of the call. It is dropped as soon as
    /// the session terminates, which tears the call down if it is still live.
    pub fn start<Resp, S>(
        method: &'static str,
        outbound: MessageSender<Req>,
        inbound: S,
        observer: SessionObserver<Resp>,
        hooks: Arc<dyn CallHooks>,
    ) -> Self
    where
        Resp: Send + 'static,
        S: Stream<Item = Result<Resp, Status>> + Send + 'static,
    {
        let SessionObserver {
            on_message,
            on_error,
            on_completed,
        } = observer;

        let shared = Arc::new(Shared {
            method,
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Open,
                cause: None,
                on_error,
                on_completed,
                scope: Some(CallScope::start(hooks, method)),
            }),
            latch: CompletionLatch::new(),
        });

        tokio::spawn(receive(Arc::clone(&shared), inbound, on_message));

        Self {
            shared,
            outbound: Some(outbound),
        }
    }

    pub fn method(&self) -> &'static str {
        self.shared.method
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_terminated(&self) -> bool {
        self.state().is_terminal()
    }

    /// The error that failed the session, if it failed.
    pub fn failure(&self) -> Option<Status> {
        self.shared.lifecycle.lock().cause.clone()
    }

    /// A handle to the latch released when the session terminates.
    pub fn latch(&self) -> CompletionLatch {
        self.shared.latch.clone()
    }

    /// Send one request. Valid only while `Open` or `Sending`.
    pub fn send(&mut self, message: Req) -> Result<(), SessionError> {
        let mut lifecycle = self.shared.lifecycle.lock();
        let state = lifecycle.state;
        let outbound = match self.outbound.as_ref() {
            Some(outbound) if state.accepts_requests() => outbound,
            _ => {
                return Err(SessionError::InvalidState {
                    operation: "send",
                    state,
                });
            }
        };

        if let Err(err) = outbound.push(message) {
            drop(lifecycle);
            warn!(method = self.shared.method, "Outbound channel gone, failing session");
            self.outbound = None;
            self.shared
                .finish(Err(Status::unavailable("outbound channel closed")));
            return Err(err.into());
        }
        lifecycle.state = SessionState::Sending;
        Ok(())
    }

    /// Signal that no more requests follow. Repeated calls are no-ops.
    pub fn half_close(&mut self) -> Result<(), SessionError> {
        let mut lifecycle = self.shared.lifecycle.lock();
        match lifecycle.state {
            SessionState::HalfClosed => Ok(()),
            state if state.accepts_requests() => {
                if let Some(outbound) = self.outbound.take() {
                    outbound.close();
                }
                lifecycle.state = SessionState::HalfClosed;
                Ok(())
            }
            state => Err(SessionError::InvalidState {
                operation: "half-close",
                state,
            }),
        }
    }

    /// Abort the call locally.
    ///
    /// The outbound channel is closed with `cause` so the remote observes a
    /// failure rather than a clean half-close, and the session becomes
    /// `Failed`. Returns `false` if the session had already terminated.
    pub fn cancel(&mut self, cause: Status) -> bool {
        if self.is_terminated() {
            return false;
        }
        if let Some(outbound) = self.outbound.take() {
            outbound.close_with_error(cause.clone());
        }
        self.shared.finish(Err(cause))
    }
}

impl<Req> Drop for StreamSession<Req> {
    fn drop(&mut self) {
        if !self.shared.state().is_terminal() {
            self.cancel(Status::cancelled("session dropped before completion"));
        }
    }
}

impl<Req> fmt::Debug for StreamSession<Req> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("method", &self.shared.method)
            .field("state", &self.state())
            .finish()
    }
}

async fn receive<Resp, S>(shared: Arc<Shared>, inbound: S, on_message: Option<MessageHandler<Resp>>)
where
    S: Stream<Item = Result<Resp, Status>> + Send + 'static,
{
    let mut inbound = Box::pin(inbound);
    let mut on_message = on_message;
    let terminated = shared.latch.clone();

    let outcome = loop {
        tokio::select! {
            biased;
            // Terminated locally (cancel or failed send).
            _ = terminated.signaled() => {
                drain(inbound).await;
                return;
            }
            item = inbound.next() => match item {
                Some(Ok(message)) => {
                    if let Some(handler) = on_message.as_mut() {
                        handler(message);
                    }
                }
                Some(Err(status)) => break Err(status),
                None => break Ok(()),
            },
        }
    };

    shared.finish(outcome);
}

/// Keep polling a locally terminated call so its aborted request body is
/// flushed to the transport. Responses are discarded.
async fn drain<S: Stream + Unpin>(mut inbound: S) {
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while inbound.next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        debug!(timeout = ?DRAIN_TIMEOUT, "Dropping cancelled call that did not end");
    }
}
