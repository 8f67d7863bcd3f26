//! Streaming call primitives shared by RouteGuide clients and servers.
//!
//! - [`channel`]: an ordered, unbounded message pipe with a single close event.
//! - [`StreamSession`]: one duplex call with an explicit lifecycle and
//!   observer callbacks.
//! - [`AbortableCodec`]: lets a request stream fail the call instead of
//!   half-closing it.
//! - [`CompletionLatch`]: a single-use gate released by a call's terminal event.
//! - [`CallHooks`]: call-start / call-end instrumentation points.

pub mod channel;
pub mod codec;
pub mod error;
pub mod hooks;
pub mod latch;
pub mod session;

pub use channel::{MessageReceiver, MessageSender, channel};
pub use codec::{AbortableCodec, Outgoing};
pub use error::{ChannelError, SessionError};
pub use hooks::{CallHooks, CallScope, NoopHooks, TracingHooks};
pub use latch::CompletionLatch;
pub use session::{SessionObserver, SessionState, StreamSession};
