use thiserror::Error;

use crate::session::SessionState;

/// Errors that can occur while pushing into a message channel.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChannelError {
    /// The consuming half was dropped; nobody will observe the message.
    #[error("message channel receiver dropped")]
    ReceiverDropped,
}

/// Errors returned by [`StreamSession`](crate::StreamSession) operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// The operation is not valid for the session's current lifecycle state.
    #[error("cannot {operation} a session that is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// The outbound channel was closed underneath the session.
    #[error("outbound channel closed")]
    ChannelClosed(#[from] ChannelError),

    /// The peer (or the transport) terminated the call with an error.
    #[error("remote failure: {0}")]
    Remote(Box<tonic::Status>),
}

impl From<tonic::Status> for SessionError {
    fn from(status: tonic::Status) -> Self {
        SessionError::Remote(Box::new(status))
    }
}

impl SessionError {
    /// Convert into the gRPC status reported to a peer.
    pub fn into_status(self) -> tonic::Status {
        match self {
            SessionError::InvalidState { .. } => tonic::Status::failed_precondition(self.to_string()),
            SessionError::ChannelClosed(_) => tonic::Status::unavailable(self.to_string()),
            SessionError::Remote(status) => *status,
        }
    }
}
