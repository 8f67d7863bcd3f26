use std::path::PathBuf;
use std::time::Duration;

use rpcstream_lite::SessionError;
use thiserror::Error;

/// Errors surfaced by the RouteGuide server, client driver and feature loader.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RouteGuideError {
    #[error("failed to read feature database '{path}'")]
    FeatureDbIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse feature database")]
    FeatureDbParse(#[from] serde_json::Error),

    #[error("feature database is empty")]
    NoFeatures,

    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    #[error("transport error")]
    Transport(#[from] tonic::transport::Error),

    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("RPC failed: {0}")]
    Rpc(Box<tonic::Status>),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("{rpc} did not finish within {timeout:?}")]
    Timeout {
        rpc: &'static str,
        timeout: Duration,
    },

    #[error("background task failed")]
    Task(#[from] tokio::task::JoinError),
}

impl RouteGuideError {
    /// The RPC status behind this error, if it came from a call.
    pub fn status(&self) -> Option<&tonic::Status> {
        match self {
            RouteGuideError::Rpc(status) => Some(status.as_ref()),
            RouteGuideError::Session(SessionError::Remote(status)) => Some(status.as_ref()),
            _ => None,
        }
    }
}

impl From<tonic::Status> for RouteGuideError {
    fn from(status: tonic::Status) -> Self {
        RouteGuideError::Rpc(Box::new(status))
    }
}
