use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::RouteGuideError;

pub const DEFAULT_ADDR: &str = "[::1]:50051";

/// Configuration for the RouteGuide server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on. Port 0 picks an ephemeral port.
    pub addr: SocketAddr,

    /// Feature database to load. `None` uses the bundled database.
    pub feature_db: Option<PathBuf>,

    /// How long in-flight calls may drain after shutdown is requested.
    pub shutdown_grace: Duration,

    /// How long to wait for the server task after it is aborted.
    pub force_shutdown: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0, 0, 0, 0, 1], 50051)),
            feature_db: None,
            shutdown_grace: Duration::from_secs(30),
            force_shutdown: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            ..Default::default()
        }
    }

    /// Read `ROUTE_GUIDE_ADDR` and `ROUTE_GUIDE_DB`, defaulting the rest.
    pub fn from_env() -> Result<Self, RouteGuideError> {
        let addr = std::env::var("ROUTE_GUIDE_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
        let addr = addr
            .parse()
            .map_err(|_| RouteGuideError::InvalidAddress(addr))?;

        let mut config = Self::new(addr);
        if let Ok(path) = std::env::var("ROUTE_GUIDE_DB") {
            config = config.with_feature_db(path);
        }
        Ok(config)
    }

    pub fn with_feature_db(mut self, path: impl Into<PathBuf>) -> Self {
        self.feature_db = Some(path.into());
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_force_shutdown(mut self, timeout: Duration) -> Self {
        self.force_shutdown = timeout;
        self
    }
}
