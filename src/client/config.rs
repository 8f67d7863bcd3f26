use std::time::Duration;

pub const DEFAULT_TARGET: &str = "http://[::1]:50051";

/// Configuration for the RouteGuide client driver.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server URI, e.g. `http://[::1]:50051`.
    pub target: String,

    /// How long to wait for a streaming call to finish after half-close.
    pub rpc_timeout: Duration,

    /// Number of points sent by RecordRoute.
    pub point_count: usize,

    /// Bounds of the random pause between RecordRoute points.
    pub min_point_delay: Duration,
    pub max_point_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            rpc_timeout: Duration::from_secs(60),
            point_count: 10,
            min_point_delay: Duration::from_millis(500),
            max_point_delay: Duration::from_millis(1500),
        }
    }
}

impl ClientConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    /// Read `ROUTE_GUIDE_TARGET` and `ROUTE_GUIDE_POINTS`, defaulting the rest.
    /// An unparsable point count keeps the default.
    pub fn from_env() -> Self {
        let target =
            std::env::var("ROUTE_GUIDE_TARGET").unwrap_or_else(|_| DEFAULT_TARGET.to_string());
        let mut config = Self::new(target);
        if let Some(points) = std::env::var("ROUTE_GUIDE_POINTS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.point_count = points;
        }
        config
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    pub fn with_point_count(mut self, count: usize) -> Self {
        self.point_count = count;
        self
    }

    /// Set the pause bounds. Reversed bounds are swapped.
    pub fn with_point_delay(mut self, min: Duration, max: Duration) -> Self {
        self.min_point_delay = min.min(max);
        self.max_point_delay = min.max(max);
        self
    }
}
