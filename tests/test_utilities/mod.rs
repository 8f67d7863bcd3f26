use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use route_guide::client::{ClientConfig, RouteGuideDriver};
use route_guide::grpc::{GrpcServer, ServerConfig, ServerHandle};
use route_guide::routeguide::route_guide_client::RouteGuideClient;
use route_guide::{FeatureTable, RouteGuideError, RouteGuideHandlers};
use rpcstream_lite::CallHooks;
use tonic::transport::Channel;
use tonic::{Code, Status};

/// A RouteGuide server on an ephemeral localhost port.
pub struct TestServer {
    pub handlers: RouteGuideHandlers,
    pub hooks: Arc<RecordingHooks>,
    handle: ServerHandle,
}

impl TestServer {
    pub async fn start() -> Result<Self, RouteGuideError> {
        let config = ServerConfig::new("127.0.0.1:0".parse().expect("valid addr"))
            .with_shutdown_grace(Duration::from_secs(2))
            .with_force_shutdown(Duration::from_secs(1));
        let hooks = Arc::new(RecordingHooks::default());
        let server = GrpcServer::bind(config, Arc::new(FeatureTable::bundled()?))
            .await?
            .with_hooks(hooks.clone());
        let handlers = server.handlers().clone();
        let handle = server.spawn()?;

        Ok(Self {
            handlers,
            hooks,
            handle,
        })
    }

    pub fn endpoint(&self) -> String {
        self.handle.endpoint()
    }

    pub async fn client(&self) -> RouteGuideClient<Channel> {
        RouteGuideClient::connect(self.endpoint())
            .await
            .expect("connect route guide client")
    }

    /// A driver with short pauses so RecordRoute runs fast.
    pub async fn driver(&self) -> RouteGuideDriver {
        let config = ClientConfig::new(self.endpoint())
            .with_rpc_timeout(Duration::from_secs(10))
            .with_point_count(3)
            .with_point_delay(Duration::ZERO, Duration::from_millis(10));
        RouteGuideDriver::connect(config)
            .await
            .expect("connect driver")
    }

    pub async fn stop(self) {
        self.handle.stop().await.expect("server stops cleanly");
    }
}

/// Server-side call events: `(event, method, error code)`.
#[derive(Default)]
pub struct RecordingHooks {
    events: Mutex<Vec<(&'static str, String, Option<Code>)>>,
}

impl RecordingHooks {
    /// The end event for `method`, if the call has finished.
    pub fn finished(&self, method: &str) -> Option<Option<Code>> {
        self.events
            .lock()
            .iter()
            .find(|(event, m, _)| *event == "end" && m == method)
            .map(|(_, _, code)| *code)
    }

    pub fn started(&self, method: &str) -> bool {
        self.events
            .lock()
            .iter()
            .any(|(event, m, _)| *event == "start" && m == method)
    }

    /// Poll until `check` returns `Some` or `timeout` passes.
    pub async fn wait_for<T>(
        &self,
        timeout: Duration,
        mut check: impl FnMut(&Self) -> Option<T>,
    ) -> Option<T> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(found) = check(self) {
                return Some(found);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl CallHooks for RecordingHooks {
    fn call_started(&self, method: &str) {
        self.events.lock().push(("start", method.to_string(), None));
    }

    fn call_finished(&self, method: &str, _elapsed: Duration, outcome: Result<(), &Status>) {
        self.events
            .lock()
            .push(("end", method.to_string(), outcome.err().map(Status::code)));
    }
}
