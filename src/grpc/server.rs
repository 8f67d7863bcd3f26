use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rpcstream_lite::{CallHooks, CallScope, MessageReceiver, TracingHooks};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tonic::{Request, Response, Status, Streaming};
use tracing::{error, info, warn};

use crate::error::RouteGuideError;
use crate::features::FeatureTable;
use crate::grpc::config::ServerConfig;
use crate::grpc::greeter::GreeterService;
use crate::handlers::RouteGuideHandlers;
use crate::helloworld::greeter_server::GreeterServer;
use crate::methods;
use crate::notes::NoteLog;
use crate::routeguide::route_guide_server::{RouteGuide, RouteGuideServer};
use crate::routeguide::{Feature, Point, Rectangle, RouteNote, RouteSummary};

/// Background tasks that produce streamed responses, one per call.
///
/// Cancelling drops every call still running, which ends its response stream
/// as `CANCELLED` and reports the call through its [`CallScope`].
#[derive(Debug, Clone, Default)]
pub struct CallTasks {
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl CallTasks {
    pub fn spawn<F>(&self, call: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = call => {}
            }
        });
    }

    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    pub fn cancel_all(&self) {
        self.shutdown.cancel();
    }

    /// Wait until every call task has ended.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

pub struct RouteGuideService {
    handlers: RouteGuideHandlers,
    hooks: Arc<dyn CallHooks>,
    tasks: CallTasks,
}

impl RouteGuideService {
    pub fn new(handlers: RouteGuideHandlers) -> Self {
        Self {
            handlers,
            hooks: Arc::new(TracingHooks),
            tasks: CallTasks::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn CallHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn handlers(&self) -> &RouteGuideHandlers {
        &self.handlers
    }

    pub fn tasks(&self) -> &CallTasks {
        &self.tasks
    }

    fn scope(&self, method: &'static str) -> CallScope {
        CallScope::start(Arc::clone(&self.hooks), method)
    }
}

#[tonic::async_trait]
impl RouteGuide for RouteGuideService {
    async fn get_feature(&self, request: Request<Point>) -> Result<Response<Feature>, Status> {
        let scope = self.scope(methods::GET_FEATURE);
        let feature = self.handlers.get_feature(&request.into_inner());
        scope.finish(Ok(()));
        Ok(Response::new(feature))
    }

    type ListFeaturesStream = MessageReceiver<Feature>;

    async fn list_features(
        &self,
        request: Request<Rectangle>,
    ) -> Result<Response<Self::ListFeaturesStream>, Status> {
        let scope = self.scope(methods::LIST_FEATURES);
        let rect = request.into_inner();
        let (outbound, responses) = rpcstream_lite::channel();

        let handlers = self.handlers.clone();
        self.tasks.spawn(async move {
            let outcome = handlers.list_features(&rect, outbound);
            scope.finish(outcome.as_ref().map(|_| ()));
        });

        Ok(Response::new(responses))
    }

    async fn record_route(
        &self,
        request: Request<Streaming<Point>>,
    ) -> Result<Response<RouteSummary>, Status> {
        let scope = self.scope(methods::RECORD_ROUTE);
        let result = self.handlers.record_route(request.into_inner()).await;
        scope.finish(result.as_ref().map(|_| ()));
        result.map(Response::new)
    }

    type RouteChatStream = MessageReceiver<RouteNote>;

    async fn route_chat(
        &self,
        request: Request<Streaming<RouteNote>>,
    ) -> Result<Response<Self::RouteChatStream>, Status> {
        let scope = self.scope(methods::ROUTE_CHAT);
        let inbound = request.into_inner();
        let (outbound, responses) = rpcstream_lite::channel();

        let handlers = self.handlers.clone();
        self.tasks.spawn(async move {
            let outcome = handlers.route_chat(inbound, outbound).await;
            scope.finish(outcome.as_ref().map(|_| ()));
        });

        Ok(Response::new(responses))
    }
}

/// A bound, not yet serving, RouteGuide + Greeter server.
pub struct GrpcServer {
    listener: TcpListener,
    config: ServerConfig,
    route_guide: RouteGuideService,
    greeter: GreeterService,
}

impl GrpcServer {
    /// Bind the listening socket. A fresh note log is created per server.
    pub async fn bind(
        config: ServerConfig,
        features: Arc<FeatureTable>,
    ) -> Result<Self, RouteGuideError> {
        let listener = TcpListener::bind(config.addr).await?;
        let handlers = RouteGuideHandlers::new(features, Arc::new(NoteLog::new()));
        Ok(Self {
            listener,
            config,
            route_guide: RouteGuideService::new(handlers),
            greeter: GreeterService::new(),
        })
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn CallHooks>) -> Self {
        self.route_guide = self.route_guide.with_hooks(Arc::clone(&hooks));
        self.greeter = self.greeter.with_hooks(hooks);
        self
    }

    pub fn handlers(&self) -> &RouteGuideHandlers {
        self.route_guide.handlers()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RouteGuideError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `signal` resolves, then stop accepting and drain.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<(), RouteGuideError>
    where
        F: Future<Output = ()> + Send,
    {
        let addr = self.local_addr()?;
        info!(%addr, features = self.handlers().features().len(), "Server started");

        tonic::transport::Server::builder()
            .add_service(RouteGuideServer::new(self.route_guide))
            .add_service(GreeterServer::new(self.greeter))
            .serve_with_incoming_shutdown(TcpListenerStream::new(self.listener), signal)
            .await?;

        info!(%addr, "Server stopped");
        Ok(())
    }

    /// Start serving on a background task.
    pub fn spawn(self) -> Result<ServerHandle, RouteGuideError> {
        let addr = self.local_addr()?;
        let grace = self.config.shutdown_grace;
        let force = self.config.force_shutdown;
        let tasks = self.route_guide.tasks().clone();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(self.serve_with_shutdown(async move {
            let _ = shutdown_rx.await;
        }));

        Ok(ServerHandle {
            addr,
            shutdown: Some(shutdown_tx),
            task,
            tasks,
            grace,
            force,
        })
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), RouteGuideError>>,
    tasks: CallTasks,
    grace: Duration,
    force: Duration,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// `http://` URI clients can connect to.
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop accepting calls and wait for in-flight calls to drain. Calls
    /// still running after the grace period are cancelled and the server
    /// task is torn down.
    pub async fn stop(mut self) -> Result<(), RouteGuideError> {
        info!(addr = %self.addr, "Shutting down server");
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        let mut served = None;
        let graceful = tokio::time::timeout(self.grace, async {
            served = Some(joined((&mut self.task).await));
            self.tasks.wait().await;
        })
        .await;
        if graceful.is_ok() {
            return served.unwrap_or(Ok(()));
        }

        warn!(
            grace = ?self.grace,
            calls = self.tasks.len(),
            "Calls still in flight after grace period, forcing shutdown"
        );
        self.tasks.cancel_all();
        let forced = tokio::time::timeout(self.force, async {
            if served.is_none() {
                self.task.abort();
                served = Some(joined((&mut self.task).await));
            }
            self.tasks.wait().await;
        })
        .await;
        if forced.is_err() {
            error!(addr = %self.addr, "Server did not stop after forced shutdown");
        }
        served.unwrap_or(Ok(()))
    }
}

/// An aborted server task counts as stopped.
fn joined(result: Result<Result<(), RouteGuideError>, JoinError>) -> Result<(), RouteGuideError> {
    match result {
        Ok(served) => served,
        Err(join) if join.is_cancelled() => Ok(()),
        Err(join) => Err(join.into()),
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("addr", &self.addr)
            .field("stopping", &self.shutdown.is_none())
            .finish()
    }
}
