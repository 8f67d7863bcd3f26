use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt, stream};
use parking_lot::Mutex;
use rand::Rng;
use rpcstream_lite::{
    AbortableCodec, CallHooks, CallScope, CompletionLatch, SessionObserver, SessionState,
    StreamSession, TracingHooks, channel,
};
use tonic::client::Grpc;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Response, Status};
use tonic_prost::ProstCodec;
use tracing::{info, warn};

use crate::client::config::ClientConfig;
use crate::error::RouteGuideError;
use crate::features::{self, FeatureTable};
use crate::geo::format_coordinate;
use crate::helloworld::HelloRequest;
use crate::helloworld::greeter_client::GreeterClient;
use crate::methods;
use crate::routeguide::route_guide_client::RouteGuideClient;
use crate::routeguide::{Feature, Point, Rectangle, RouteNote, RouteSummary};

/// Drives the RouteGuide and Greeter services over one shared channel.
#[derive(Clone)]
pub struct RouteGuideDriver {
    channel: Channel,
    route_guide: RouteGuideClient<Channel>,
    greeter: GreeterClient<Channel>,
    config: ClientConfig,
    hooks: Arc<dyn CallHooks>,
}

impl RouteGuideDriver {
    pub async fn connect(config: ClientConfig) -> Result<Self, RouteGuideError> {
        let endpoint = Endpoint::from_shared(config.target.clone())
            .map_err(|_| RouteGuideError::InvalidAddress(config.target.clone()))?;
        let channel = endpoint.connect().await?;
        info!(target = %config.target, "Connected");
        Ok(Self::with_channel(channel, config))
    }

    pub fn with_channel(channel: Channel, config: ClientConfig) -> Self {
        Self {
            route_guide: RouteGuideClient::new(channel.clone()),
            greeter: GreeterClient::new(channel.clone()),
            channel,
            config,
            hooks: Arc::new(TracingHooks),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn CallHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn scope(&self, method: &'static str) -> CallScope {
        CallScope::start(Arc::clone(&self.hooks), method)
    }

    /// Look up the feature at a point. A miss is an unnamed feature, not an
    /// error.
    pub async fn get_feature(&self, lat: i32, lon: i32) -> Result<Feature, RouteGuideError> {
        info!(lat, lon, "*** GetFeature");
        let scope = self.scope(methods::GET_FEATURE);
        let request = Point {
            latitude: lat,
            longitude: lon,
        };

        let result = self.route_guide.clone().get_feature(request).await;
        scope.finish(result.as_ref().map(|_| ()));
        let feature = result
            .inspect_err(|status| warn!(error = %status, "GetFeature failed"))?
            .into_inner();

        let (lat, lon) = (format_coordinate(lat), format_coordinate(lon));
        if features::exists(&feature) {
            info!(name = %feature.name, %lat, %lon, "Found feature");
        } else {
            info!(%lat, %lon, "Found no feature");
        }
        Ok(feature)
    }

    /// Collect every named feature inside the rectangle spanned by the two
    /// corners.
    pub async fn list_features(
        &self,
        lo_lat: i32,
        lo_lon: i32,
        hi_lat: i32,
        hi_lon: i32,
    ) -> Result<Vec<Feature>, RouteGuideError> {
        info!(lo_lat, lo_lon, hi_lat, hi_lon, "*** ListFeatures");
        let scope = self.scope(methods::LIST_FEATURES);
        let request = Rectangle {
            lo: Some(Point {
                latitude: lo_lat,
                longitude: lo_lon,
            }),
            hi: Some(Point {
                latitude: hi_lat,
                longitude: hi_lon,
            }),
        };

        let mut responses = match self.route_guide.clone().list_features(request).await {
            Ok(response) => response.into_inner(),
            Err(status) => {
                warn!(error = %status, "ListFeatures failed");
                scope.finish(Err(&status));
                return Err(status.into());
            }
        };

        let mut found = Vec::new();
        while let Some(item) = responses.next().await {
            match item {
                Ok(feature) => {
                    info!(result = found.len() + 1, name = %feature.name, "ListFeatures result");
                    found.push(feature);
                }
                Err(status) => {
                    warn!(error = %status, "ListFeatures failed");
                    scope.finish(Err(&status));
                    return Err(status.into());
                }
            }
        }
        scope.finish(Ok(()));
        Ok(found)
    }

    /// Send `count` points picked at random from `features`, pausing between
    /// them, and return the server's summary.
    pub async fn record_route(
        &self,
        features: &FeatureTable,
        count: usize,
    ) -> Result<Option<RouteSummary>, RouteGuideError> {
        info!("*** RecordRoute");
        if features.is_empty() {
            return Err(RouteGuideError::NoFeatures);
        }

        let route = random_route(
            &mut rand::rng(),
            features,
            count,
            self.config.min_point_delay,
            self.config.max_point_delay,
        );
        self.send_route(route).await
    }

    /// Send the given points back to back and return the server's summary.
    pub async fn record_route_points(
        &self,
        points: Vec<Point>,
    ) -> Result<Option<RouteSummary>, RouteGuideError> {
        self.send_route(points.into_iter().map(|p| (p, Duration::ZERO)))
            .await
    }

    async fn send_route(
        &self,
        route: impl IntoIterator<Item = (Point, Duration)>,
    ) -> Result<Option<RouteSummary>, RouteGuideError> {
        let summary = Arc::new(Mutex::new(None));
        let mut session = self.start_record_route(Arc::clone(&summary));

        for (point, pause) in route {
            info!(
                lat = %format_coordinate(point.latitude),
                lon = %format_coordinate(point.longitude),
                "Visiting point"
            );
            if let Err(err) = session.send(point) {
                if session.is_terminated() {
                    break;
                }
                session.cancel(Status::cancelled(err.to_string()));
                return Err(err.into());
            }
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            // The server finished or failed early; nothing more to send.
            if session.is_terminated() {
                break;
            }
        }

        if !session.is_terminated() {
            session.half_close()?;
        }

        let timeout = self.config.rpc_timeout;
        if !session.latch().wait(timeout).await {
            warn!(?timeout, "RecordRoute did not finish in time");
            session.cancel(Status::deadline_exceeded("RecordRoute timed out"));
            return Err(RouteGuideError::Timeout {
                rpc: methods::RECORD_ROUTE,
                timeout,
            });
        }
        if let Some(status) = session.failure() {
            return Err(status.into());
        }
        Ok(summary.lock().take())
    }

    /// Open a RecordRoute call. The summary, if any, lands in `summary`.
    pub fn start_record_route(
        &self,
        summary: Arc<Mutex<Option<RouteSummary>>>,
    ) -> StreamSession<Point> {
        let (outbound, requests) = channel::<Point>();
        let mut grpc = Grpc::new(self.channel.clone());
        let inbound = stream::once(async move {
            ready(&mut grpc, methods::RECORD_ROUTE).await?;
            grpc.client_streaming(
                Request::new(requests.into_outgoing()),
                path(methods::RECORD_ROUTE)?,
                AbortableCodec::new(ProstCodec::<Point, RouteSummary>::default()),
            )
            .await
            .map(Response::into_inner)
        });

        let observer = SessionObserver::new()
            .on_message(move |reply: RouteSummary| {
                info!(
                    points = reply.point_count,
                    features = reply.feature_count,
                    meters = reply.distance,
                    seconds = reply.elapsed_time,
                    "Finished trip"
                );
                *summary.lock() = Some(reply);
            })
            .on_error(|status| warn!(error = %status, "RecordRoute failed"))
            .on_completed(|| info!("Finished RecordRoute"));

        StreamSession::start(
            methods::RECORD_ROUTE,
            outbound,
            inbound,
            observer,
            Arc::clone(&self.hooks),
        )
    }

    /// Send `notes` while concurrently receiving replayed notes, then
    /// half-close. The returned chat ends when the server finishes.
    pub fn route_chat(&self, notes: Vec<RouteNote>) -> Result<RouteChat, RouteGuideError> {
        info!("*** RouteChat");
        let received = Arc::new(Mutex::new(Vec::new()));

        let (outbound, requests) = channel::<RouteNote>();
        let mut grpc = Grpc::new(self.channel.clone());
        let inbound = stream::once(async move {
            ready(&mut grpc, methods::ROUTE_CHAT).await?;
            grpc.streaming(
                Request::new(requests.into_outgoing()),
                path(methods::ROUTE_CHAT)?,
                AbortableCodec::new(ProstCodec::<RouteNote, RouteNote>::default()),
            )
            .await
            .map(Response::into_inner)
        })
        .try_flatten();

        let sink = Arc::clone(&received);
        let observer = SessionObserver::new()
            .on_message(move |note: RouteNote| {
                let location = note.location.unwrap_or_default();
                info!(
                    message = %note.message,
                    lat = location.latitude,
                    lon = location.longitude,
                    "Got message"
                );
                sink.lock().push(note);
            })
            .on_error(|status| warn!(error = %status, "RouteChat failed"))
            .on_completed(|| info!("Finished RouteChat"));

        let mut session = StreamSession::start(
            methods::ROUTE_CHAT,
            outbound,
            inbound,
            observer,
            Arc::clone(&self.hooks),
        );

        for note in notes {
            let location = note.location.unwrap_or_default();
            info!(
                message = %note.message,
                lat = location.latitude,
                lon = location.longitude,
                "Sending message"
            );
            if let Err(err) = session.send(note) {
                session.cancel(Status::cancelled(err.to_string()));
                return Err(err.into());
            }
        }
        session.half_close()?;

        Ok(RouteChat { session, received })
    }

    pub async fn say_hello(&self, name: &str) -> Result<String, RouteGuideError> {
        info!(name, "Will try to greet");
        let scope = self.scope(methods::SAY_HELLO);
        let result = self
            .greeter
            .clone()
            .say_hello(HelloRequest {
                name: name.to_string(),
            })
            .await;
        scope.finish(result.as_ref().map(|_| ()));

        let message = result
            .inspect_err(|status| warn!(error = %status, "SayHello failed"))?
            .into_inner()
            .message;
        info!(%message, "Greeting");
        Ok(message)
    }

    /// Exercise every RPC once. Failures are logged and the sequence moves on.
    pub async fn run_demo(&self, features: &FeatureTable) {
        // Looking for a valid feature
        let _ = self.get_feature(409146138, -746188906).await;

        // Feature missing.
        let _ = self.get_feature(0, 0).await;

        // Looking for features between 40, -75 and 42, -73.
        let _ = self
            .list_features(400000000, -750000000, 420000000, -730000000)
            .await;

        if let Err(err) = self.record_route(features, self.config.point_count).await {
            warn!(error = %err, "RecordRoute did not complete");
        }

        match self.route_chat(demo_notes()) {
            Ok(chat) => {
                let latch = chat.latch();
                let timeout = self.config.rpc_timeout;
                match tokio::task::spawn_blocking(move || latch.wait_timeout(timeout)).await {
                    Ok(true) => {}
                    Ok(false) => warn!(?timeout, "RouteChat did not finish in time"),
                    Err(err) => warn!(error = %err, "RouteChat wait failed"),
                }
            }
            Err(err) => warn!(error = %err, "RouteChat did not start"),
        }

        let _ = self.say_hello("world").await;
    }
}

impl std::fmt::Debug for RouteGuideDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteGuideDriver")
            .field("config", &self.config)
            .finish()
    }
}

/// An in-progress RouteChat call. Dropping it cancels the call.
#[derive(Debug)]
pub struct RouteChat {
    session: StreamSession<RouteNote>,
    received: Arc<Mutex<Vec<RouteNote>>>,
}

impl RouteChat {
    /// Released when the server ends the call, successfully or not.
    pub fn latch(&self) -> CompletionLatch {
        self.session.latch()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Notes received so far.
    pub fn received(&self) -> Vec<RouteNote> {
        self.received.lock().clone()
    }

    /// Wait for the call to end and return every note received.
    pub async fn finish(self, timeout: Duration) -> Result<Vec<RouteNote>, RouteGuideError> {
        if !self.session.latch().wait(timeout).await {
            return Err(RouteGuideError::Timeout {
                rpc: methods::ROUTE_CHAT,
                timeout,
            });
        }
        if let Some(status) = self.session.failure() {
            return Err(status.into());
        }
        Ok(self.received())
    }

    /// Abort the call; the server observes a cancelled request stream.
    pub fn cancel(mut self) -> bool {
        self.session.cancel(Status::cancelled("RouteChat cancelled by caller"))
    }
}

async fn ready(grpc: &mut Grpc<Channel>, method: &'static str) -> Result<(), Status> {
    grpc.ready()
        .await
        .map_err(|err| Status::unavailable(format!("{method} not ready: {err}")))
}

fn path(method: &'static str) -> Result<PathAndQuery, Status> {
    format!("/{method}")
        .parse()
        .map_err(|_| Status::internal(format!("bad method path {method}")))
}

/// Pick `count` random feature locations, each with a pause drawn from the
/// delay bounds. The bounds may be given in either order.
fn random_route<R: Rng>(
    rng: &mut R,
    features: &FeatureTable,
    count: usize,
    a: Duration,
    b: Duration,
) -> Vec<(Point, Duration)> {
    let (lo, hi) = (a.min(b), a.max(b));
    (0..count)
        .map(|_| {
            let feature = &features.features()[rng.random_range(0..features.len())];
            let pause = rng.random_range(lo..=hi);
            (feature.location.unwrap_or_default(), pause)
        })
        .collect()
}

/// The four notes the demo chat sends, one per corner of a 1 degree square.
pub fn demo_notes() -> Vec<RouteNote> {
    [
        ("First message", 0, 0),
        ("Second message", 0, 10_000_000),
        ("Third message", 10_000_000, 0),
        ("Fourth message", 10_000_000, 10_000_000),
    ]
    .into_iter()
    .map(|(message, latitude, longitude)| RouteNote {
        message: message.to_string(),
        location: Some(Point {
            latitude,
            longitude,
        }),
    })
    .collect()
}
