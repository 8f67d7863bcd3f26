use std::pin::pin;
use std::sync::Arc;
use std::time::Instant;

use futures::{Stream, StreamExt};
use rpcstream_lite::MessageSender;
use tonic::Status;
use tracing::{debug, info, warn};

use crate::features::{self, FeatureTable};
use crate::geo::{self, Bounds};
use crate::notes::NoteLog;
use crate::routeguide::{Feature, Point, Rectangle, RouteNote, RouteSummary};

/// The four RouteGuide operations over the shared feature table and note log.
///
/// Requests arrive as streams and responses leave through a
/// [`MessageSender`], so the same logic runs behind tonic or directly in
/// tests.
#[derive(Debug, Clone)]
pub struct RouteGuideHandlers {
    features: Arc<FeatureTable>,
    notes: Arc<NoteLog>,
}

impl RouteGuideHandlers {
    pub fn new(features: Arc<FeatureTable>, notes: Arc<NoteLog>) -> Self {
        Self { features, notes }
    }

    pub fn features(&self) -> &FeatureTable {
        &self.features
    }

    pub fn notes(&self) -> &NoteLog {
        &self.notes
    }

    /// The feature at `point`, or an unnamed one at that location.
    pub fn get_feature(&self, point: &Point) -> Feature {
        self.features.check_feature(point)
    }

    /// Push every named feature inside `rect`, in table order, and close
    /// `outbound`. Fails with `CANCELLED` if the caller goes away first.
    pub fn list_features(
        &self,
        rect: &Rectangle,
        outbound: MessageSender<Feature>,
    ) -> Result<(), Status> {
        let bounds = Bounds::from_rectangle(rect);
        let mut sent = 0usize;
        for feature in self.features.within(bounds) {
            if outbound.push(feature.clone()).is_err() {
                debug!(sent, "ListFeatures caller went away");
                return Err(Status::cancelled("ListFeatures caller went away"));
            }
            sent += 1;
        }
        debug!(sent, ?bounds, "ListFeatures done");
        outbound.close();
        Ok(())
    }

    /// Consume a route and summarize it once the caller half-closes.
    ///
    /// A failed request stream produces no summary; the failure is returned
    /// instead.
    pub async fn record_route<S>(&self, points: S) -> Result<RouteSummary, Status>
    where
        S: Stream<Item = Result<Point, Status>>,
    {
        let mut points = pin!(points);
        let started = Instant::now();
        let mut summary = RouteSummary::default();
        let mut previous: Option<Point> = None;

        while let Some(item) = points.next().await {
            let point = item.inspect_err(|status| {
                warn!(code = ?status.code(), error = %status.message(), "RecordRoute cancelled");
            })?;

            summary.point_count += 1;
            if features::exists(&self.features.check_feature(&point)) {
                summary.feature_count += 1;
            }
            if let Some(previous) = &previous {
                summary.distance = summary
                    .distance
                    .saturating_add(geo::distance_meters(previous, &point));
            }
            previous = Some(point);
        }

        summary.elapsed_time = i32::try_from(started.elapsed().as_secs()).unwrap_or(i32::MAX);
        info!(
            points = summary.point_count,
            features = summary.feature_count,
            distance = summary.distance,
            "RecordRoute summarized"
        );
        Ok(summary)
    }

    /// For each incoming note, replay the notes previously recorded at its
    /// location, then record it.
    ///
    /// `outbound` is closed when the caller half-closes and failed with the
    /// caller's error if the request stream fails. Returns the call outcome;
    /// a caller that stops reading replies ends the call as `CANCELLED`.
    pub async fn route_chat<S>(
        &self,
        notes: S,
        outbound: MessageSender<RouteNote>,
    ) -> Result<(), Status>
    where
        S: Stream<Item = Result<RouteNote, Status>>,
    {
        let mut notes = pin!(notes);
        while let Some(item) = notes.next().await {
            let note = match item {
                Ok(note) => note,
                Err(status) => {
                    warn!(code = ?status.code(), error = %status.message(), "RouteChat cancelled");
                    outbound.close_with_error(status.clone());
                    return Err(status);
                }
            };

            for prior in self.notes.record(note) {
                if outbound.push(prior).is_err() {
                    debug!("RouteChat caller went away");
                    return Err(Status::cancelled("RouteChat caller went away"));
                }
            }
        }
        outbound.close();
        Ok(())
    }
}
