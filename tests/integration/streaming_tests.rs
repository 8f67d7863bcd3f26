use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, stream};
use parking_lot::Mutex;
use route_guide::geo::{self, Bounds};
use route_guide::methods;
use route_guide::routeguide::{Feature, Point, Rectangle, RouteNote};
use rpcstream_lite::SessionState;
use tonic::Status;

use crate::test_utilities::TestServer;

const WAIT: Duration = Duration::from_secs(5);

fn point(latitude: i32, longitude: i32) -> Point {
    Point {
        latitude,
        longitude,
    }
}

fn note(latitude: i32, longitude: i32, message: &str) -> RouteNote {
    RouteNote {
        location: Some(point(latitude, longitude)),
        message: message.to_string(),
    }
}

async fn list(srv: &TestServer, lo: Point, hi: Point) -> Vec<Feature> {
    let mut client = srv.client().await;
    let mut stream = client
        .list_features(Rectangle {
            lo: Some(lo),
            hi: Some(hi),
        })
        .await
        .expect("list features")
        .into_inner();

    let mut features = Vec::new();
    while let Some(feature) = stream.next().await {
        features.push(feature.expect("feature"));
    }
    features
}

#[test_log::test(tokio::test)]
async fn test_list_features_corner_order_does_not_matter() {
    let srv = TestServer::start().await.expect("start server");
    let lo = point(400000000, -750000000);
    let hi = point(420000000, -730000000);

    let forward = list(&srv, lo, hi).await;
    let reversed = list(&srv, hi, lo).await;

    assert!(!forward.is_empty());
    assert_eq!(forward, reversed);

    let bounds = Bounds::from_rectangle(&Rectangle {
        lo: Some(lo),
        hi: Some(hi),
    });
    for feature in &forward {
        assert!(!feature.name.is_empty());
        assert!(bounds.contains(feature.location.as_ref().expect("location")));
    }
    srv.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_list_features_matches_table_order() {
    let srv = TestServer::start().await.expect("start server");
    // Corners sit exactly on two known features, so both lie on the edge.
    let lo = point(407838351, -746143763);
    let hi = point(413628156, -749015468);
    let bounds = Bounds::from_rectangle(&Rectangle {
        lo: Some(lo),
        hi: Some(hi),
    });

    let expected: Vec<Feature> = srv
        .handlers
        .features()
        .features()
        .iter()
        .filter(|f| !f.name.is_empty() && bounds.contains(&f.location.unwrap_or_default()))
        .cloned()
        .collect();
    assert!(expected.len() >= 2);
    assert!(expected.iter().any(|f| f.location == Some(lo)));
    assert!(expected.iter().any(|f| f.location == Some(hi)));

    assert_eq!(list(&srv, lo, hi).await, expected);
    srv.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_list_features_empty_area() {
    let srv = TestServer::start().await.expect("start server");
    let features = list(&srv, point(0, 0), point(10, 10)).await;
    assert!(features.is_empty());
    srv.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_record_route_single_point() {
    let srv = TestServer::start().await.expect("start server");
    let mut client = srv.client().await;

    let summary = client
        .record_route(stream::iter(vec![point(409146138, -746188906)]))
        .await
        .expect("record route")
        .into_inner();

    assert_eq!(summary.point_count, 1);
    assert_eq!(summary.feature_count, 1);
    assert_eq!(summary.distance, 0);
    srv.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_record_route_distance_and_features() {
    let srv = TestServer::start().await.expect("start server");
    let driver = srv.driver().await;

    let route = vec![
        point(409146138, -746188906),
        point(0, 0),
        point(413628156, -749015468),
    ];
    let expected = geo::distance_meters(&route[0], &route[1])
        + geo::distance_meters(&route[1], &route[2]);

    let summary = driver
        .record_route_points(route)
        .await
        .expect("record route")
        .expect("summary");

    assert_eq!(summary.point_count, 3);
    assert_eq!(summary.feature_count, 2);
    assert_eq!(summary.distance, expected);
    srv.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_cancelled_record_route_produces_no_summary() {
    let srv = TestServer::start().await.expect("start server");
    let driver = srv.driver().await;

    let summary = Arc::new(Mutex::new(None));
    let mut session = driver.start_record_route(Arc::clone(&summary));
    session.send(point(409146138, -746188906)).expect("send");
    session.send(point(0, 0)).expect("send");

    let started = srv
        .hooks
        .wait_for(WAIT, |hooks| hooks.started(methods::RECORD_ROUTE).then_some(()))
        .await;
    assert!(started.is_some(), "server never saw the call");

    assert!(session.cancel(Status::cancelled("caller gave up")));
    assert_eq!(session.state(), SessionState::Failed);

    let code = srv
        .hooks
        .wait_for(WAIT, |hooks| hooks.finished(methods::RECORD_ROUTE))
        .await
        .expect("server call ended");
    assert!(code.is_some(), "server call should end with an error");
    assert!(summary.lock().is_none());
    srv.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_route_chat_replays_earlier_callers_notes() {
    let srv = TestServer::start().await.expect("start server");
    let driver = srv.driver().await;

    let first = driver
        .route_chat(vec![note(1, 1, "A")])
        .expect("start chat")
        .finish(WAIT)
        .await
        .expect("first chat");
    assert!(first.is_empty());

    let second = driver
        .route_chat(vec![note(1, 1, "B")])
        .expect("start chat")
        .finish(WAIT)
        .await
        .expect("second chat");
    assert_eq!(second, vec![note(1, 1, "A")]);

    let logged: Vec<String> = srv
        .handlers
        .notes()
        .notes_at(&point(1, 1))
        .into_iter()
        .map(|n| n.message)
        .collect();
    assert_eq!(logged, vec!["A", "B"]);
    srv.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_concurrent_chats_at_one_location() {
    let srv = TestServer::start().await.expect("start server");
    let driver = srv.driver().await;

    let a = driver.route_chat(vec![note(5, 5, "A")]).expect("start chat");
    let b = driver.route_chat(vec![note(5, 5, "B")]).expect("start chat");
    let (a, b) = tokio::join!(a.finish(WAIT), b.finish(WAIT));
    let (a, b) = (a.expect("chat a"), b.expect("chat b"));

    // Exactly one of the two callers sees the other's note.
    assert_eq!(a.len() + b.len(), 1);
    assert_eq!(srv.handlers.notes().notes_at(&point(5, 5)).len(), 2);
    srv.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_route_chat_with_raw_client_streams_replies() {
    let srv = TestServer::start().await.expect("start server");
    let mut client = srv.client().await;

    let seed = client
        .route_chat(stream::iter(vec![note(9, 9, "seed")]))
        .await
        .expect("seed chat")
        .into_inner();
    assert_eq!(seed.count().await, 0);

    let replies: Vec<RouteNote> = client
        .route_chat(stream::iter(vec![note(9, 9, "x"), note(9, 9, "y")]))
        .await
        .expect("chat")
        .into_inner()
        .map(|n| n.expect("note"))
        .collect()
        .await;

    let messages: Vec<_> = replies.iter().map(|n| n.message.as_str()).collect();
    assert_eq!(messages, vec!["seed", "seed", "x"]);
    srv.stop().await;
}
