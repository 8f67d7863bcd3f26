use std::time::Duration;

use route_guide::client::demo_notes;
use route_guide::methods;
use route_guide::routeguide::Point;
use route_guide::{FeatureTable, RouteGuideError};
use rpcstream_lite::SessionState;

use crate::test_utilities::TestServer;

#[test_log::test(tokio::test)]
async fn test_list_features_through_driver() {
    let srv = TestServer::start().await.expect("start server");
    let driver = srv.driver().await;

    let features = driver
        .list_features(400000000, -750000000, 420000000, -730000000)
        .await
        .expect("list features");
    assert!(!features.is_empty());
    srv.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_random_record_route_reports_every_point() {
    let srv = TestServer::start().await.expect("start server");
    let driver = srv.driver().await;
    let features = FeatureTable::bundled().expect("bundled db");

    let summary = driver
        .record_route(&features, 3)
        .await
        .expect("record route")
        .expect("summary");

    assert_eq!(summary.point_count, 3);
    assert!(summary.feature_count <= 3);
    assert!(summary.distance >= 0);
    srv.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_route_chat_latch_releases_on_completion() {
    let srv = TestServer::start().await.expect("start server");
    let driver = srv.driver().await;

    let chat = driver.route_chat(demo_notes()).expect("start chat");
    let latch = chat.latch();
    let released = tokio::task::spawn_blocking(move || latch.wait_timeout(Duration::from_secs(5)))
        .await
        .expect("wait task");

    assert!(released);
    assert_eq!(chat.state(), SessionState::Completed);
    assert!(chat.received().is_empty());
    srv.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_run_demo_exercises_every_rpc() {
    let srv = TestServer::start().await.expect("start server");
    let driver = srv.driver().await;
    let features = FeatureTable::bundled().expect("bundled db");

    driver.run_demo(&features).await;

    let hooks = &srv.hooks;
    for method in [
        methods::GET_FEATURE,
        methods::LIST_FEATURES,
        methods::RECORD_ROUTE,
        methods::ROUTE_CHAT,
        methods::SAY_HELLO,
    ] {
        let outcome = hooks
            .wait_for(Duration::from_secs(5), |h| h.finished(method))
            .await;
        assert_eq!(outcome, Some(None), "{method} should finish cleanly");
    }

    // One note per demo location.
    assert_eq!(srv.handlers.notes().locations(), 4);
    assert_eq!(
        srv.handlers
            .notes()
            .notes_at(&Point {
                latitude: 10_000_000,
                longitude: 0
            })[0]
            .message,
        "Third message"
    );
    srv.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_connect_rejects_bad_target() {
    let config = route_guide::client::ClientConfig::new("not a uri");
    let err = route_guide::client::RouteGuideDriver::connect(config)
        .await
        .unwrap_err();
    assert!(matches!(err, RouteGuideError::InvalidAddress(_)));
}
