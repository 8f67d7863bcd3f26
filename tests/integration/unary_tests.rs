use route_guide::methods;
use route_guide::routeguide::Point;

use crate::test_utilities::TestServer;

#[test_log::test(tokio::test)]
async fn test_get_feature_known_location() {
    let srv = TestServer::start().await.expect("start server");
    let mut client = srv.client().await;

    let feature = client
        .get_feature(Point {
            latitude: 409146138,
            longitude: -746188906,
        })
        .await
        .expect("get feature")
        .into_inner();

    assert_eq!(
        feature.name,
        "Berkshire Valley Management Area Trail, Jefferson, NJ, USA"
    );
    assert_eq!(
        feature.location,
        Some(Point {
            latitude: 409146138,
            longitude: -746188906
        })
    );
    srv.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_get_feature_unknown_location_is_unnamed() {
    let srv = TestServer::start().await.expect("start server");
    let mut client = srv.client().await;

    let origin = Point {
        latitude: 0,
        longitude: 0,
    };
    let feature = client
        .get_feature(origin)
        .await
        .expect("a miss is not an error")
        .into_inner();

    assert_eq!(feature.name, "");
    assert_eq!(feature.location, Some(origin));
    srv.stop().await;
}

#[test_log::test(tokio::test)]
async fn test_unary_calls_are_hooked() {
    let srv = TestServer::start().await.expect("start server");
    let driver = srv.driver().await;

    driver.get_feature(0, 0).await.expect("get feature");
    let greeting = driver.say_hello("world").await.expect("say hello");
    assert_eq!(greeting, "Hello world");

    assert!(srv.hooks.started(methods::GET_FEATURE));
    assert_eq!(srv.hooks.finished(methods::GET_FEATURE), Some(None));
    assert_eq!(srv.hooks.finished(methods::SAY_HELLO), Some(None));
    srv.stop().await;
}
