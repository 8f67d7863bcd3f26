pub mod client;
pub mod error;
pub mod features;
pub mod geo;
pub mod grpc;
pub mod handlers;
pub mod notes;
pub mod telemetry;

pub use error::RouteGuideError;
pub use features::FeatureTable;
pub use handlers::RouteGuideHandlers;
pub use notes::NoteLog;

pub mod routeguide {
    include!(concat!(env!("OUT_DIR"), "/routeguide.rs"));
}

pub mod helloworld {
    include!(concat!(env!("OUT_DIR"), "/helloworld.rs"));
}

/// Fully qualified method names, used to label calls in hooks and logs.
pub mod methods {
    pub const GET_FEATURE: &str = "routeguide.RouteGuide/GetFeature";
    pub const LIST_FEATURES: &str = "routeguide.RouteGuide/ListFeatures";
    pub const RECORD_ROUTE: &str = "routeguide.RouteGuide/RecordRoute";
    pub const ROUTE_CHAT: &str = "routeguide.RouteGuide/RouteChat";
    pub const SAY_HELLO: &str = "helloworld.Greeter/SayHello";
}
