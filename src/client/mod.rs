pub mod config;
pub mod driver;

pub use config::ClientConfig;
pub use driver::{RouteChat, RouteGuideDriver, demo_notes};
