pub mod config;
pub mod greeter;
pub mod server;

pub use config::ServerConfig;
pub use greeter::GreeterService;
pub use server::{GrpcServer, RouteGuideService, ServerHandle};
