use anyhow::Result;
use route_guide::grpc::{GrpcServer, ServerConfig};
use route_guide::{FeatureTable, telemetry};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();

    let config = ServerConfig::from_env()?;
    let features = match &config.feature_db {
        Some(path) => FeatureTable::load(path)?,
        None => FeatureTable::bundled()?,
    };

    let server = GrpcServer::bind(config, Arc::new(features)).await?;
    let handle = server.spawn()?;
    info!(addr = %handle.local_addr(), "RouteGuide server listening");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down gRPC server since the process is stopping");
    handle.stop().await?;
    info!("Server shut down");

    Ok(())
}
