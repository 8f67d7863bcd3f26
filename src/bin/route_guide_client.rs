use anyhow::Result;
use route_guide::client::{ClientConfig, RouteGuideDriver};
use route_guide::{FeatureTable, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();

    let config = ClientConfig::from_env();
    let features = match std::env::var("ROUTE_GUIDE_DB") {
        Ok(path) => FeatureTable::load(path)?,
        Err(_) => FeatureTable::bundled()?,
    };

    let driver = RouteGuideDriver::connect(config).await?;
    driver.run_demo(&features).await;

    Ok(())
}
