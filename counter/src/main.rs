use anyhow::Context;
use log::info;
use std::sync::Arc;
use vehicle_counter::{AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("vehicle-counter v{}", vehicle_counter::version());
    let config = ServerConfig::load(std::env::args().nth(1)).context("loading configuration")?;

    let detector = config
        .detector
        .kind
        .build(&config.detector)
        .context("creating detector")?;
    info!(
        "Detector: {}, association: {}, frames: {}",
        detector.name(),
        config.session.tracker.association,
        config.session.frame_encoding
    );

    let state = Arc::new(AppState::new(config, detector));
    vehicle_counter::serve(state).await?;
    Ok(())
}
