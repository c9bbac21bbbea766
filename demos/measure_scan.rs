use anyhow::Result;
use std::time::Duration;
use tracing::{error, info};

use stagectl::{
    measurement::{config::SessionConfig, sensor::MockBeamSensor, session::MeasurementSession},
    stage::{config::StageConfig, Stage},
    stage_manager::{config::ManagerConfig, StageManager},
    transport::SimulatedController,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("Starting simulated beam width scan");

    let controller = SimulatedController::new()
        .with_travel(0.0, 25.0)
        .with_velocity(10.0)
        .with_home_duration(Duration::from_millis(800));
    let mut stage = Stage::with_transport(Box::new(controller), &StageConfig::default()).await?;
    stage.home().await?;

    let manager = StageManager::new(stage, ManagerConfig::default());

    let config = SessionConfig {
        settle_ms: 250,
        readings_to_average: 20,
        ..SessionConfig::default()
    };
    let mut session =
        MeasurementSession::open(manager.handle(), Box::new(MockBeamSensor::new()), config)
            .await?;

    // 30 mm is beyond the simulated travel and is rejected by the controller.
    for target in [2.0, 5.5, 10.0, 30.0, 12.25] {
        match session.measure_at(target).await {
            Ok(record) => info!("Record: {}", serde_json::to_string(&record)?),
            Err(e) => error!("Measurement at {} mm failed: {}", target, e),
        }
    }

    session.close().await?;
    manager.shutdown().await?;
    info!("Scan complete");

    Ok(())
}
