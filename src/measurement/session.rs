use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

use super::average_width;
use super::config::SessionConfig;
use super::sensor::{BeamSample, BeamSensor};
use crate::stage_manager::StageHandle;

#[derive(Debug, Clone, Serialize)]
pub struct MeasurementRecord {
    pub timestamp: DateTime<Utc>,
    pub target_mm: f64,
    /// Position read back after the move, if the read was clean.
    pub position_mm: Option<f64>,
    pub width_um: f64,
    pub samples: usize,
}

/// One measurement run: the stage handle and a streaming sensor, released
/// together by [`MeasurementSession::close`].
pub struct MeasurementSession {
    stage: StageHandle,
    sensor: Box<dyn BeamSensor>,
    samples: mpsc::Receiver<BeamSample>,
    config: SessionConfig,
}

impl MeasurementSession {
    pub async fn open(
        stage: StageHandle,
        mut sensor: Box<dyn BeamSensor>,
        config: SessionConfig,
    ) -> Result<Self> {
        let samples = sensor.start(config.sample_buffer).await?;
        info!("Measurement session opened with {} sensor", sensor.name());
        Ok(Self {
            stage,
            sensor,
            samples,
            config,
        })
    }

    pub async fn measure_at(&mut self, target: f64) -> Result<MeasurementRecord> {
        let outcome = self.stage.move_absolute(target).await?;

        info!("Settling for {:?}", self.config.settle());
        tokio::time::sleep(self.config.settle()).await;

        // Frames captured while moving describe the wrong position.
        while self.samples.try_recv().is_ok() {}

        let count = self.config.readings_to_average;
        let width = average_width(
            &mut self.samples,
            count,
            self.config.measurement_timeout(),
        )
        .await?;

        info!("RESULT: Pos={}mm | AvgWidth={:.4}um", target, width);
        Ok(MeasurementRecord {
            timestamp: Utc::now(),
            target_mm: target,
            position_mm: outcome.position,
            width_um: width,
            samples: count,
        })
    }

    pub async fn close(mut self) -> Result<()> {
        self.sensor.stop().await?;
        info!("Measurement session closed");
        Ok(())
    }
}
