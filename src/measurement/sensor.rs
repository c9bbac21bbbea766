//! Beam-profiling sensor interface. Frames arrive on a bounded channel
//! instead of through registered callbacks, so a slow consumer drops frames
//! rather than blocking the source.

use std::time::Duration;

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Second-moment beam diameters of one frame, in micrometres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BeamSample {
    pub d4sigma_x: f64,
    pub d4sigma_y: f64,
}

impl BeamSample {
    pub fn width(&self) -> f64 {
        (self.d4sigma_x + self.d4sigma_y) / 2.0
    }
}

#[async_trait::async_trait]
pub trait BeamSensor: Send {
    fn name(&self) -> &str;

    /// Starts streaming; at most `capacity` frames are buffered.
    async fn start(&mut self, capacity: usize) -> Result<mpsc::Receiver<BeamSample>>;

    async fn stop(&mut self) -> Result<()>;
}

struct Streaming {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Emits uniformly distributed widths at a fixed frame rate.
pub struct MockBeamSensor {
    frame_interval: Duration,
    range: (f64, f64),
    seed: Option<u64>,
    streaming: Option<Streaming>,
}

impl MockBeamSensor {
    pub const FRAME_INTERVAL: Duration = Duration::from_micros(26_667);

    pub fn new() -> Self {
        Self {
            frame_interval: Self::FRAME_INTERVAL,
            range: (0.5, 2.0),
            seed: None,
            streaming: None,
        }
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn with_range(mut self, low: f64, high: f64) -> Self {
        self.range = (low, high);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    async fn emit_frames(
        tx: mpsc::Sender<BeamSample>,
        cancel: CancellationToken,
        interval: Duration,
        (low, high): (f64, f64),
        mut rng: StdRng,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let sample = BeamSample {
                        d4sigma_x: rng.gen_range(low..high),
                        d4sigma_y: rng.gen_range(low..high),
                    };
                    match tx.try_send(sample) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            debug!("Consumer behind, dropping frame");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                }
            }
        }
    }
}

impl Default for MockBeamSensor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl BeamSensor for MockBeamSensor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start(&mut self, capacity: usize) -> Result<mpsc::Receiver<BeamSample>> {
        if self.streaming.is_some() {
            bail!("Sensor is already streaming");
        }

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let task = tokio::spawn(Self::emit_frames(
            tx,
            cancel.clone(),
            self.frame_interval,
            self.range,
            rng,
        ));

        self.streaming = Some(Streaming { cancel, task });
        info!("Mock beam sensor started");
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(streaming) = self.streaming.take() {
            streaming.cancel.cancel();
            streaming.task.await?;
            info!("Mock beam sensor stopped");
        }
        Ok(())
    }
}

impl Drop for MockBeamSensor {
    fn drop(&mut self) {
        if let Some(streaming) = &self.streaming {
            streaming.cancel.cancel();
        }
    }
}
