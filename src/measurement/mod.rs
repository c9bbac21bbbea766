//! Move-settle-measure cycles on top of the stage driver.

pub mod config;
pub mod sensor;
pub mod session;

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use tokio::sync::mpsc;
use tracing::debug;

use sensor::BeamSample;

/// Mean width of the next `count` frames with a strictly positive width.
/// Fails if the stream closes or `timeout` passes first.
pub async fn average_width(
    samples: &mut mpsc::Receiver<BeamSample>,
    count: usize,
    timeout: Duration,
) -> Result<f64> {
    if count == 0 {
        bail!("Cannot average zero readings");
    }

    let collect = async {
        let mut sum = 0.0;
        let mut valid = 0usize;
        while valid < count {
            let sample = samples
                .recv()
                .await
                .ok_or_else(|| anyhow!("Sensor stream closed after {} readings", valid))?;
            let width = sample.width();
            if width > 0.0 {
                sum += width;
                valid += 1;
            } else {
                debug!("Skipping invalid reading {}", width);
            }
        }
        Ok::<f64, anyhow::Error>(sum / count as f64)
    };

    tokio::time::timeout(timeout, collect)
        .await
        .map_err(|_| anyhow!("Timed out after {:?} collecting {} readings", timeout, count))?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(width: f64) -> BeamSample {
        BeamSample {
            d4sigma_x: width,
            d4sigma_y: width,
        }
    }

    #[tokio::test]
    async fn test_average_skips_non_positive() {
        let (tx, mut rx) = mpsc::channel(8);
        for w in [1.0, 0.0, -2.0, 3.0, 2.0] {
            tx.send(sample(w)).await.unwrap();
        }

        let avg = average_width(&mut rx, 3, Duration::from_secs(1)).await.unwrap();
        assert!((avg - 2.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_average_closed_stream() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(sample(1.0)).await.unwrap();
        drop(tx);

        assert!(average_width(&mut rx, 2, Duration::from_secs(1)).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_average_times_out() {
        let (_tx, mut rx) = mpsc::channel::<BeamSample>(8);
        let err = average_width(&mut rx, 1, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Timed out"));
    }
}
