//! Pluggable motion-completion policies.
//!
//! [`StatusPolling`] is the default: it gates on READY, checks `TE` right
//! after `PA`, and waits on `TS` so faults surface immediately.
//! [`PositionTolerance`] is for older controllers without `TS`/`TE`: it
//! polls `TP` until the reading is within tolerance of the target.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use super::Controller;
use crate::axis::state::ControllerState;
use crate::error::{StageError, StageResult};
use crate::protocol::command::Command;
use crate::protocol::error::ErrorCode;

/// Result of a completed move. `position` is the controller's own reading
/// after arrival, which may differ slightly from `target`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoveOutcome {
    pub target: f64,
    pub position: Option<f64>,
    pub state: Option<ControllerState>,
}

#[async_trait::async_trait]
pub trait MotionCompletion: Send + Sync {
    fn name(&self) -> &str;

    async fn move_to(&self, controller: &mut Controller, target: f64) -> StageResult<MoveOutcome>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStrategy {
    #[default]
    StatusPolling,
    PositionTolerance,
}

impl CompletionStrategy {
    pub fn build(&self) -> Box<dyn MotionCompletion> {
        match self {
            CompletionStrategy::StatusPolling => Box::new(StatusPolling),
            CompletionStrategy::PositionTolerance => Box::new(PositionTolerance),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatusPolling;

#[async_trait::async_trait]
impl MotionCompletion for StatusPolling {
    fn name(&self) -> &str {
        "status_polling"
    }

    async fn move_to(&self, controller: &mut Controller, target: f64) -> StageResult<MoveOutcome> {
        let operation = format!("move to {} mm", target);

        let state = controller.poll_state().await?;
        if !state.is_ready() {
            warn!("Cannot move: controller in state {}", state);
            return Err(StageError::NotReady { operation, state });
        }

        info!("Moving to {} mm", target);
        controller.send(Command::move_absolute(target)).await?;

        if let ErrorCode::Code(code) = controller.get_error().await? {
            warn!("Move to {} mm rejected with error code {}", target, code);
            return Err(StageError::Rejected { target, code });
        }

        let timeout = controller.timing().move_timeout();
        let state = controller
            .wait_until_ready(timeout)
            .await?
            .into_result(&operation, timeout)?;

        let position = controller.get_position().await?;
        match position {
            Some(pos) => info!("Reached {:.4} mm", pos),
            None => warn!("Move finished but position read back garbled"),
        }

        Ok(MoveOutcome {
            target,
            position,
            state: Some(state),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PositionTolerance;

#[async_trait::async_trait]
impl MotionCompletion for PositionTolerance {
    fn name(&self) -> &str {
        "position_tolerance"
    }

    async fn move_to(&self, controller: &mut Controller, target: f64) -> StageResult<MoveOutcome> {
        let operation = format!("move to {} mm", target);
        let tolerance = controller.timing().tolerance_mm;
        let interval = controller.timing().tolerance_poll_interval();
        let timeout = controller.timing().tolerance_timeout();
        let deadline = timeout.map(|t| Instant::now() + t);

        info!("Moving to {} mm (tolerance {} mm)", target, tolerance);
        controller.send(Command::move_absolute(target)).await?;

        loop {
            controller.check_cancelled(&operation)?;

            if let Some(pos) = controller.get_position().await? {
                if (pos - target).abs() < tolerance {
                    info!("Target reached at {:.4} mm", pos);
                    return Ok(MoveOutcome {
                        target,
                        position: Some(pos),
                        state: None,
                    });
                }
            }

            if let (Some(deadline), Some(waited)) = (deadline, timeout) {
                if Instant::now() >= deadline {
                    warn!("No arrival within {:?}", waited);
                    return Err(StageError::Timeout {
                        operation,
                        waited,
                        last_state: ControllerState::Unknown,
                    });
                }
            }

            controller.pause(interval, &operation).await?;
        }
    }
}
