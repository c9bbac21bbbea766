//! Public stage driver used by measurement code.

pub mod config;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::axis::state::ControllerState;
use crate::axis::state_info::StateInfo;
use crate::controller::completion::{MotionCompletion, MoveOutcome};
use crate::controller::Controller;
use crate::error::StageResult;
use crate::protocol::error::ErrorCode;
use crate::transport::{SerialTransport, Transport};
use config::StageConfig;

pub struct Stage {
    controller: Controller,
    completion: Box<dyn MotionCompletion>,
}

impl Stage {
    /// Opens the serial port and clears bytes left over from a previous
    /// session. Homing is left to the caller.
    pub async fn connect(config: &StageConfig) -> StageResult<Self> {
        info!("Connecting to stage on {}", config.serial.port);
        let transport = SerialTransport::open(&config.serial)?;
        Self::with_transport(Box::new(transport), config).await
    }

    pub async fn with_transport(
        transport: Box<dyn Transport>,
        config: &StageConfig,
    ) -> StageResult<Self> {
        let mut controller = Controller::new(transport, config.axis, config.timing.clone());
        controller.discard_input().await?;

        let completion = config.completion.build();
        info!(
            "Stage ready on axis {} ({} completion)",
            config.axis,
            completion.name()
        );

        Ok(Self {
            controller,
            completion,
        })
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.controller.cancel_token()
    }

    pub fn set_cancel_token(&mut self, token: CancellationToken) {
        self.controller.set_cancel_token(token);
    }

    pub async fn home(&mut self) -> StageResult<ControllerState> {
        self.controller.home().await
    }

    pub async fn move_absolute(&mut self, target: f64) -> StageResult<MoveOutcome> {
        self.completion.move_to(&mut self.controller, target).await
    }

    /// Always a fresh `TP` read; `None` when the reply was garbled.
    pub async fn get_position(&mut self) -> StageResult<Option<f64>> {
        self.controller.get_position().await
    }

    pub async fn get_error(&mut self) -> StageResult<ErrorCode> {
        self.controller.get_error().await
    }

    pub async fn state(&mut self) -> StageResult<StateInfo> {
        self.controller.poll_state_info().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::state::ReadyOrigin;
    use crate::controller::completion::CompletionStrategy;
    use crate::error::StageError;
    use crate::protocol::command::OpCode;
    use crate::transport::ScriptedTransport;

    async fn stage(script: &ScriptedTransport) -> Stage {
        Stage::with_transport(Box::new(script.clone()), &StageConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_discards_stale_input() {
        let script = ScriptedTransport::new();
        let _stage = stage(&script).await;
        assert_eq!(script.discard_count(), 1);
        assert!(script.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_absolute_success() {
        let script = ScriptedTransport::new()
            .with_replies(OpCode::TellStatus, &["000032", "000028", "000028", "000033"])
            .with_replies(OpCode::TellError, &["@"])
            .with_replies(OpCode::TellPosition, &["12.5"]);
        let mut stage = stage(&script).await;

        let outcome = stage.move_absolute(12.5).await.unwrap();
        assert_eq!(outcome.target, 12.5);
        assert_eq!(outcome.position, Some(12.5));
        assert_eq!(outcome.state, Some(ControllerState::Ready(ReadyOrigin::Moving)));
        assert_eq!(script.writes().last().map(String::as_str), Some("1TP"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_while_moving_sends_no_pa() {
        let script = ScriptedTransport::new().with_replies(OpCode::TellStatus, &["000028"]);
        let mut stage = stage(&script).await;

        let err = stage.move_absolute(5.0).await.unwrap_err();
        assert!(matches!(err, StageError::NotReady { .. }));
        assert_eq!(script.count(OpCode::MoveAbsolute), 0);

        // The stage stays usable once the controller is ready again.
        script.set_replies(OpCode::TellStatus, &["000033"]);
        script.set_replies(OpCode::TellError, &["@"]);
        script.set_replies(OpCode::TellPosition, &["5.0"]);
        assert!(stage.move_absolute(5.0).await.is_ok());
        assert_eq!(script.count(OpCode::MoveAbsolute), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_moves_unless_ready() {
        for code in ["00000A", "00001E", "000028", "00003C", "000014", "000099", "bad"] {
            let script = ScriptedTransport::new().with_replies(OpCode::TellStatus, &[code]);
            let mut stage = stage(&script).await;
            assert!(stage.move_absolute(1.0).await.is_err(), "{}", code);
            assert_eq!(script.count(OpCode::MoveAbsolute), 0, "{}", code);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_legacy_completion_skips_status() {
        let script = ScriptedTransport::new().with_replies(OpCode::TellPosition, &["2.0", "2.001"]);
        let config = StageConfig {
            completion: CompletionStrategy::PositionTolerance,
            ..StageConfig::default()
        };
        let mut stage = Stage::with_transport(Box::new(script.clone()), &config)
            .await
            .unwrap();

        let outcome = stage.move_absolute(2.0).await.unwrap();
        assert_eq!(outcome.position, Some(2.0));
        assert_eq!(script.writes(), vec!["1PA2", "1TP"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_reports_raw_code() {
        let script = ScriptedTransport::new().with_replies(OpCode::TellStatus, &["00003C"]);
        let mut stage = stage(&script).await;

        let info = stage.state().await.unwrap();
        assert!(info.is_faulted());
        assert_eq!(info.code.as_deref(), Some("3C"));
    }
}
