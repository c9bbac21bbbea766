//! Controller state machine: request/response exchanges, status polling
//! with deadlines, and homing.

pub mod completion;
pub mod config;

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::axis::state::ControllerState;
use crate::axis::state_info::StateInfo;
use crate::axis::AxisId;
use crate::error::{StageError, StageResult};
use crate::protocol::command::{Command, OpCode};
use crate::protocol::error::ErrorCode;
use crate::protocol::{self, parse_position};
use crate::transport::Transport;
use config::ControllerTiming;

/// How a readiness wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready(ControllerState),
    Faulted(ControllerState),
    /// Deadline passed; carries the last state observed.
    TimedOut(ControllerState),
}

impl WaitOutcome {
    pub fn into_result(self, operation: &str, waited: Duration) -> StageResult<ControllerState> {
        match self {
            WaitOutcome::Ready(state) => Ok(state),
            WaitOutcome::Faulted(state) => Err(StageError::Fault {
                operation: operation.to_string(),
                state,
            }),
            WaitOutcome::TimedOut(last_state) => Err(StageError::Timeout {
                operation: operation.to_string(),
                waited,
                last_state,
            }),
        }
    }
}

/// Sole reader and writer of the transport.
pub struct Controller {
    transport: Box<dyn Transport>,
    axis: AxisId,
    timing: ControllerTiming,
    cancel: CancellationToken,
}

impl Controller {
    pub fn new(transport: Box<dyn Transport>, axis: AxisId, timing: ControllerTiming) -> Self {
        Self {
            transport,
            axis,
            timing,
            cancel: CancellationToken::new(),
        }
    }

    pub fn axis(&self) -> AxisId {
        self.axis
    }

    pub fn timing(&self) -> &ControllerTiming {
        &self.timing
    }

    /// Cancelling the token stops poll loops between iterations.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn set_cancel_token(&mut self, token: CancellationToken) {
        self.cancel = token;
    }

    pub async fn discard_input(&mut self) -> StageResult<()> {
        self.transport
            .discard_input()
            .await
            .map_err(|e| StageError::io("discard input", e))
    }

    /// Writes one frame and waits out the controller's processing delay.
    pub async fn send(&mut self, command: Command) -> StageResult<()> {
        let frame = protocol::encode(self.axis, &command);
        debug!("-> {}", String::from_utf8_lossy(&frame).trim_end());
        self.transport
            .write(&frame)
            .await
            .map_err(|e| StageError::io(command.opcode.as_str(), e))?;
        sleep(self.timing.command_delay()).await;
        Ok(())
    }

    /// Sends a query and returns its payload with the echo prefix removed.
    /// An empty payload means the reply never arrived.
    pub async fn query(&mut self, opcode: OpCode) -> StageResult<String> {
        self.send(Command::new(opcode)).await?;
        let raw = self
            .transport
            .read_line(self.timing.read_timeout())
            .await
            .map_err(|e| StageError::io(opcode.as_str(), e))?;
        debug!("<- {}", raw.trim_end());
        if raw.trim().is_empty() {
            warn!("No reply to {} within {:?}", opcode, self.timing.read_timeout());
        }
        Ok(protocol::decode(self.axis, opcode, &raw).to_string())
    }

    pub async fn poll_state_info(&mut self) -> StageResult<StateInfo> {
        let payload = self.query(OpCode::TellStatus).await?;
        let info = StateInfo::from_payload(&payload);
        if info.state == ControllerState::Unknown {
            warn!("Unrecognized status payload '{}'", payload);
        }
        Ok(info)
    }

    pub async fn poll_state(&mut self) -> StageResult<ControllerState> {
        Ok(self.poll_state_info().await?.state)
    }

    /// Polls `TS` every poll interval until READY, a fault, or the deadline.
    pub async fn wait_until_ready(&mut self, timeout: Duration) -> StageResult<WaitOutcome> {
        let deadline = Instant::now() + timeout;

        loop {
            self.check_cancelled("wait for ready")?;

            let state = self.poll_state().await?;
            if state.is_ready() {
                return Ok(WaitOutcome::Ready(state));
            }
            if state.is_faulted() {
                error!("Controller entered state {} while waiting", state);
                return Ok(WaitOutcome::Faulted(state));
            }
            if Instant::now() >= deadline {
                warn!("Timed out after {:?} waiting for ready (state {})", timeout, state);
                return Ok(WaitOutcome::TimedOut(state));
            }

            self.pause(self.timing.poll_interval(), "wait for ready")
                .await?;
        }
    }

    /// References the stage unless it already is. Never re-issues `OR` on a
    /// READY controller, and never interrupts a motion already in progress.
    pub async fn home(&mut self) -> StageResult<ControllerState> {
        let state = self.classify_state("home", self.timing.home_timeout()).await?;

        if state.is_ready() {
            info!("Already referenced ({}), skipping homing", state);
            return Ok(state);
        }

        if state.is_faulted() {
            error!("Cannot home: controller in state {}", state);
            return Err(StageError::Fault {
                operation: "home".to_string(),
                state,
            });
        }

        let timeout = if state.needs_homing() {
            info!("Homing (state {})", state);
            self.send(Command::new(OpCode::Home)).await?;
            self.timing.home_timeout()
        } else {
            info!("Stage is {}, waiting for it to settle", state);
            self.timing.move_timeout()
        };

        let state = self
            .wait_until_ready(timeout)
            .await?
            .into_result("home", timeout)?;
        info!("Homing complete ({})", state);
        Ok(state)
    }

    /// Polls until the status reads as something other than `Unknown`.
    async fn classify_state(
        &mut self,
        operation: &str,
        timeout: Duration,
    ) -> StageResult<ControllerState> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.poll_state().await?;
            if state != ControllerState::Unknown {
                return Ok(state);
            }
            if Instant::now() >= deadline {
                warn!("Status still unreadable after {:?}", timeout);
                return Err(StageError::Timeout {
                    operation: operation.to_string(),
                    waited: timeout,
                    last_state: state,
                });
            }
            self.pause(self.timing.poll_interval(), operation).await?;
        }
    }

    /// `None` when the reply could not be parsed.
    pub async fn get_position(&mut self) -> StageResult<Option<f64>> {
        let payload = self.query(OpCode::TellPosition).await?;
        let position = parse_position(&payload);
        if position.is_none() {
            warn!("Unparseable position reply '{}'", payload);
        }
        Ok(position)
    }

    pub async fn get_error(&mut self) -> StageResult<ErrorCode> {
        let payload = self.query(OpCode::TellError).await?;
        Ok(ErrorCode::parse(&payload))
    }

    pub(crate) fn check_cancelled(&self, operation: &str) -> StageResult<()> {
        if self.cancel.is_cancelled() {
            return Err(StageError::Cancelled {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Sleeps between poll iterations; cancellation ends the sleep early.
    pub(crate) async fn pause(&self, duration: Duration, operation: &str) -> StageResult<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(StageError::Cancelled {
                operation: operation.to_string(),
            }),
            _ = sleep(duration) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::state::ReadyOrigin;
    use crate::transport::ScriptedTransport;

    fn controller(script: &ScriptedTransport) -> Controller {
        Controller::new(
            Box::new(script.clone()),
            AxisId::default(),
            ControllerTiming::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_state() {
        let script = ScriptedTransport::new().with_replies(OpCode::TellStatus, &["000033"]);
        let mut ctl = controller(&script);
        assert_eq!(
            ctl.poll_state().await.unwrap(),
            ControllerState::Ready(ReadyOrigin::Moving)
        );
        assert_eq!(script.writes(), vec!["1TS"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_state_without_prefix() {
        let script = ScriptedTransport::new()
            .without_prefix()
            .with_replies(OpCode::TellStatus, &["000028"]);
        let mut ctl = controller(&script);
        assert_eq!(ctl.poll_state().await.unwrap(), ControllerState::Moving);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_reply_is_unknown() {
        let script = ScriptedTransport::new();
        let mut ctl = controller(&script);
        assert_eq!(ctl.poll_state().await.unwrap(), ControllerState::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_while_moving() {
        let script = ScriptedTransport::new().with_replies(OpCode::TellStatus, &["000028"]);
        let mut ctl = controller(&script);

        let outcome = ctl.wait_until_ready(Duration::from_secs(1)).await.unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut(ControllerState::Moving));

        // One poll per 100 ms interval plus the 20 ms command delay.
        let polls = script.count(OpCode::TellStatus);
        assert!((5..=11).contains(&polls), "polled {} times", polls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_promptly_once_ready() {
        let script = ScriptedTransport::new().with_replies(OpCode::TellStatus, &["000028"]);
        let mut ctl = controller(&script);

        let injector = script.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(500)).await;
            injector.set_replies(OpCode::TellStatus, &["000033"]);
        });

        let started = Instant::now();
        let outcome = ctl.wait_until_ready(Duration::from_secs(30)).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(
            outcome,
            WaitOutcome::Ready(ControllerState::Ready(ReadyOrigin::Moving))
        );
        let bound = Duration::from_millis(500 + 100 + 20 + 20);
        assert!(elapsed <= bound, "took {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_fails_fast_on_fault() {
        let script = ScriptedTransport::new()
            .with_replies(OpCode::TellStatus, &["000028", "00003C", "000033"]);
        let mut ctl = controller(&script);

        let outcome = ctl.wait_until_ready(Duration::from_secs(30)).await.unwrap();
        assert_eq!(outcome, WaitOutcome::Faulted(ControllerState::Disabled(0x3C)));
        assert_eq!(script.count(OpCode::TellStatus), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_keeps_polling_through_garbage() {
        let script = ScriptedTransport::new()
            .with_replies(OpCode::TellStatus, &["0028", "", "00003", "000032"]);
        let mut ctl = controller(&script);

        let outcome = ctl.wait_until_ready(Duration::from_secs(5)).await.unwrap();
        assert!(matches!(outcome, WaitOutcome::Ready(_)));
        assert_eq!(script.count(OpCode::TellStatus), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_home_when_ready_is_noop() {
        for code in ["000032", "000033", "000034", "000035"] {
            let script = ScriptedTransport::new().with_replies(OpCode::TellStatus, &[code]);
            let mut ctl = controller(&script);

            assert!(ctl.home().await.unwrap().is_ready());
            assert_eq!(script.count(OpCode::Home), 0);
            assert_eq!(script.writes(), vec!["1TS"]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_home_from_not_referenced() {
        let script = ScriptedTransport::new()
            .with_replies(OpCode::TellStatus, &["00000A", "00001E", "00001F", "000032"]);
        let mut ctl = controller(&script);

        let state = ctl.home().await.unwrap();
        assert_eq!(state, ControllerState::Ready(ReadyOrigin::Homing));
        assert_eq!(script.count(OpCode::Home), 1);
        assert_eq!(script.writes(), vec!["1TS", "1OR", "1TS", "1TS", "1TS"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_home_while_busy_waits_without_or() {
        let script = ScriptedTransport::new()
            .with_replies(OpCode::TellStatus, &["00001E", "00001F", "000032"]);
        let mut ctl = controller(&script);

        assert!(ctl.home().await.unwrap().is_ready());
        assert_eq!(script.count(OpCode::Home), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_home_repolls_unreadable_status() {
        // Short read while the stage is moving must not trigger OR.
        let script = ScriptedTransport::new()
            .with_replies(OpCode::TellStatus, &["0028", "000028", "000033"]);
        let mut ctl = controller(&script);

        assert!(ctl.home().await.unwrap().is_ready());
        assert_eq!(script.count(OpCode::Home), 0);
        assert_eq!(script.writes(), vec!["1TS", "1TS", "1TS"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_home_gives_up_on_unreadable_status() {
        let script = ScriptedTransport::new().with_replies(OpCode::TellStatus, &["00"]);
        let timing = ControllerTiming {
            home_timeout_ms: 1_000,
            ..ControllerTiming::default()
        };
        let mut ctl = Controller::new(Box::new(script.clone()), AxisId::default(), timing);

        match ctl.home().await.unwrap_err() {
            StageError::Timeout { last_state, .. } => {
                assert_eq!(last_state, ControllerState::Unknown)
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(script.count(OpCode::Home), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_home() {
        let script = ScriptedTransport::new()
            .with_replies(OpCode::TellStatus, &["00000A", "00001E"]);
        let mut ctl = controller(&script);

        let token = ctl.cancel_token();
        tokio::spawn(async move {
            sleep(Duration::from_millis(500)).await;
            token.cancel();
        });

        let err = ctl.home().await.unwrap_err();
        assert_eq!(err.kind(), "cancelled");
        assert_eq!(script.count(OpCode::Home), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_home_faulted_controller() {
        let script = ScriptedTransport::new().with_replies(OpCode::TellStatus, &["00003D"]);
        let mut ctl = controller(&script);

        let err = ctl.home().await.unwrap_err();
        assert!(matches!(err, StageError::Fault { .. }));
        assert_eq!(script.count(OpCode::Home), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_home_timeout_is_reported_not_retried() {
        let script = ScriptedTransport::new()
            .with_replies(OpCode::TellStatus, &["00000A", "00001E"]);
        let timing = ControllerTiming {
            home_timeout_ms: 1_000,
            ..ControllerTiming::default()
        };
        let mut ctl = Controller::new(Box::new(script.clone()), AxisId::default(), timing);

        let err = ctl.home().await.unwrap_err();
        match err {
            StageError::Timeout { last_state, .. } => {
                assert_eq!(last_state, ControllerState::Homing)
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(script.count(OpCode::Home), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_position() {
        let script = ScriptedTransport::new()
            .with_replies(OpCode::TellPosition, &["10.005", "garbled?", "-3.25"]);
        let mut ctl = controller(&script);

        assert_eq!(ctl.get_position().await.unwrap(), Some(10.005));
        assert_eq!(ctl.get_position().await.unwrap(), None);
        assert_eq!(ctl.get_position().await.unwrap(), Some(-3.25));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_error() {
        let script = ScriptedTransport::new().with_replies(OpCode::TellError, &["@", "C"]);
        let mut ctl = controller(&script);

        assert_eq!(ctl.get_error().await.unwrap(), ErrorCode::None);
        assert_eq!(
            ctl.get_error().await.unwrap(),
            ErrorCode::Code("C".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_propagates() {
        let script = ScriptedTransport::new();
        script.set_fail_writes(true);
        let mut ctl = controller(&script);

        let err = ctl.poll_state().await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.kind(), "io");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_polls() {
        let script = ScriptedTransport::new().with_replies(OpCode::TellStatus, &["000028"]);
        let mut ctl = controller(&script);

        let token = ctl.cancel_token();
        tokio::spawn(async move {
            sleep(Duration::from_millis(350)).await;
            token.cancel();
        });

        let err = ctl.wait_until_ready(Duration::from_secs(30)).await.unwrap_err();
        assert!(matches!(err, StageError::Cancelled { .. }));
        let polls = script.count(OpCode::TellStatus);
        assert!((2..=4).contains(&polls), "polled {} times", polls);
    }
}
