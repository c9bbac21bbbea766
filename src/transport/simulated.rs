//! In-process stand-in for a single-axis controller, used by the demo and
//! by `--simulate`. Motion is modeled against the tokio clock.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::Transport;
use crate::axis::AxisId;
use crate::protocol::command::OpCode;

const NOT_REFERENCED: u8 = 0x0A;
const HOMING: u8 = 0x1E;
const MOVING: u8 = 0x28;
const READY_FROM_HOMING: u8 = 0x32;
const READY_FROM_MOVING: u8 = 0x33;

/// Parameter out of limits.
const ERR_OUT_OF_RANGE: &str = "C";
/// Command not allowed in the current state.
const ERR_NOT_ALLOWED: &str = "D";
/// Unknown command.
const ERR_UNKNOWN_COMMAND: &str = "A";

const MIN_VELOCITY: f64 = 1e-3;

struct Motion {
    from: f64,
    to: f64,
    started: Instant,
    duration: Duration,
}

pub struct SimulatedController {
    axis: AxisId,
    code: u8,
    position: f64,
    motion: Option<Motion>,
    homing_until: Option<Instant>,
    error: Option<&'static str>,
    pending: VecDeque<String>,
    min_position: f64,
    max_position: f64,
    velocity: f64,
    home_duration: Duration,
}

impl SimulatedController {
    pub fn new() -> Self {
        Self {
            axis: AxisId::default(),
            code: NOT_REFERENCED,
            position: 0.0,
            motion: None,
            homing_until: None,
            error: None,
            pending: VecDeque::new(),
            min_position: 0.0,
            max_position: 25.0,
            velocity: 5.0,
            home_duration: Duration::from_millis(500),
        }
    }

    /// Starts already homed (READY from homing).
    pub fn referenced(mut self) -> Self {
        self.code = READY_FROM_HOMING;
        self
    }

    pub fn with_travel(mut self, min: f64, max: f64) -> Self {
        self.min_position = min;
        self.max_position = max;
        self
    }

    /// Clamped to a small positive floor so move times stay finite.
    pub fn with_velocity(mut self, mm_per_s: f64) -> Self {
        self.velocity = mm_per_s.max(MIN_VELOCITY);
        self
    }

    pub fn with_home_duration(mut self, duration: Duration) -> Self {
        self.home_duration = duration;
        self
    }

    /// Forces a raw status code, e.g. `0x3C` to model a disabled axis.
    pub fn with_state_code(mut self, code: u8) -> Self {
        self.code = code;
        self
    }

    fn advance(&mut self) {
        let now = Instant::now();

        if let Some(until) = self.homing_until {
            if now >= until {
                self.homing_until = None;
                self.position = 0.0;
                self.code = READY_FROM_HOMING;
            }
        }

        if let Some(motion) = &self.motion {
            let elapsed = now.saturating_duration_since(motion.started);
            if elapsed >= motion.duration {
                self.position = motion.to;
                self.code = READY_FROM_MOVING;
                self.motion = None;
            } else {
                let fraction = elapsed.as_secs_f64() / motion.duration.as_secs_f64();
                self.position = motion.from + (motion.to - motion.from) * fraction;
            }
        }
    }

    fn is_ready(&self) -> bool {
        (0x32..=0x35).contains(&self.code)
    }

    fn handle(&mut self, opcode: Option<OpCode>, arg: &str) {
        self.advance();

        let reply = match opcode {
            Some(OpCode::TellStatus) => Some(format!("0000{:02X}", self.code)),
            Some(OpCode::TellPosition) => Some(format!("{}", self.position)),
            Some(OpCode::TellError) => Some(self.error.take().unwrap_or("@").to_string()),
            Some(OpCode::Home) => {
                if (0x0A..=0x11).contains(&self.code) {
                    self.code = HOMING;
                    self.homing_until = Some(Instant::now() + self.home_duration);
                } else {
                    self.error = Some(ERR_NOT_ALLOWED);
                }
                None
            }
            Some(OpCode::MoveAbsolute) => {
                self.start_move(arg);
                None
            }
            None => {
                self.error = Some(ERR_UNKNOWN_COMMAND);
                None
            }
        };

        if let (Some(op), Some(payload)) = (opcode, reply) {
            self.pending
                .push_back(format!("{}{}{}\r", self.axis, op, payload));
        }
    }

    fn start_move(&mut self, arg: &str) {
        if !self.is_ready() {
            self.error = Some(ERR_NOT_ALLOWED);
            return;
        }
        let Ok(target) = arg.parse::<f64>() else {
            self.error = Some(ERR_OUT_OF_RANGE);
            return;
        };
        if !(self.min_position..=self.max_position).contains(&target) {
            self.error = Some(ERR_OUT_OF_RANGE);
            return;
        }

        let distance = (target - self.position).abs();
        let duration = Duration::from_secs_f64(distance / self.velocity);
        debug!(
            "Simulated axis moving {} -> {} over {:?}",
            self.position, target, duration
        );
        self.code = MOVING;
        self.motion = Some(Motion {
            from: self.position,
            to: target,
            started: Instant::now(),
            duration,
        });
    }
}

impl Default for SimulatedController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for SimulatedController {
    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let frame = String::from_utf8_lossy(bytes);
        let axis_prefix = self.axis.to_string();
        let Some(body) = frame.trim().strip_prefix(axis_prefix.as_str()) else {
            // Addressed to another axis: ignored, as on a shared bus.
            return Ok(());
        };
        let opcode = body.get(..2).and_then(|c| c.parse::<OpCode>().ok());
        let arg = body.get(2..).unwrap_or("").to_string();
        self.handle(opcode, &arg);
        Ok(())
    }

    async fn read_line(&mut self, timeout: Duration) -> std::io::Result<String> {
        match self.pending.pop_front() {
            Some(line) => Ok(line),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(String::new())
            }
        }
    }

    async fn discard_input(&mut self) -> std::io::Result<()> {
        self.pending.clear();
        Ok(())
    }
}
