use serde::Serialize;

use super::state::ControllerState;

/// Length of a well-formed `TS` payload: four bitmask digits plus the state code.
pub const STATUS_PAYLOAD_LEN: usize = 6;

/// A decoded `TS` reply, keeping the raw pieces for error reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateInfo {
    pub state: ControllerState,
    pub code: Option<String>,
    /// Positioner error bitmask. Carried for reporting only.
    pub error_bits: Option<String>,
}

impl StateInfo {
    pub fn new(state: ControllerState) -> Self {
        Self {
            state,
            code: None,
            error_bits: None,
        }
    }

    /// Garbled or truncated payloads yield `Unknown` instead of an error.
    pub fn from_payload(payload: &str) -> Self {
        if payload.len() != STATUS_PAYLOAD_LEN || !payload.is_ascii() {
            return Self::new(ControllerState::Unknown);
        }

        let (bits, code) = payload.split_at(STATUS_PAYLOAD_LEN - 2);
        let state = parse_upper_hex(code)
            .map(ControllerState::from_code)
            .unwrap_or(ControllerState::Unknown);

        Self {
            state,
            code: Some(code.to_string()),
            error_bits: Some(bits.to_string()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    pub fn is_faulted(&self) -> bool {
        self.state.is_faulted()
    }
}

/// Classifies a status payload using only its last two characters.
pub fn interpret(payload: &str) -> ControllerState {
    StateInfo::from_payload(payload).state
}

fn parse_upper_hex(code: &str) -> Option<u8> {
    let upper = code
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b));
    if !upper {
        return None;
    }
    u8::from_str_radix(code, 16).ok()
}
