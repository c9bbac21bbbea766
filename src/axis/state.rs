use std::fmt;

use serde::{Serialize, Serializer};

/// Which transition brought the controller into its READY state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyOrigin {
    Homing,
    Moving,
    Disable,
    Jogging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Needs homing before absolute moves are trusted. Holds the raw code.
    NotReferenced(u8),
    Homing,
    Moving,
    Ready(ReadyOrigin),
    /// Disabled or configuration states. Holds the raw code.
    Disabled(u8),
    Unknown,
}

impl ControllerState {
    /// Maps a status code byte (the value of the last two hex digits).
    pub fn from_code(code: u8) -> Self {
        match code {
            0x0A..=0x11 => ControllerState::NotReferenced(code),
            0x1E | 0x1F => ControllerState::Homing,
            0x28 => ControllerState::Moving,
            0x32 => ControllerState::Ready(ReadyOrigin::Homing),
            0x33 => ControllerState::Ready(ReadyOrigin::Moving),
            0x34 => ControllerState::Ready(ReadyOrigin::Disable),
            0x35 => ControllerState::Ready(ReadyOrigin::Jogging),
            0x3C | 0x3D | 0x3E | 0x14 => ControllerState::Disabled(code),
            _ => ControllerState::Unknown,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ControllerState::Ready(_))
    }

    /// Homing or moving: another operation is already in progress.
    pub fn is_busy(&self) -> bool {
        matches!(self, ControllerState::Homing | ControllerState::Moving)
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, ControllerState::Disabled(_))
    }

    pub fn needs_homing(&self) -> bool {
        matches!(self, ControllerState::NotReferenced(_))
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerState::NotReferenced(code) => write!(f, "not referenced ({:02X})", code),
            ControllerState::Homing => write!(f, "homing"),
            ControllerState::Moving => write!(f, "moving"),
            ControllerState::Ready(origin) => {
                let from = match origin {
                    ReadyOrigin::Homing => "homing",
                    ReadyOrigin::Moving => "moving",
                    ReadyOrigin::Disable => "disable",
                    ReadyOrigin::Jogging => "jogging",
                };
                write!(f, "ready from {}", from)
            }
            ControllerState::Disabled(code) => write!(f, "disabled ({:02X})", code),
            ControllerState::Unknown => write!(f, "unknown"),
        }
    }
}

impl Serialize for ControllerState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
