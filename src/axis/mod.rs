pub mod state;
pub mod state_info;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric address prefixed onto every command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AxisId(pub u8);

impl AxisId {
    pub fn new(id: u8) -> Self {
        Self(id)
    }
}

impl Default for AxisId {
    fn default() -> Self {
        Self(1)
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
