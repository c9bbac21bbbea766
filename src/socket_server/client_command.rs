use serde::{Deserialize, Serialize};

use super::error::RequestError;

/// Stage request carried on one line of the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Home,
    Move { target: f64 },
    GetPosition,
    GetError,
    GetState,
    Ping,
}

/// Command plus the optional correlation id echoed in the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientEnvelope {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(flatten)]
    pub cmd: ClientCommand,
}

impl ClientEnvelope {
    pub fn parse(line: &str) -> Result<Self, RequestError> {
        serde_json::from_str(line).map_err(RequestError::from)
    }
}
