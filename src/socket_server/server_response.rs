use serde::{Deserialize, Serialize};

use super::error::RequestError;
use crate::error::StageError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServerResponse {
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        data: serde_json::Value,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl ServerResponse {
    pub fn success(id: Option<String>, data: serde_json::Value) -> Self {
        Self::Success { id, data }
    }

    pub fn error(id: Option<String>, message: impl Into<String>) -> Self {
        Self::Error {
            id,
            message: message.into(),
            code: None,
        }
    }

    /// Reports a failed command. Stage errors carry their taxonomy code so
    /// clients can tell a rejected target from a fault or a timeout.
    pub fn failure(id: Option<String>, err: &anyhow::Error) -> Self {
        match err.downcast_ref::<StageError>() {
            Some(stage_err) => Self::Error {
                id,
                message: stage_err.to_string(),
                code: Some(stage_err.kind().to_string()),
            },
            None => Self::error(id, err.to_string()),
        }
    }

    pub fn to_json(&self) -> Result<String, RequestError> {
        serde_json::to_string(self).map_err(RequestError::from)
    }
}
