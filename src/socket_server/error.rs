use thiserror::Error;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
}

impl From<serde_json::Error> for RequestError {
    fn from(err: serde_json::Error) -> Self {
        RequestError::InvalidJson(err.to_string())
    }
}
