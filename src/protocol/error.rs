use std::fmt;

/// Reply to `TE` meaning "no error memorized".
pub const NO_ERROR_SENTINEL: &str = "@";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    None,
    Code(String),
}

impl ErrorCode {
    /// An empty payload (read timeout) carries no token and counts as none.
    pub fn parse(payload: &str) -> Self {
        let payload = payload.trim();
        if payload == NO_ERROR_SENTINEL || payload.is_empty() {
            ErrorCode::None
        } else {
            ErrorCode::Code(payload.to_string())
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ErrorCode::None)
    }

    /// Raw token, empty when there is no error.
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::None => "",
            ErrorCode::Code(code) => code,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::None => write!(f, "no error"),
            ErrorCode::Code(code) => write!(f, "{}", code),
        }
    }
}
