use std::{fmt, str::FromStr};

/// Two-letter operation codes understood by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// `PA`: move absolute.
    MoveAbsolute,
    /// `TP`: tell position.
    TellPosition,
    /// `TS`: tell status.
    TellStatus,
    /// `TE`: tell last error.
    TellError,
    /// `OR`: home search.
    Home,
}

impl OpCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpCode::MoveAbsolute => "PA",
            OpCode::TellPosition => "TP",
            OpCode::TellStatus => "TS",
            OpCode::TellError => "TE",
            OpCode::Home => "OR",
        }
    }

    /// Queries are answered with one line; set commands are silent.
    pub fn expects_reply(&self) -> bool {
        matches!(
            self,
            OpCode::TellPosition | OpCode::TellStatus | OpCode::TellError
        )
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PA" => Ok(OpCode::MoveAbsolute),
            "TP" => Ok(OpCode::TellPosition),
            "TS" => Ok(OpCode::TellStatus),
            "TE" => Ok(OpCode::TellError),
            "OR" => Ok(OpCode::Home),
            other => Err(format!("Unknown op code: {}", other)),
        }
    }
}

/// One outgoing frame, built per call and never retained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Command {
    pub opcode: OpCode,
    pub arg: Option<f64>,
}

impl Command {
    pub fn new(opcode: OpCode) -> Self {
        Self { opcode, arg: None }
    }

    pub fn with_arg(opcode: OpCode, arg: f64) -> Self {
        Self {
            opcode,
            arg: Some(arg),
        }
    }

    pub fn move_absolute(target: f64) -> Self {
        Self::with_arg(OpCode::MoveAbsolute, target)
    }
}

impl From<OpCode> for Command {
    fn from(opcode: OpCode) -> Self {
        Self::new(opcode)
    }
}
