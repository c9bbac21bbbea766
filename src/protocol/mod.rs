//! ASCII framing for the controller: `{axis}{opcode}{arg}\r\n` out,
//! `{axis}{opcode}{payload}` back.

pub mod command;
pub mod error;

use crate::axis::AxisId;
use command::{Command, OpCode};

pub const FRAME_TERMINATOR: &str = "\r\n";

pub fn encode(axis: AxisId, command: &Command) -> Vec<u8> {
    let arg = command.arg.map(|v| v.to_string()).unwrap_or_default();
    format!("{}{}{}{}", axis, command.opcode, arg, FRAME_TERMINATOR).into_bytes()
}

/// Strips the echoed `{axis}{opcode}` prefix when present. Some controllers
/// omit it, in which case the trimmed line is returned as is. A line echoing
/// a different opcode is a stale reply and decodes as empty.
pub fn decode<'a>(axis: AxisId, opcode: OpCode, raw: &'a str) -> &'a str {
    let raw = raw.trim();
    let axis_prefix = axis.to_string();
    let Some(rest) = raw.strip_prefix(axis_prefix.as_str()) else {
        return raw;
    };
    match rest.get(..2).and_then(|code| code.parse::<OpCode>().ok()) {
        Some(echoed) if echoed == opcode => rest[2..].trim(),
        Some(_) => "",
        None => raw,
    }
}

/// `None` stands for "unknown position": garbled reads are expected on this
/// link and the caller polls again.
pub fn parse_position(payload: &str) -> Option<f64> {
    payload.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use error::ErrorCode;

    #[test]
    fn test_encode_query() {
        let frame = encode(AxisId::default(), &Command::new(OpCode::TellStatus));
        assert_eq!(frame, b"1TS\r\n");
    }

    #[test]
    fn test_encode_move_uses_minimal_decimal() {
        let axis = AxisId::default();
        assert_eq!(encode(axis, &Command::move_absolute(12.5)), b"1PA12.5\r\n");
        assert_eq!(encode(axis, &Command::move_absolute(10.005)), b"1PA10.005\r\n");
        assert_eq!(encode(axis, &Command::move_absolute(-3.25)), b"1PA-3.25\r\n");
        assert_eq!(encode(AxisId::new(2), &Command::new(OpCode::Home)), b"2OR\r\n");
    }

    #[test]
    fn test_decode_strips_prefix() {
        let axis = AxisId::default();
        assert_eq!(decode(axis, OpCode::TellPosition, "1TP10.005\r\n"), "10.005");
        assert_eq!(decode(axis, OpCode::TellStatus, " 1TS000033 "), "000033");
    }

    #[test]
    fn test_decode_tolerates_missing_prefix() {
        let axis = AxisId::default();
        assert_eq!(decode(axis, OpCode::TellPosition, "10.005\r\n"), "10.005");
        assert_eq!(decode(axis, OpCode::TellError, "@"), "@");
        assert_eq!(decode(axis, OpCode::TellStatus, ""), "");
    }

    #[test]
    fn test_decode_only_strips_matching_axis() {
        assert_eq!(decode(AxisId::new(2), OpCode::TellPosition, "1TP4.0"), "1TP4.0");
    }

    #[test]
    fn test_decode_drops_reply_to_other_opcode() {
        let axis = AxisId::default();
        assert_eq!(decode(axis, OpCode::TellError, "1TS000028\r\n"), "");
        assert_eq!(
            ErrorCode::parse(decode(axis, OpCode::TellError, "1TS000028")),
            ErrorCode::None
        );
        assert_eq!(decode(axis, OpCode::TellPosition, "1TE@"), "");
    }

    #[test]
    fn test_position_round_trip_through_echo() {
        let axis = AxisId::default();
        for value in [0.0, 10.005, -3.25] {
            let query = encode(axis, &Command::new(OpCode::TellPosition));
            assert_eq!(query, b"1TP\r\n");
            let echoed = format!("{}TP{}\r\n", axis, value);
            let payload = decode(axis, OpCode::TellPosition, &echoed);
            assert_eq!(parse_position(payload), Some(value));
        }
    }

    #[test]
    fn test_parse_position_garbage() {
        assert_eq!(parse_position(""), None);
        assert_eq!(parse_position("1T"), None);
        assert_eq!(parse_position("NaN"), None);
    }

    #[test]
    fn test_error_code_parse() {
        assert_eq!(ErrorCode::parse("@"), ErrorCode::None);
        assert_eq!(ErrorCode::parse(" C "), ErrorCode::Code("C".to_string()));
        assert_eq!(ErrorCode::parse("C").as_str(), "C");
        assert_eq!(ErrorCode::parse(""), ErrorCode::None);
        assert_eq!(ErrorCode::None.as_str(), "");
    }
}
