//! Decoding of the JSON payloads the relay receives from the broker and the
//! secondary socket.
//!
//! Each decoder returns `Ok(None)` for a well-formed payload that carries no
//! actionable status, and `Err` when the payload is malformed or a field the
//! status requires is missing.

use serde_json::{Map, Value};

use crate::commands::{DirectionCommand, PeerCommand, VibrationCommand};
use crate::error::DecodeError;

/// Out-of-band control of the secondary socket transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketDirective {
    /// Open the socket, optionally to an explicit URL.
    Connect(Option<String>),
    Disconnect,
}

/// `{"status":"on"|"off","amplitude":int,"vibration_ratio":float}`
pub fn decode_vibration(payload: &[u8]) -> Result<Option<PeerCommand>, DecodeError> {
    let obj = parse_object(payload)?;
    match optional_str(&obj, "status") {
        Some("off") => Ok(Some(PeerCommand::Cancel)),
        Some("on") => {
            let amplitude = required_int(&obj, "amplitude")?;
            let ratio = required_float(&obj, "vibration_ratio")?;
            Ok(Some(PeerCommand::Vibrate(VibrationCommand { amplitude, ratio })))
        }
        _ => Ok(None),
    }
}

/// `{"status":"KNOWN"|"UNKNOWN","x":float,"y":float}`
pub fn decode_direction(payload: &[u8]) -> Result<Option<PeerCommand>, DecodeError> {
    let obj = parse_object(payload)?;
    match optional_str(&obj, "status") {
        Some("UNKNOWN") => Ok(Some(PeerCommand::Cancel)),
        Some("KNOWN") => {
            let x = required_float(&obj, "x")?;
            let y = required_float(&obj, "y")?;
            Ok(Some(PeerCommand::Direction(DirectionCommand { x, y })))
        }
        _ => Ok(None),
    }
}

/// `{"key":"websocket","action":"connect"|"disconnect","data"?:url}`
pub fn decode_socket_directive(payload: &[u8]) -> Result<Option<SocketDirective>, DecodeError> {
    let obj = parse_object(payload)?;
    if optional_str(&obj, "key") != Some("websocket") {
        return Ok(None);
    }
    let action = obj
        .get("action")
        .ok_or(DecodeError::MissingField("action"))?
        .as_str()
        .ok_or(DecodeError::InvalidField { field: "action", expected: "string" })?;
    match action {
        "connect" => {
            let url = match obj.get("data") {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(_) => {
                    return Err(DecodeError::InvalidField { field: "data", expected: "string" })
                }
            };
            Ok(Some(SocketDirective::Connect(url)))
        }
        "disconnect" => Ok(Some(SocketDirective::Disconnect)),
        other => Err(DecodeError::UnknownAction(other.to_string())),
    }
}

fn parse_object(payload: &[u8]) -> Result<Map<String, Value>, DecodeError> {
    match serde_json::from_slice::<Value>(payload)? {
        Value::Object(obj) => Ok(obj),
        _ => Err(DecodeError::NotAnObject),
    }
}

fn optional_str<'a>(obj: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    obj.get(field).and_then(Value::as_str)
}

// Integers accept whole numbers, fractional numbers (truncated) and numeric strings.
fn required_int(obj: &Map<String, Value>, field: &'static str) -> Result<i64, DecodeError> {
    let invalid = DecodeError::InvalidField { field, expected: "integer" };
    match obj.get(field) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(field)),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Ok(i),
            None => n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64).ok_or(invalid),
        },
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
                .ok_or(invalid)
        }
        Some(_) => Err(invalid),
    }
}

fn required_float(obj: &Map<String, Value>, field: &'static str) -> Result<f64, DecodeError> {
    let invalid = DecodeError::InvalidField { field, expected: "number" };
    match obj.get(field) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(field)),
        Some(Value::Number(n)) => n.as_f64().ok_or(invalid),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).ok_or(invalid),
        Some(_) => Err(invalid),
    }
}
