//! VSS (Vehicle Signal Specification) wire messages.
//!
//! The signal bus speaks JSON text frames. Outbound we only ever send a
//! subscription request:
//!
//! ```json
//! {"api":"vss","verb":"subscribe","args":{"path":"Vehicle.Speed"}}
//! ```
//!
//! Inbound, signal updates arrive as
//! `{"event":"vss/<path>","data":{"value":<number>,"unit":"km/h"}}`.
//! Replies and events for other signals share the socket and must be
//! told apart from the one we care about.

use serde::{Deserialize, Serialize};

pub const VSS_API: &str = "vss";
pub const SUBSCRIBE_VERB: &str = "subscribe";
pub const DEFAULT_SIGNAL_PATH: &str = "Vehicle.Speed";

/// The only unit accepted for speed values.
pub const SPEED_UNIT: &str = "km/h";

/// Outbound subscription request.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest<'a> {
    pub api: &'static str,
    pub verb: &'static str,
    pub args: SubscribeArgs<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscribeArgs<'a> {
    pub path: &'a str,
}

impl<'a> SubscribeRequest<'a> {
    pub fn new(path: &'a str) -> Self {
        Self {
            api: VSS_API,
            verb: SUBSCRIBE_VERB,
            args: SubscribeArgs { path },
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Loosely-typed inbound frame. `event` is absent on verb replies.
#[derive(Debug, Clone, Deserialize)]
struct InboundFrame {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
}

/// Why an inbound frame did not yield a value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameRejection {
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// A reply or other non-event frame.
    #[error("not an event frame")]
    NotAnEvent,

    #[error("event for another signal: {0}")]
    OtherSignal(String),

    #[error("signal event without a numeric value")]
    MissingValue,

    #[error("unexpected unit: {0}")]
    UnexpectedUnit(String),
}

/// Name of the event carrying updates for `signal_path`.
pub fn event_name(signal_path: &str) -> String {
    format!("{VSS_API}/{signal_path}")
}

/// Extract the speed value from a text frame for `signal_path`.
///
/// Only shape and unit are checked here. A missing unit is taken to be
/// [`SPEED_UNIT`]. Range checks belong to the smoother.
pub fn parse_signal_value(text: &str, signal_path: &str) -> Result<f64, FrameRejection> {
    let frame: InboundFrame =
        serde_json::from_str(text).map_err(|e| FrameRejection::Malformed(e.to_string()))?;

    let event = frame.event.ok_or(FrameRejection::NotAnEvent)?;
    if event != event_name(signal_path) {
        return Err(FrameRejection::OtherSignal(event));
    }

    let value = frame
        .data
        .get("value")
        .and_then(serde_json::Value::as_f64)
        .ok_or(FrameRejection::MissingValue)?;

    match frame.data.get("unit") {
        None => {}
        Some(serde_json::Value::String(unit)) if unit == SPEED_UNIT => {}
        Some(other) => {
            let unit = other.as_str().map_or_else(|| other.to_string(), str::to_string);
            return Err(FrameRejection::UnexpectedUnit(unit));
        }
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speed_frame(value: &str, unit: &str) -> String {
        format!(r#"{{"event":"vss/Vehicle.Speed","data":{{"value":{value},"unit":"{unit}"}}}}"#)
    }

    #[test]
    fn subscribe_request_shape() {
        let json = SubscribeRequest::new(DEFAULT_SIGNAL_PATH).to_json().unwrap();
        assert_eq!(
            json,
            r#"{"api":"vss","verb":"subscribe","args":{"path":"Vehicle.Speed"}}"#
        );
    }

    #[test]
    fn parse_speed_event() {
        let value = parse_signal_value(&speed_frame("87.5", "km/h"), DEFAULT_SIGNAL_PATH);
        assert_eq!(value, Ok(87.5));
    }

    #[test]
    fn parse_integer_value() {
        let value = parse_signal_value(&speed_frame("42", "km/h"), DEFAULT_SIGNAL_PATH);
        assert_eq!(value, Ok(42.0));
    }

    #[test]
    fn missing_unit_defaults_to_kmh() {
        let json = r#"{"event":"vss/Vehicle.Speed","data":{"value":12.0}}"#;
        assert_eq!(parse_signal_value(json, DEFAULT_SIGNAL_PATH), Ok(12.0));
    }

    #[test]
    fn out_of_range_values_pass_shape_validation() {
        let value = parse_signal_value(&speed_frame("-5", "km/h"), DEFAULT_SIGNAL_PATH);
        assert_eq!(value, Ok(-5.0));
    }

    #[test]
    fn wrong_unit_is_rejected() {
        let result = parse_signal_value(&speed_frame("55", "mph"), DEFAULT_SIGNAL_PATH);
        assert_eq!(result, Err(FrameRejection::UnexpectedUnit("mph".into())));
    }

    #[test]
    fn non_string_unit_is_rejected() {
        let json = r#"{"event":"vss/Vehicle.Speed","data":{"value":55,"unit":3}}"#;
        assert_eq!(
            parse_signal_value(json, DEFAULT_SIGNAL_PATH),
            Err(FrameRejection::UnexpectedUnit("3".into()))
        );
    }

    #[test]
    fn non_numeric_value_is_rejected() {
        let json = r#"{"event":"vss/Vehicle.Speed","data":{"value":"fast","unit":"km/h"}}"#;
        assert_eq!(
            parse_signal_value(json, DEFAULT_SIGNAL_PATH),
            Err(FrameRejection::MissingValue)
        );

        let json = r#"{"event":"vss/Vehicle.Speed","data":{}}"#;
        assert_eq!(
            parse_signal_value(json, DEFAULT_SIGNAL_PATH),
            Err(FrameRejection::MissingValue)
        );
    }

    #[test]
    fn other_signal_is_rejected() {
        let json = r#"{"event":"vss/Vehicle.Cabin.Temperature","data":{"value":21}}"#;
        assert_eq!(
            parse_signal_value(json, DEFAULT_SIGNAL_PATH),
            Err(FrameRejection::OtherSignal(
                "vss/Vehicle.Cabin.Temperature".into()
            ))
        );
    }

    #[test]
    fn reply_frame_is_not_an_event() {
        let json = r#"{"jtype":"afb-reply","request":{"status":"success"}}"#;
        assert_eq!(
            parse_signal_value(json, DEFAULT_SIGNAL_PATH),
            Err(FrameRejection::NotAnEvent)
        );
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(matches!(
            parse_signal_value("not json at all", DEFAULT_SIGNAL_PATH),
            Err(FrameRejection::Malformed(_))
        ));
        assert!(matches!(
            parse_signal_value("[1,2,3]", DEFAULT_SIGNAL_PATH),
            Err(FrameRejection::Malformed(_))
        ));
    }
}
