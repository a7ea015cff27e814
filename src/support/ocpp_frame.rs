//! OCPP-J message framing
//!
//! - **Call**       `[2, "<uniqueId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<uniqueId>", {<payload>}]`
//! - **CallError**  `[4, "<uniqueId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`
//!
//! This layer only checks the envelope. Payloads are mapped to typed
//! messages by [`crate::application::ocpp`].

use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::OcppError;

const MSG_TYPE_CALL: u64 = 2;
const MSG_TYPE_CALL_RESULT: u64 = 3;
const MSG_TYPE_CALL_ERROR: u64 = 4;

/// A parsed OCPP-J frame
#[derive(Debug, Clone, PartialEq)]
pub enum OcppFrame {
    Call {
        unique_id: String,
        action: String,
        payload: Value,
    },
    CallResult {
        unique_id: String,
        payload: Value,
    },
    CallError {
        unique_id: String,
        error_code: String,
        error_description: String,
        error_details: Value,
    },
}

/// Envelope-level decoding failure
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("frame is not a JSON array")]
    NotAnArray,
    #[error("message type is missing or not a number")]
    InvalidMessageType,
    #[error("unknown message type {0}")]
    UnknownMessageType(u64),
    #[error("message type {msg_type} expects {expected} elements, got {got}")]
    Arity {
        msg_type: u64,
        expected: &'static str,
        got: usize,
    },
    #[error("{0}")]
    FieldType(&'static str),
}

impl From<FrameError> for OcppError {
    fn from(e: FrameError) -> Self {
        OcppError::Format(e.to_string())
    }
}

impl OcppFrame {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
        let arr = value.as_array().ok_or(FrameError::NotAnArray)?;

        let msg_type = arr
            .first()
            .and_then(Value::as_u64)
            .ok_or(FrameError::InvalidMessageType)?;

        match msg_type {
            MSG_TYPE_CALL => {
                expect_len(msg_type, arr, 4, 4, "4")?;
                Ok(Self::Call {
                    unique_id: string_at(arr, 1, "uniqueId must be a string")?,
                    action: string_at(arr, 2, "action must be a string")?,
                    payload: object_at(arr, 3, "payload must be an object")?,
                })
            }
            MSG_TYPE_CALL_RESULT => {
                expect_len(msg_type, arr, 3, 3, "3")?;
                Ok(Self::CallResult {
                    unique_id: string_at(arr, 1, "uniqueId must be a string")?,
                    payload: object_at(arr, 2, "payload must be an object")?,
                })
            }
            MSG_TYPE_CALL_ERROR => {
                // errorDetails is frequently omitted by stations in the field
                expect_len(msg_type, arr, 4, 5, "4 or 5")?;
                Ok(Self::CallError {
                    unique_id: string_at(arr, 1, "uniqueId must be a string")?,
                    error_code: string_at(arr, 2, "errorCode must be a string")?,
                    error_description: string_at(arr, 3, "errorDescription must be a string")?,
                    error_details: arr
                        .get(4)
                        .cloned()
                        .unwrap_or_else(|| Value::Object(Map::new())),
                })
            }
            other => Err(FrameError::UnknownMessageType(other)),
        }
    }

    /// Best-effort unique id of a frame that failed [`OcppFrame::parse`].
    pub fn salvage_unique_id(text: &str) -> Option<String> {
        let value: Value = serde_json::from_str(text).ok()?;
        value.get(1)?.as_str().map(String::from)
    }

    pub fn serialize(&self) -> String {
        let arr = match self {
            Self::Call {
                unique_id,
                action,
                payload,
            } => Value::Array(vec![
                MSG_TYPE_CALL.into(),
                unique_id.as_str().into(),
                action.as_str().into(),
                payload.clone(),
            ]),
            Self::CallResult { unique_id, payload } => Value::Array(vec![
                MSG_TYPE_CALL_RESULT.into(),
                unique_id.as_str().into(),
                payload.clone(),
            ]),
            Self::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => Value::Array(vec![
                MSG_TYPE_CALL_ERROR.into(),
                unique_id.as_str().into(),
                error_code.as_str().into(),
                error_description.as_str().into(),
                error_details.clone(),
            ]),
        };
        arr.to_string()
    }

    pub fn unique_id(&self) -> &str {
        match self {
            Self::Call { unique_id, .. }
            | Self::CallResult { unique_id, .. }
            | Self::CallError { unique_id, .. } => unique_id,
        }
    }

    pub fn error_response(
        unique_id: impl Into<String>,
        error_code: impl Into<String>,
        error_description: impl Into<String>,
    ) -> Self {
        Self::CallError {
            unique_id: unique_id.into(),
            error_code: error_code.into(),
            error_description: error_description.into(),
            error_details: Value::Object(Map::new()),
        }
    }
}

fn expect_len(
    msg_type: u64,
    arr: &[Value],
    min: usize,
    max: usize,
    expected: &'static str,
) -> Result<(), FrameError> {
    if arr.len() < min || arr.len() > max {
        return Err(FrameError::Arity {
            msg_type,
            expected,
            got: arr.len(),
        });
    }
    Ok(())
}

fn string_at(arr: &[Value], idx: usize, msg: &'static str) -> Result<String, FrameError> {
    arr[idx]
        .as_str()
        .map(String::from)
        .ok_or(FrameError::FieldType(msg))
}

fn object_at(arr: &[Value], idx: usize, msg: &'static str) -> Result<Value, FrameError> {
    match &arr[idx] {
        v @ Value::Object(_) => Ok(v.clone()),
        _ => Err(FrameError::FieldType(msg)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_call() {
        let text = r#"[2,"abc123","BootNotification",{"chargePointVendor":"Vendor","chargePointModel":"Model"}]"#;
        match OcppFrame::parse(text).unwrap() {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => {
                assert_eq!(unique_id, "abc123");
                assert_eq!(action, "BootNotification");
                assert_eq!(payload["chargePointVendor"], "Vendor");
            }
            other => panic!("Expected Call frame, got {:?}", other),
        }
    }

    #[test]
    fn parse_call_error_without_details() {
        let frame = OcppFrame::parse(r#"[4,"x","NotImplemented","nope"]"#).unwrap();
        assert_eq!(
            frame,
            OcppFrame::error_response("x", "NotImplemented", "nope")
        );
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!(matches!(
            OcppFrame::parse(r#"[2,"id","Heartbeat"]"#),
            Err(FrameError::Arity { got: 3, .. })
        ));
        assert!(matches!(
            OcppFrame::parse(r#"[3,"id",{},{}]"#),
            Err(FrameError::Arity { got: 4, .. })
        ));
    }

    #[test]
    fn rejects_unknown_type_and_non_arrays() {
        assert_eq!(
            OcppFrame::parse(r#"[7,"id",{}]"#),
            Err(FrameError::UnknownMessageType(7))
        );
        assert_eq!(
            OcppFrame::parse(r#"{"a":1}"#),
            Err(FrameError::NotAnArray)
        );
        assert!(matches!(
            OcppFrame::parse("not json"),
            Err(FrameError::InvalidJson(_))
        ));
        assert_eq!(
            OcppFrame::parse(r#"[2,5,"Heartbeat",{}]"#),
            Err(FrameError::FieldType("uniqueId must be a string"))
        );
    }

    #[test]
    fn serialize_is_canonical() {
        let call = OcppFrame::Call {
            unique_id: "id1".into(),
            action: "Heartbeat".into(),
            payload: json!({}),
        };
        assert_eq!(call.serialize(), r#"[2,"id1","Heartbeat",{}]"#);

        let result = OcppFrame::CallResult {
            unique_id: "id2".into(),
            payload: json!({"status":"Accepted"}),
        };
        assert_eq!(result.serialize(), r#"[3,"id2",{"status":"Accepted"}]"#);
        assert_eq!(OcppFrame::parse(&result.serialize()).unwrap(), result);
    }

    #[test]
    fn salvage_unique_id_from_bad_frame() {
        assert_eq!(
            OcppFrame::salvage_unique_id(r#"[2,"keep-me","Heartbeat"]"#).as_deref(),
            Some("keep-me")
        );
        assert_eq!(OcppFrame::salvage_unique_id("garbage"), None);
    }
}
