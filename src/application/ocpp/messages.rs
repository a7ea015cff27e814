//! Typed OCPP 1.6 messages
//!
//! Every supported action has exactly one entry in [`INBOUND`] or
//! [`OUTBOUND`]. An entry maps the action to a decoder that turns the raw
//! Call payload into a variant of the tagged unions below. Supporting a new
//! action means adding the variant, its table entry and its handler arm.

use rust_ocpp::v1_6::messages::authorize::{AuthorizeRequest, AuthorizeResponse};
use rust_ocpp::v1_6::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v1_6::messages::clear_charging_profile::ClearChargingProfileRequest;
use rust_ocpp::v1_6::messages::data_transfer::{DataTransferRequest, DataTransferResponse};
use rust_ocpp::v1_6::messages::diagnostics_status_notification::{
    DiagnosticsStatusNotificationRequest, DiagnosticsStatusNotificationResponse,
};
use rust_ocpp::v1_6::messages::firmware_status_notification::{
    FirmwareStatusNotificationRequest, FirmwareStatusNotificationResponse,
};
use rust_ocpp::v1_6::messages::heart_beat::{HeartbeatRequest, HeartbeatResponse};
use rust_ocpp::v1_6::messages::meter_values::{MeterValuesRequest, MeterValuesResponse};
use rust_ocpp::v1_6::messages::remote_start_transaction::RemoteStartTransactionRequest;
use rust_ocpp::v1_6::messages::remote_stop_transaction::RemoteStopTransactionRequest;
use rust_ocpp::v1_6::messages::set_charging_profile::SetChargingProfileRequest;
use rust_ocpp::v1_6::messages::start_transaction::{
    StartTransactionRequest, StartTransactionResponse,
};
use rust_ocpp::v1_6::messages::status_notification::{
    StatusNotificationRequest, StatusNotificationResponse,
};
use rust_ocpp::v1_6::messages::stop_transaction::{
    StopTransactionRequest, StopTransactionResponse,
};
use rust_ocpp::v1_6::messages::trigger_message::TriggerMessageRequest;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::constraints::Constrained;
use crate::domain::{OcppError, OcppResult};
use crate::support::ocpp_frame::OcppFrame;

// ── Actions ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    BootNotification,
    Authorize,
    Heartbeat,
    StartTransaction,
    StopTransaction,
    MeterValues,
    StatusNotification,
    DataTransfer,
    DiagnosticsStatusNotification,
    FirmwareStatusNotification,
    SetChargingProfile,
    ClearChargingProfile,
    TriggerMessage,
    RemoteStartTransaction,
    RemoteStopTransaction,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BootNotification => "BootNotification",
            Self::Authorize => "Authorize",
            Self::Heartbeat => "Heartbeat",
            Self::StartTransaction => "StartTransaction",
            Self::StopTransaction => "StopTransaction",
            Self::MeterValues => "MeterValues",
            Self::StatusNotification => "StatusNotification",
            Self::DataTransfer => "DataTransfer",
            Self::DiagnosticsStatusNotification => "DiagnosticsStatusNotification",
            Self::FirmwareStatusNotification => "FirmwareStatusNotification",
            Self::SetChargingProfile => "SetChargingProfile",
            Self::ClearChargingProfile => "ClearChargingProfile",
            Self::TriggerMessage => "TriggerMessage",
            Self::RemoteStartTransaction => "RemoteStartTransaction",
            Self::RemoteStopTransaction => "RemoteStopTransaction",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Charge point → central system ──────────────────────────────

/// Requests a charge point may send to the central system.
#[derive(Debug, Clone)]
pub enum Request {
    BootNotification(BootNotificationRequest),
    Authorize(AuthorizeRequest),
    Heartbeat(HeartbeatRequest),
    StartTransaction(StartTransactionRequest),
    StopTransaction(StopTransactionRequest),
    MeterValues(MeterValuesRequest),
    StatusNotification(StatusNotificationRequest),
    DataTransfer(DataTransferRequest),
    DiagnosticsStatusNotification(DiagnosticsStatusNotificationRequest),
    FirmwareStatusNotification(FirmwareStatusNotificationRequest),
}

/// Responses the central system returns for a [`Request`].
#[derive(Debug, Clone)]
pub enum Response {
    BootNotification(BootNotificationResponse),
    Authorize(AuthorizeResponse),
    Heartbeat(HeartbeatResponse),
    StartTransaction(StartTransactionResponse),
    StopTransaction(StopTransactionResponse),
    MeterValues(MeterValuesResponse),
    StatusNotification(StatusNotificationResponse),
    DataTransfer(DataTransferResponse),
    DiagnosticsStatusNotification(DiagnosticsStatusNotificationResponse),
    FirmwareStatusNotification(FirmwareStatusNotificationResponse),
}

type InboundDecoder = fn(Value) -> OcppResult<Request>;

/// Dispatch table for charge-point-initiated actions.
pub const INBOUND: &[(Action, InboundDecoder)] = &[
    (Action::BootNotification, |p| {
        decode_payload(p).map(Request::BootNotification)
    }),
    (Action::Authorize, |p| decode_payload(p).map(Request::Authorize)),
    (Action::Heartbeat, |p| decode_payload(p).map(Request::Heartbeat)),
    (Action::StartTransaction, |p| {
        decode_payload(p).map(Request::StartTransaction)
    }),
    (Action::StopTransaction, |p| {
        decode_payload(p).map(Request::StopTransaction)
    }),
    (Action::MeterValues, |p| decode_payload(p).map(Request::MeterValues)),
    (Action::StatusNotification, |p| {
        decode_payload(p).map(Request::StatusNotification)
    }),
    (Action::DataTransfer, |p| decode_payload(p).map(Request::DataTransfer)),
    (Action::DiagnosticsStatusNotification, |p| {
        decode_payload(p).map(Request::DiagnosticsStatusNotification)
    }),
    (Action::FirmwareStatusNotification, |p| {
        decode_payload(p).map(Request::FirmwareStatusNotification)
    }),
];

impl Request {
    /// Decode a Call payload for `action` into a typed, constraint-checked request.
    pub fn decode(action: &str, payload: Value) -> OcppResult<Self> {
        let decoder = INBOUND
            .iter()
            .find(|(a, _)| a.as_str() == action)
            .map(|(_, decoder)| decoder)
            .ok_or_else(|| OcppError::UnsupportedFeature {
                action: action.to_string(),
            })?;
        decoder(payload)
    }

    pub fn action(&self) -> Action {
        match self {
            Self::BootNotification(_) => Action::BootNotification,
            Self::Authorize(_) => Action::Authorize,
            Self::Heartbeat(_) => Action::Heartbeat,
            Self::StartTransaction(_) => Action::StartTransaction,
            Self::StopTransaction(_) => Action::StopTransaction,
            Self::MeterValues(_) => Action::MeterValues,
            Self::StatusNotification(_) => Action::StatusNotification,
            Self::DataTransfer(_) => Action::DataTransfer,
            Self::DiagnosticsStatusNotification(_) => Action::DiagnosticsStatusNotification,
            Self::FirmwareStatusNotification(_) => Action::FirmwareStatusNotification,
        }
    }

    pub fn to_payload(&self) -> OcppResult<Value> {
        match self {
            Self::BootNotification(r) => encode_payload(r),
            Self::Authorize(r) => encode_payload(r),
            Self::Heartbeat(r) => encode_payload(r),
            Self::StartTransaction(r) => encode_payload(r),
            Self::StopTransaction(r) => encode_payload(r),
            Self::MeterValues(r) => encode_payload(r),
            Self::StatusNotification(r) => encode_payload(r),
            Self::DataTransfer(r) => encode_payload(r),
            Self::DiagnosticsStatusNotification(r) => encode_payload(r),
            Self::FirmwareStatusNotification(r) => encode_payload(r),
        }
    }

    /// Encode as a `[2, uniqueId, action, payload]` frame.
    pub fn encode(&self, unique_id: &str) -> OcppResult<String> {
        Ok(OcppFrame::Call {
            unique_id: unique_id.to_string(),
            action: self.action().as_str().to_string(),
            payload: self.to_payload()?,
        }
        .serialize())
    }
}

impl Response {
    pub fn to_payload(&self) -> OcppResult<Value> {
        match self {
            Self::BootNotification(r) => encode_payload(r),
            Self::Authorize(r) => encode_payload(r),
            Self::Heartbeat(r) => encode_payload(r),
            Self::StartTransaction(r) => encode_payload(r),
            Self::StopTransaction(r) => encode_payload(r),
            Self::MeterValues(r) => encode_payload(r),
            Self::StatusNotification(r) => encode_payload(r),
            Self::DataTransfer(r) => encode_payload(r),
            Self::DiagnosticsStatusNotification(r) => encode_payload(r),
            Self::FirmwareStatusNotification(r) => encode_payload(r),
        }
    }

    /// Encode as a `[3, uniqueId, payload]` frame.
    pub fn encode(&self, unique_id: &str) -> OcppResult<String> {
        Ok(OcppFrame::CallResult {
            unique_id: unique_id.to_string(),
            payload: self.to_payload()?,
        }
        .serialize())
    }
}

// ── Central system → charge point ──────────────────────────────

/// Requests the central system originates.
#[derive(Debug, Clone)]
pub enum OutgoingRequest {
    SetChargingProfile(SetChargingProfileRequest),
    ClearChargingProfile(ClearChargingProfileRequest),
    TriggerMessage(TriggerMessageRequest),
    RemoteStartTransaction(RemoteStartTransactionRequest),
    RemoteStopTransaction(RemoteStopTransactionRequest),
}

type OutboundDecoder = fn(Value) -> OcppResult<OutgoingRequest>;

/// Table of central-system-initiated actions.
pub const OUTBOUND: &[(Action, OutboundDecoder)] = &[
    (Action::SetChargingProfile, |p| {
        decode_payload(p).map(OutgoingRequest::SetChargingProfile)
    }),
    (Action::ClearChargingProfile, |p| {
        decode_payload(p).map(OutgoingRequest::ClearChargingProfile)
    }),
    (Action::TriggerMessage, |p| {
        decode_payload(p).map(OutgoingRequest::TriggerMessage)
    }),
    (Action::RemoteStartTransaction, |p| {
        decode_payload(p).map(OutgoingRequest::RemoteStartTransaction)
    }),
    (Action::RemoteStopTransaction, |p| {
        decode_payload(p).map(OutgoingRequest::RemoteStopTransaction)
    }),
];

impl OutgoingRequest {
    pub fn decode(action: &str, payload: Value) -> OcppResult<Self> {
        let decoder = OUTBOUND
            .iter()
            .find(|(a, _)| a.as_str() == action)
            .map(|(_, decoder)| decoder)
            .ok_or_else(|| OcppError::UnsupportedFeature {
                action: action.to_string(),
            })?;
        decoder(payload)
    }

    pub fn action(&self) -> Action {
        match self {
            Self::SetChargingProfile(_) => Action::SetChargingProfile,
            Self::ClearChargingProfile(_) => Action::ClearChargingProfile,
            Self::TriggerMessage(_) => Action::TriggerMessage,
            Self::RemoteStartTransaction(_) => Action::RemoteStartTransaction,
            Self::RemoteStopTransaction(_) => Action::RemoteStopTransaction,
        }
    }

    pub fn to_payload(&self) -> OcppResult<Value> {
        match self {
            Self::SetChargingProfile(r) => encode_payload(r),
            Self::ClearChargingProfile(r) => encode_payload(r),
            Self::TriggerMessage(r) => encode_payload(r),
            Self::RemoteStartTransaction(r) => encode_payload(r),
            Self::RemoteStopTransaction(r) => encode_payload(r),
        }
    }

    /// Encode as a `[2, uniqueId, action, payload]` frame.
    pub fn encode(&self, unique_id: &str) -> OcppResult<String> {
        Ok(OcppFrame::Call {
            unique_id: unique_id.to_string(),
            action: self.action().as_str().to_string(),
            payload: self.to_payload()?,
        }
        .serialize())
    }
}

// ── Helpers ────────────────────────────────────────────────────

fn decode_payload<T>(payload: Value) -> OcppResult<T>
where
    T: DeserializeOwned + Constrained,
{
    let message: T = serde_json::from_value(payload).map_err(|e| {
        let reason = e.to_string();
        OcppError::Validation {
            field: offending_field(&reason).unwrap_or("payload").to_string(),
            reason,
        }
    })?;
    message.check()?;
    Ok(message)
}

fn encode_payload<T: Serialize>(message: &T) -> OcppResult<Value> {
    serde_json::to_value(message).map_err(|e| OcppError::Format(e.to_string()))
}

/// Field name from a serde error such as "missing field `idTag`".
fn offending_field(reason: &str) -> Option<&str> {
    let start = reason.find('`')? + 1;
    let len = reason[start..].find('`')?;
    Some(&reason[start..start + len])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_action_has_one_table_entry() {
        let actions: Vec<Action> = INBOUND
            .iter()
            .map(|(a, _)| *a)
            .chain(OUTBOUND.iter().map(|(a, _)| *a))
            .collect();
        for action in &actions {
            let count = actions.iter().filter(|a| *a == action).count();
            assert_eq!(count, 1, "{} registered more than once", action);
        }
        assert_eq!(INBOUND.len() + OUTBOUND.len(), 15);
    }

    #[test]
    fn decode_boot_notification() {
        let payload = json!({
            "chargePointVendor": "Vendor",
            "chargePointModel": "Model",
            "chargePointSerialNumber": "SN-1"
        });
        match Request::decode("BootNotification", payload).unwrap() {
            Request::BootNotification(req) => {
                assert_eq!(req.charge_point_vendor, "Vendor");
                assert_eq!(req.charge_point_serial_number.as_deref(), Some("SN-1"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_action_is_unsupported() {
        let err = Request::decode("SignCertificate", json!({})).unwrap_err();
        assert!(matches!(err, OcppError::UnsupportedFeature { action } if action == "SignCertificate"));
        // Outbound-only actions are not accepted from charge points
        assert!(matches!(
            Request::decode("SetChargingProfile", json!({})),
            Err(OcppError::UnsupportedFeature { .. })
        ));
    }

    #[test]
    fn missing_field_is_named() {
        let err = Request::decode("Authorize", json!({})).unwrap_err();
        match err {
            OcppError::Validation { field, .. } => assert_eq!(field, "idTag"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn call_round_trips_through_encode_and_decode() {
        let frames = [
            ("Heartbeat", json!({})),
            ("Authorize", json!({"idTag": "TAG-1"})),
            (
                "StartTransaction",
                json!({
                    "connectorId": 2,
                    "idTag": "TAG-1",
                    "meterStart": 1200,
                    "timestamp": "2024-05-01T10:00:00Z"
                }),
            ),
            (
                "StatusNotification",
                json!({"connectorId": 1, "errorCode": "NoError", "status": "Charging"}),
            ),
        ];

        for (action, payload) in frames {
            let request = Request::decode(action, payload).unwrap();
            let text = request.encode("uid-1").unwrap();
            match OcppFrame::parse(&text).unwrap() {
                OcppFrame::Call {
                    unique_id,
                    action: decoded_action,
                    payload,
                } => {
                    assert_eq!(unique_id, "uid-1");
                    assert_eq!(decoded_action, action);
                    let again = Request::decode(&decoded_action, payload).unwrap();
                    assert_eq!(again.to_payload().unwrap(), request.to_payload().unwrap());
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn outgoing_round_trip() {
        let request = OutgoingRequest::decode(
            "TriggerMessage",
            json!({"requestedMessage": "MeterValues", "connectorId": 1}),
        )
        .unwrap();
        assert_eq!(request.action(), Action::TriggerMessage);

        let text = request.encode("cs-1").unwrap();
        let frame = OcppFrame::parse(&text).unwrap();
        let OcppFrame::Call { action, payload, .. } = frame else {
            panic!("expected Call");
        };
        let again = OutgoingRequest::decode(&action, payload).unwrap();
        assert_eq!(again.to_payload().unwrap(), request.to_payload().unwrap());
    }

    #[test]
    fn offending_field_extraction() {
        assert_eq!(offending_field("missing field `meterStart`"), Some("meterStart"));
        assert_eq!(offending_field("invalid type"), None);
    }
}
