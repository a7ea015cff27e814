//! Field constraints checked after a payload has been deserialized
//!
//! serde covers presence and type. What it cannot express (CiString length
//! bounds, non-zero connector ids, non-empty lists) is checked here and
//! reported with the wire name of the offending field.

use rust_ocpp::v1_6::messages::authorize::AuthorizeRequest;
use rust_ocpp::v1_6::messages::boot_notification::BootNotificationRequest;
use rust_ocpp::v1_6::messages::clear_charging_profile::ClearChargingProfileRequest;
use rust_ocpp::v1_6::messages::data_transfer::DataTransferRequest;
use rust_ocpp::v1_6::messages::diagnostics_status_notification::DiagnosticsStatusNotificationRequest;
use rust_ocpp::v1_6::messages::firmware_status_notification::FirmwareStatusNotificationRequest;
use rust_ocpp::v1_6::messages::heart_beat::HeartbeatRequest;
use rust_ocpp::v1_6::messages::meter_values::MeterValuesRequest;
use rust_ocpp::v1_6::messages::remote_start_transaction::RemoteStartTransactionRequest;
use rust_ocpp::v1_6::messages::remote_stop_transaction::RemoteStopTransactionRequest;
use rust_ocpp::v1_6::messages::set_charging_profile::SetChargingProfileRequest;
use rust_ocpp::v1_6::messages::start_transaction::StartTransactionRequest;
use rust_ocpp::v1_6::messages::status_notification::StatusNotificationRequest;
use rust_ocpp::v1_6::messages::stop_transaction::StopTransactionRequest;
use rust_ocpp::v1_6::messages::trigger_message::TriggerMessageRequest;

use crate::domain::{OcppError, OcppResult};

pub trait Constrained {
    fn check(&self) -> OcppResult<()> {
        Ok(())
    }
}

fn ci_string(field: &str, value: &str, max: usize) -> OcppResult<()> {
    if value.chars().count() > max {
        return Err(OcppError::validation(
            field,
            format!("exceeds {} characters", max),
        ));
    }
    Ok(())
}

fn ci_string_opt(field: &str, value: Option<&str>, max: usize) -> OcppResult<()> {
    value.map_or(Ok(()), |v| ci_string(field, v, max))
}

impl Constrained for BootNotificationRequest {
    fn check(&self) -> OcppResult<()> {
        ci_string("chargePointVendor", &self.charge_point_vendor, 20)?;
        ci_string("chargePointModel", &self.charge_point_model, 20)?;
        ci_string_opt(
            "chargePointSerialNumber",
            self.charge_point_serial_number.as_deref(),
            25,
        )?;
        ci_string_opt(
            "chargeBoxSerialNumber",
            self.charge_box_serial_number.as_deref(),
            25,
        )?;
        ci_string_opt("firmwareVersion", self.firmware_version.as_deref(), 50)?;
        ci_string_opt("iccid", self.iccid.as_deref(), 20)?;
        ci_string_opt("imsi", self.imsi.as_deref(), 20)?;
        ci_string_opt("meterType", self.meter_type.as_deref(), 25)?;
        ci_string_opt("meterSerialNumber", self.meter_serial_number.as_deref(), 25)
    }
}

impl Constrained for AuthorizeRequest {
    fn check(&self) -> OcppResult<()> {
        ci_string("idTag", &self.id_tag, 20)
    }
}

impl Constrained for HeartbeatRequest {}

impl Constrained for StartTransactionRequest {
    fn check(&self) -> OcppResult<()> {
        if self.connector_id == 0 {
            return Err(OcppError::validation("connectorId", "must be greater than 0"));
        }
        ci_string("idTag", &self.id_tag, 20)
    }
}

impl Constrained for StopTransactionRequest {
    fn check(&self) -> OcppResult<()> {
        ci_string_opt("idTag", self.id_tag.as_deref(), 20)
    }
}

impl Constrained for MeterValuesRequest {
    fn check(&self) -> OcppResult<()> {
        if self.meter_value.is_empty() {
            return Err(OcppError::validation("meterValue", "must not be empty"));
        }
        Ok(())
    }
}

impl Constrained for StatusNotificationRequest {
    fn check(&self) -> OcppResult<()> {
        ci_string_opt("info", self.info.as_deref(), 50)?;
        ci_string_opt("vendorId", self.vendor_id.as_deref(), 255)?;
        ci_string_opt("vendorErrorCode", self.vendor_error_code.as_deref(), 50)
    }
}

impl Constrained for DataTransferRequest {
    fn check(&self) -> OcppResult<()> {
        ci_string("vendorId", &self.vendor_string, 255)?;
        ci_string_opt("messageId", self.message_id.as_deref(), 50)
    }
}

impl Constrained for DiagnosticsStatusNotificationRequest {}
impl Constrained for FirmwareStatusNotificationRequest {}

impl Constrained for SetChargingProfileRequest {}
impl Constrained for ClearChargingProfileRequest {}
impl Constrained for TriggerMessageRequest {}

impl Constrained for RemoteStartTransactionRequest {
    fn check(&self) -> OcppResult<()> {
        if self.connector_id == Some(0) {
            return Err(OcppError::validation("connectorId", "must be greater than 0"));
        }
        ci_string("idTag", &self.id_tag, 20)
    }
}

impl Constrained for RemoteStopTransactionRequest {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field_of(err: OcppError) -> String {
        match err {
            OcppError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn vendor_too_long() {
        let req: BootNotificationRequest = serde_json::from_value(json!({
            "chargePointVendor": "V".repeat(21),
            "chargePointModel": "M"
        }))
        .unwrap();
        assert_eq!(field_of(req.check().unwrap_err()), "chargePointVendor");
    }

    #[test]
    fn connector_zero_rejected_for_start() {
        let req: StartTransactionRequest = serde_json::from_value(json!({
            "connectorId": 0,
            "idTag": "TAG",
            "meterStart": 0,
            "timestamp": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(field_of(req.check().unwrap_err()), "connectorId");
    }

    #[test]
    fn id_tag_bound_is_inclusive() {
        let ok = AuthorizeRequest {
            id_tag: "A".repeat(20),
        };
        assert!(ok.check().is_ok());
        let too_long = AuthorizeRequest {
            id_tag: "A".repeat(21),
        };
        assert_eq!(field_of(too_long.check().unwrap_err()), "idTag");
    }

    #[test]
    fn empty_meter_values_rejected() {
        let req: MeterValuesRequest = serde_json::from_value(json!({
            "connectorId": 1,
            "meterValue": []
        }))
        .unwrap();
        assert_eq!(field_of(req.check().unwrap_err()), "meterValue");
    }
}
