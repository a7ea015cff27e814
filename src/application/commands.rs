//! Central-system-initiated commands
//!
//! Thin wrappers that build the typed request and hand it to the
//! [`PowerHandler`](crate::application::ports::PowerHandler). Answers arrive
//! asynchronously on the connection and are only logged.
//!
//! These are library API for embedders; [`ServerHandle`](crate::server::ServerHandle)
//! exposes them against its live connections.

use rust_ocpp::v1_6::messages::remote_start_transaction::RemoteStartTransactionRequest;
use rust_ocpp::v1_6::messages::remote_stop_transaction::RemoteStopTransactionRequest;
use tracing::info;

use crate::application::ocpp::OutgoingRequest;
use crate::application::ports::SharedPowerHandler;
use crate::domain::{OcppError, OcppResult};

/// Ask a station to start charging for `id_tag`. Returns the Call's unique id.
pub async fn remote_start_transaction(
    power: &SharedPowerHandler,
    charge_point_id: &str,
    id_tag: &str,
    connector_id: Option<u32>,
) -> OcppResult<String> {
    if connector_id == Some(0) {
        return Err(OcppError::validation("connectorId", "must be greater than 0"));
    }
    info!(charge_point_id, id_tag, ?connector_id, "RemoteStartTransaction");

    let request = OutgoingRequest::RemoteStartTransaction(RemoteStartTransactionRequest {
        connector_id,
        id_tag: id_tag.to_string(),
        charging_profile: None,
    });
    power.send_request(charge_point_id, request).await
}

/// Ask a station to stop `transaction_id`. Returns the Call's unique id.
pub async fn remote_stop_transaction(
    power: &SharedPowerHandler,
    charge_point_id: &str,
    transaction_id: i32,
) -> OcppResult<String> {
    info!(charge_point_id, transaction_id, "RemoteStopTransaction");

    let request =
        OutgoingRequest::RemoteStopTransaction(RemoteStopTransactionRequest { transaction_id });
    power.send_request(charge_point_id, request).await
}
