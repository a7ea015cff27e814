//! Per-frame dispatch for one charge point connection
//!
//! `parse frame -> decode payload -> SystemHandler -> CallResult -> follow-up`.
//! The connection's read loop calls [`Dispatcher::dispatch`] once per text
//! frame and awaits it, so frames from one charge point are handled strictly
//! in order.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::application::handlers::SystemHandler;
use crate::application::ocpp::Request;
use crate::domain::{LogHandler, OcppError};
use crate::session::{Connection, ConnectionManager};
use crate::support::ocpp_frame::OcppFrame;

const INTERNAL_ERROR: &str = "InternalError";

pub struct Dispatcher {
    handler: Arc<SystemHandler>,
    connections: Arc<ConnectionManager>,
    log: Arc<dyn LogHandler>,
}

impl Dispatcher {
    pub fn new(handler: Arc<SystemHandler>, connections: Arc<ConnectionManager>) -> Self {
        let log = handler.log().clone();
        Self {
            handler,
            connections,
            log,
        }
    }

    pub fn handler(&self) -> &Arc<SystemHandler> {
        &self.handler
    }

    /// Process one text frame received on `connection`.
    pub async fn dispatch(&self, connection: &Connection, text: &str) {
        let charge_point_id = connection.charge_point_id.as_str();

        let frame = match OcppFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                // No response: the unique id cannot be trusted.
                self.log.warn(&format!(
                    "Dropping malformed frame from {} (uniqueId {:?}): {}",
                    charge_point_id,
                    OcppFrame::salvage_unique_id(text),
                    e
                ));
                return;
            }
        };

        match frame {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => {
                connection.set_last_call_id(&unique_id);
                self.dispatch_call(connection, &action, payload).await;
            }
            OcppFrame::CallResult { unique_id, .. } => {
                match self.connections.take_pending(charge_point_id, &unique_id) {
                    Some(action) => info!(
                        charge_point_id,
                        unique_id = unique_id.as_str(),
                        action = %action,
                        "Request confirmed"
                    ),
                    None => debug!(
                        charge_point_id,
                        unique_id = unique_id.as_str(),
                        "CallResult for unknown request"
                    ),
                }
            }
            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                ..
            } => {
                let action = self.connections.take_pending(charge_point_id, &unique_id);
                warn!(
                    charge_point_id,
                    unique_id = unique_id.as_str(),
                    action = ?action,
                    error_code = error_code.as_str(),
                    error_description = error_description.as_str(),
                    "Request rejected by charge point"
                );
            }
        }
    }

    async fn dispatch_call(&self, connection: &Connection, action: &str, payload: serde_json::Value) {
        let charge_point_id = connection.charge_point_id.as_str();

        let request = match Request::decode(action, payload) {
            Ok(request) => request,
            Err(e) => {
                if let OcppError::UnsupportedFeature { action } = &e {
                    self.log.feature_event(
                        action,
                        charge_point_id,
                        "Unsupported action received",
                    );
                } else {
                    self.log
                        .warn(&format!("Invalid {} from {}: {}", action, charge_point_id, e));
                }
                self.reply_error(connection, e.call_error_code(), &e.to_string());
                return;
            }
        };

        match self.handler.handle(charge_point_id, request.clone()).await {
            Ok(response) => {
                if let Err(e) = connection.send_response(&response) {
                    warn!(charge_point_id, action, error = %e, "Response not sent");
                    return;
                }
                self.handler.follow_up(charge_point_id, &request).await;
            }
            Err(e) => {
                self.log.error(&format!(
                    "{} from {} failed: {}",
                    action, charge_point_id, e
                ));
                self.reply_error(connection, INTERNAL_ERROR, &e.to_string());
            }
        }
    }

    fn reply_error(&self, connection: &Connection, error_code: &str, description: &str) {
        if let Err(e) = connection.send_error(error_code, description) {
            warn!(
                charge_point_id = connection.charge_point_id.as_str(),
                error = %e,
                "CallError not sent"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_ocpp::v1_6::messages::remote_stop_transaction::RemoteStopTransactionRequest;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    use super::*;
    use crate::application::handlers::test_support::harness;
    use crate::application::handlers::HandlerSettings;
    use crate::application::load_balancer::{LoadBalancer, PowerTiers};
    use crate::application::logging::RecordingLogHandler;
    use crate::application::ocpp::{Action, OutgoingRequest};
    use crate::application::ports::PowerHandler;
    use crate::domain::Location;

    struct Wire {
        dispatcher: Dispatcher,
        connection: Arc<Connection>,
        frames: mpsc::UnboundedReceiver<String>,
        log: Arc<RecordingLogHandler>,
        connections: Arc<ConnectionManager>,
    }

    async fn wire() -> Wire {
        let h = harness(HandlerSettings::default()).await;
        let connections = Arc::new(ConnectionManager::new());
        let (tx, frames) = mpsc::unbounded_channel();
        let connection = connections.register("CP1", None, tx);
        Wire {
            dispatcher: Dispatcher::new(Arc::new(h.handler), connections.clone()),
            connection,
            frames,
            log: h.log,
            connections,
        }
    }

    fn next_frame(frames: &mut mpsc::UnboundedReceiver<String>) -> Value {
        serde_json::from_str(&frames.try_recv().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn call_is_answered_with_its_unique_id() {
        let mut w = wire().await;
        w.dispatcher
            .dispatch(&w.connection, r#"[2,"hb-1","Heartbeat",{}]"#)
            .await;

        let frame = next_frame(&mut w.frames);
        assert_eq!(frame[0], 3);
        assert_eq!(frame[1], "hb-1");
        assert!(frame[2]["currentTime"].is_string());
    }

    #[tokio::test]
    async fn malformed_frame_gets_no_answer() {
        let mut w = wire().await;
        w.dispatcher.dispatch(&w.connection, "not json").await;
        w.dispatcher
            .dispatch(&w.connection, r#"[9,"x","Heartbeat",{}]"#)
            .await;

        assert!(w.frames.try_recv().is_err());
        assert_eq!(w.log.warnings().len(), 2);
    }

    #[tokio::test]
    async fn unknown_action_is_not_implemented() {
        let mut w = wire().await;
        w.dispatcher
            .dispatch(&w.connection, r#"[2,"u-1","SignCertificate",{}]"#)
            .await;

        let frame = next_frame(&mut w.frames);
        assert_eq!(frame[0], 4);
        assert_eq!(frame[1], "u-1");
        assert_eq!(frame[2], "NotImplemented");

        let features = w.log.features();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].0, "SignCertificate");
        assert_eq!(features[0].1, "CP1");
    }

    #[tokio::test]
    async fn constraint_violation_names_the_field() {
        let mut w = wire().await;
        let frame = json!([
            2,
            "b-1",
            "BootNotification",
            {"chargePointVendor": "V".repeat(21), "chargePointModel": "M"}
        ]);
        w.dispatcher
            .dispatch(&w.connection, &frame.to_string())
            .await;

        let reply = next_frame(&mut w.frames);
        assert_eq!(reply[2], "PropertyConstraintViolation");
        assert!(reply[3].as_str().unwrap().contains("chargePointVendor"));
    }

    #[tokio::test]
    async fn confirmations_clear_pending_requests() {
        let mut w = wire().await;
        let request =
            OutgoingRequest::RemoteStopTransaction(RemoteStopTransactionRequest { transaction_id: 1 });
        let unique_id = w.connections.send_request("CP1", request).await.unwrap();
        let _ = w.frames.try_recv();
        assert_eq!(w.connections.pending_count(), 1);

        let answer = json!([3, unique_id, {"status": "Accepted"}]);
        w.dispatcher
            .dispatch(&w.connection, &answer.to_string())
            .await;
        assert_eq!(w.connections.pending_count(), 0);
        assert!(w.frames.try_recv().is_err());
    }

    #[tokio::test]
    async fn profile_follows_the_start_response() {
        let h = harness(HandlerSettings::default()).await;
        let mut cp = h.db.charge_point("CP1").unwrap();
        cp.smart_charging = true;
        cp.location_id = Some("SITE".into());
        h.db.insert_charge_point(cp);
        h.db.insert_location(Location {
            id: "SITE".into(),
            name: "Depot".into(),
            default_power_limit: 0,
            power_limit: 300,
            charge_point_ids: vec!["CP1".into()],
        });

        let connections = Arc::new(ConnectionManager::new());
        let balancer = Arc::new(LoadBalancer::new(
            h.handler.store().clone(),
            h.db.clone(),
            connections.clone(),
            PowerTiers::default(),
        ));
        let handler = Arc::new(h.handler.with_load_balancer(balancer));
        let dispatcher = Dispatcher::new(handler, connections.clone());

        let (tx, mut frames) = mpsc::unbounded_channel();
        let connection = connections.register("CP1", None, tx);
        let start = json!([
            2,
            "s-1",
            "StartTransaction",
            {"connectorId": 1, "idTag": "TAG-1", "meterStart": 0, "timestamp": "2024-05-01T10:00:00Z"}
        ]);
        dispatcher.dispatch(&connection, &start.to_string()).await;

        let response = next_frame(&mut frames);
        assert_eq!(response[0], 3);
        assert_eq!(response[1], "s-1");

        let profile = next_frame(&mut frames);
        assert_eq!(profile[0], 2);
        assert_eq!(profile[2], Action::SetChargingProfile.as_str());
    }
}
