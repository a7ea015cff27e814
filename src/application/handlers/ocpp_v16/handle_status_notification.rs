//! StatusNotification handler

use rust_ocpp::v1_6::messages::status_notification::{
    StatusNotificationRequest, StatusNotificationResponse,
};
use tracing::{debug, warn};

use crate::application::handlers::SystemHandler;
use crate::domain::{ConnectorStatus, OcppResult};

impl SystemHandler {
    /// Connector 0 describes the charge point itself; any other id is stored
    /// on the connector, which is created on first report.
    pub async fn status_notification(
        &self,
        charge_point_id: &str,
        req: StatusNotificationRequest,
    ) -> OcppResult<StatusNotificationResponse> {
        let status = ConnectorStatus::from(&req.status);
        let error_code = format!("{:?}", req.error_code);
        debug!(
            charge_point_id,
            connector_id = req.connector_id,
            status = %status,
            error_code = error_code.as_str(),
            "StatusNotification"
        );

        match self.store.charge_point(charge_point_id) {
            Some(state) if req.connector_id == 0 => {
                let mut cp = state.charge_point.write().await;
                cp.status = status.to_string();
                cp.error_code = error_code.clone();
                cp.touch();
                self.check_persisted(
                    "update_charge_point",
                    charge_point_id,
                    self.db.update_charge_point(&cp).await,
                );
            }
            Some(state) => {
                let (shared, created) = state.connector_or_insert(req.connector_id);
                let mut connector = shared.lock().await;

                if let Some(dropped) = connector.apply_status(status) {
                    warn!(
                        charge_point_id,
                        connector_id = req.connector_id,
                        transaction_id = dropped,
                        "Connector reported Available with an open transaction, link released"
                    );
                    self.release_orphan(dropped);
                }
                connector.error_code = error_code.clone();
                connector.info = req.info.clone();
                connector.vendor_id = req.vendor_id.clone();
                connector.vendor_error_code = req.vendor_error_code.clone();

                let result = if created {
                    self.db.add_connector(charge_point_id, &connector).await
                } else {
                    self.db.update_connector(charge_point_id, &connector).await
                };
                self.check_persisted("save_connector", charge_point_id, result);
            }
            None => {
                warn!(charge_point_id, "StatusNotification from unknown charge point");
            }
        }

        self.events
            .on_status_notification(
                charge_point_id,
                req.connector_id,
                status,
                &error_code,
                req.info.as_deref(),
            )
            .await;

        Ok(StatusNotificationResponse {})
    }
}
