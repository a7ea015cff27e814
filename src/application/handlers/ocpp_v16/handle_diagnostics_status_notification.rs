//! DiagnosticsStatusNotification handler

use rust_ocpp::v1_6::messages::diagnostics_status_notification::{
    DiagnosticsStatusNotificationRequest, DiagnosticsStatusNotificationResponse,
};
use tracing::{info, warn};

use crate::application::handlers::SystemHandler;
use crate::domain::OcppResult;

impl SystemHandler {
    pub async fn diagnostics_status_notification(
        &self,
        charge_point_id: &str,
        req: DiagnosticsStatusNotificationRequest,
    ) -> OcppResult<DiagnosticsStatusNotificationResponse> {
        let status = format!("{:?}", req.status);
        info!(charge_point_id, status = status.as_str(), "DiagnosticsStatusNotification");

        match self.store.charge_point(charge_point_id) {
            Some(state) => {
                let mut cp = state.charge_point.write().await;
                cp.diagnostics_status = Some(status);
                self.check_persisted(
                    "update_charge_point",
                    charge_point_id,
                    self.db.update_charge_point(&cp).await,
                );
            }
            None => warn!(charge_point_id, "DiagnosticsStatusNotification from unknown charge point"),
        }

        Ok(DiagnosticsStatusNotificationResponse {})
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::application::handlers::test_support::harness;
    use crate::application::handlers::HandlerSettings;
    use crate::application::ocpp::Request;

    #[tokio::test]
    async fn status_is_stored_on_charge_point() {
        let h = harness(HandlerSettings::default()).await;
        let req =
            Request::decode("DiagnosticsStatusNotification", json!({"status": "Uploaded"})).unwrap();
        h.handler.handle("CP1", req).await.unwrap();

        assert_eq!(
            h.db.charge_point("CP1").unwrap().diagnostics_status.as_deref(),
            Some("Uploaded")
        );
    }
}
