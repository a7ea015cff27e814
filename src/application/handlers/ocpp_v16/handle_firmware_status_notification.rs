//! FirmwareStatusNotification handler

use rust_ocpp::v1_6::messages::firmware_status_notification::{
    FirmwareStatusNotificationRequest, FirmwareStatusNotificationResponse,
};
use tracing::{info, warn};

use crate::application::handlers::SystemHandler;
use crate::domain::OcppResult;

impl SystemHandler {
    pub async fn firmware_status_notification(
        &self,
        charge_point_id: &str,
        req: FirmwareStatusNotificationRequest,
    ) -> OcppResult<FirmwareStatusNotificationResponse> {
        let status = format!("{:?}", req.status);
        info!(charge_point_id, status = status.as_str(), "FirmwareStatusNotification");

        let Some(state) = self.store.charge_point(charge_point_id) else {
            warn!(charge_point_id, "FirmwareStatusNotification from unknown charge point");
            return Ok(FirmwareStatusNotificationResponse {});
        };

        let mut cp = state.charge_point.write().await;
        cp.firmware_status = Some(status);
        self.check_persisted(
            "update_charge_point",
            charge_point_id,
            self.db.update_charge_point(&cp).await,
        );

        Ok(FirmwareStatusNotificationResponse {})
    }
}
