//! BootNotification handler

use chrono::Utc;
use rust_ocpp::v1_6::messages::boot_notification::{
    BootNotificationRequest, BootNotificationResponse,
};
use rust_ocpp::v1_6::types::RegistrationStatus;
use tracing::{info, warn};

use crate::application::handlers::SystemHandler;
use crate::domain::{ChargePoint, OcppResult};

impl SystemHandler {
    /// Known stations are accepted (disabled ones too; authorization gates
    /// charging). Unknown stations are rejected unless auto-registration is on.
    pub async fn boot_notification(
        &self,
        charge_point_id: &str,
        req: BootNotificationRequest,
    ) -> OcppResult<BootNotificationResponse> {
        info!(
            charge_point_id,
            vendor = req.charge_point_vendor.as_str(),
            model = req.charge_point_model.as_str(),
            "BootNotification"
        );

        let state = match self.store.charge_point(charge_point_id) {
            Some(state) => state,
            None if self.settings.auto_register_charge_points => {
                let cp = ChargePoint::new(charge_point_id);
                self.check_persisted(
                    "add_charge_point",
                    charge_point_id,
                    self.db.add_charge_point(&cp).await,
                );
                info!(charge_point_id, "Charge point auto-registered");
                self.store.insert_charge_point(cp)
            }
            None => {
                warn!(charge_point_id, "BootNotification from unknown charge point");
                return Ok(BootNotificationResponse {
                    current_time: Utc::now(),
                    interval: self.settings.heartbeat_interval,
                    status: RegistrationStatus::Rejected,
                });
            }
        };

        let mut cp = state.charge_point.write().await;
        let changed = cp.update_identity(
            &req.charge_point_vendor,
            &req.charge_point_model,
            req.charge_point_serial_number.as_deref(),
            req.firmware_version.as_deref(),
        );
        cp.touch();
        if changed {
            info!(
                charge_point_id,
                serial_number = ?cp.serial_number,
                firmware_version = ?cp.firmware_version,
                "Charge point identity updated"
            );
            self.check_persisted(
                "update_charge_point",
                charge_point_id,
                self.db.update_charge_point(&cp).await,
            );
        }
        if !cp.enabled {
            warn!(charge_point_id, "Disabled charge point booted");
        }

        Ok(BootNotificationResponse {
            current_time: Utc::now(),
            interval: self.settings.heartbeat_interval,
            status: RegistrationStatus::Accepted,
        })
    }
}
