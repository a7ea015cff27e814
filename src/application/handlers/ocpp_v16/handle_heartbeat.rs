//! Heartbeat handler

use chrono::Utc;
use rust_ocpp::v1_6::messages::heart_beat::{HeartbeatRequest, HeartbeatResponse};
use tracing::debug;

use crate::application::handlers::SystemHandler;
use crate::domain::OcppResult;

impl SystemHandler {
    pub async fn heartbeat(
        &self,
        charge_point_id: &str,
        _req: HeartbeatRequest,
    ) -> OcppResult<HeartbeatResponse> {
        debug!(charge_point_id, "Heartbeat");
        if let Some(state) = self.store.charge_point(charge_point_id) {
            state.charge_point.write().await.touch();
        }
        Ok(HeartbeatResponse {
            current_time: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::application::handlers::test_support::harness;
    use crate::application::handlers::HandlerSettings;
    use crate::application::ocpp::Request;

    #[tokio::test]
    async fn heartbeat_refreshes_last_seen() {
        let h = harness(HandlerSettings::default()).await;
        let state = h.handler.store().charge_point("CP1").unwrap();
        assert!(state.charge_point.read().await.last_seen.is_none());

        let req = Request::decode("Heartbeat", json!({})).unwrap();
        h.handler.handle("CP1", req).await.unwrap();
        assert!(state.charge_point.read().await.last_seen.is_some());
    }
}
