//! DataTransfer handler

use rust_ocpp::v1_6::messages::data_transfer::{DataTransferRequest, DataTransferResponse};
use rust_ocpp::v1_6::types::DataTransferStatus;
use tracing::info;

use crate::application::handlers::SystemHandler;
use crate::domain::OcppResult;

impl SystemHandler {
    /// Payloads are logged and acknowledged; no vendor extension is handled.
    pub async fn data_transfer(
        &self,
        charge_point_id: &str,
        req: DataTransferRequest,
    ) -> OcppResult<DataTransferResponse> {
        let status = if self.store.charge_point(charge_point_id).is_some() {
            DataTransferStatus::Accepted
        } else {
            DataTransferStatus::UnknownVendorId
        };

        info!(
            charge_point_id,
            vendor_id = req.vendor_string.as_str(),
            message_id = ?req.message_id,
            data = ?req.data,
            status = ?status,
            "DataTransfer"
        );

        Ok(DataTransferResponse { status, data: None })
    }
}

#[cfg(test)]
mod tests {
    use rust_ocpp::v1_6::types::DataTransferStatus;
    use serde_json::json;

    use crate::application::handlers::test_support::harness;
    use crate::application::handlers::HandlerSettings;
    use crate::application::ocpp::{Request, Response};

    async fn transfer(charge_point_id: &str) -> DataTransferStatus {
        let h = harness(HandlerSettings::default()).await;
        let req = Request::decode(
            "DataTransfer",
            json!({"vendorId": "acme", "messageId": "diag", "data": "x"}),
        )
        .unwrap();
        match h.handler.handle(charge_point_id, req).await.unwrap() {
            Response::DataTransfer(r) => r.status,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn known_station_is_accepted() {
        assert!(matches!(transfer("CP1").await, DataTransferStatus::Accepted));
        assert!(matches!(
            transfer("CP-X").await,
            DataTransferStatus::UnknownVendorId
        ));
    }
}
