//! MeterValues handler

use rust_ocpp::v1_6::messages::meter_values::{MeterValuesRequest, MeterValuesResponse};
use rust_ocpp::v1_6::types::Measurand;
use tracing::{debug, warn};

use super::wire_name;
use crate::application::handlers::SystemHandler;
use crate::domain::{MeterSample, OcppResult};

impl SystemHandler {
    pub async fn meter_values(
        &self,
        charge_point_id: &str,
        req: MeterValuesRequest,
    ) -> OcppResult<MeterValuesResponse> {
        if let Some(transaction_id) = req.transaction_id {
            if !self.transaction_known(transaction_id).await {
                warn!(
                    charge_point_id,
                    transaction_id, "MeterValues for unknown transaction"
                );
            }
        }

        let samples: Vec<MeterSample> = req
            .meter_value
            .iter()
            .flat_map(|meter_value| {
                meter_value.sampled_value.iter().map(move |sampled| MeterSample {
                    charge_point_id: charge_point_id.to_string(),
                    connector_id: req.connector_id,
                    transaction_id: req.transaction_id,
                    timestamp: meter_value.timestamp,
                    measurand: wire_name(
                        sampled
                            .measurand
                            .as_ref()
                            .unwrap_or(&Measurand::EnergyActiveImportRegister),
                    ),
                    value: sampled.value.clone(),
                    unit: sampled.unit.as_ref().map(wire_name),
                    context: sampled.context.as_ref().map(wire_name),
                })
            })
            .collect();

        debug!(
            charge_point_id,
            connector_id = req.connector_id,
            samples = samples.len(),
            "MeterValues"
        );

        if !samples.is_empty() {
            self.check_persisted(
                "add_meter_samples",
                charge_point_id,
                self.db.add_meter_samples(&samples).await,
            );
        }

        Ok(MeterValuesResponse {})
    }

    async fn transaction_known(&self, transaction_id: i32) -> bool {
        if self.store.transaction(transaction_id).is_some() {
            return true;
        }
        matches!(self.db.get_transaction(transaction_id).await, Ok(Some(_)))
    }
}
