//! StopTransaction handler

use chrono::{DateTime, Utc};
use rust_ocpp::v1_6::messages::stop_transaction::{
    StopTransactionRequest, StopTransactionResponse,
};
use rust_ocpp::v1_6::types::{
    AuthorizationStatus, IdTagInfo, Measurand, MeterValue, ReadingContext, UnitOfMeasure,
};
use tracing::{info, warn};

use crate::application::handlers::SystemHandler;
use crate::application::store::SharedTransaction;
use crate::domain::{OcppResult, NO_TRANSACTION};

/// Energy register readings bracketing a transaction, in Wh.
#[derive(Debug, Default, PartialEq)]
struct TransactionReadings {
    begin: Option<(i32, DateTime<Utc>)>,
    end: Option<(i32, DateTime<Utc>)>,
}

fn transaction_readings(data: &[MeterValue]) -> TransactionReadings {
    let mut readings = TransactionReadings::default();
    for meter_value in data {
        for sampled in &meter_value.sampled_value {
            let is_energy = matches!(
                sampled.measurand,
                None | Some(Measurand::EnergyActiveImportRegister)
            );
            if !is_energy {
                continue;
            }
            let Ok(value) = sampled.value.parse::<f64>() else {
                continue;
            };
            let wh = match sampled.unit {
                Some(UnitOfMeasure::KWh) => value * 1000.0,
                _ => value,
            };
            let reading = Some((wh.round() as i32, meter_value.timestamp));
            match sampled.context {
                Some(ReadingContext::TransactionBegin) => readings.begin = reading,
                Some(ReadingContext::TransactionEnd) => readings.end = reading,
                _ => {}
            }
        }
    }
    readings
}

impl SystemHandler {
    pub async fn stop_transaction(
        &self,
        charge_point_id: &str,
        req: StopTransactionRequest,
    ) -> OcppResult<StopTransactionResponse> {
        let transaction_id = req.transaction_id;
        let response = StopTransactionResponse {
            id_tag_info: Some(IdTagInfo {
                status: AuthorizationStatus::Accepted,
                expiry_date: None,
                parent_id_tag: None,
            }),
        };

        let Some(shared) = self.find_transaction(transaction_id).await else {
            warn!(charge_point_id, transaction_id, "StopTransaction for unknown transaction");
            return Ok(response);
        };

        let readings = req
            .transaction_data
            .as_deref()
            .map(transaction_readings)
            .unwrap_or_default();
        let (meter_stop, time_stop) = readings.end.unwrap_or((req.meter_stop, req.timestamp));
        let reason = req.reason.as_ref().map(|r| format!("{:?}", r));

        let mut transaction = shared.lock().await;
        if transaction.is_finished {
            self.log.warn(&format!(
                "StopTransaction for already closed transaction {} from {}",
                transaction_id, charge_point_id
            ));
            drop(transaction);
            self.store.remove_transaction(transaction_id);
            return Ok(response);
        }
        if transaction.charge_point_id != charge_point_id {
            warn!(
                charge_point_id,
                owner = transaction.charge_point_id.as_str(),
                transaction_id,
                "Transaction stopped by a different charge point"
            );
        }

        if let Some((meter_start, time_start)) = readings.begin {
            transaction.meter_start = meter_start;
            transaction.time_start = time_start;
        }
        transaction.finish(meter_stop, time_stop, reason);
        self.check_persisted(
            "update_transaction",
            charge_point_id,
            self.db.update_transaction(&transaction).await,
        );

        // Transaction lock is held; connector lock is taken second.
        if let Some(state) = self.store.charge_point(&transaction.charge_point_id) {
            if let Some(shared_connector) = state.connector(transaction.connector_id) {
                let mut connector = shared_connector.lock().await;
                if connector.current_transaction_id == transaction.id {
                    connector.current_transaction_id = NO_TRANSACTION;
                    self.check_persisted(
                        "update_connector",
                        &transaction.charge_point_id,
                        self.db.update_connector(&transaction.charge_point_id, &connector).await,
                    );
                }
            }
        }

        let closed = transaction.clone();
        drop(transaction);
        self.store.remove_transaction(transaction_id);

        info!(
            charge_point_id,
            transaction_id,
            meter_start = closed.meter_start,
            meter_stop = closed.meter_stop,
            energy_wh = closed.energy_consumed().unwrap_or(0),
            reason = ?closed.reason,
            "Transaction stopped"
        );

        self.events.on_transaction_stop(&closed).await;
        if let Some(trigger) = &self.trigger {
            trigger.unregister(transaction_id);
        }

        Ok(response)
    }

    /// Open or closed transaction from memory, else from the database.
    async fn find_transaction(&self, transaction_id: i32) -> Option<SharedTransaction> {
        if let Some(shared) = self.store.transaction(transaction_id) {
            return Some(shared);
        }
        match self.db.get_transaction(transaction_id).await {
            Ok(Some(transaction)) => Some(self.store.insert_transaction(transaction)),
            Ok(None) => None,
            Err(e) => {
                self.log.error(&format!(
                    "get_transaction failed for {}: {}",
                    transaction_id, e
                ));
                None
            }
        }
    }
}
