//! StartTransaction handler

use rust_ocpp::v1_6::messages::start_transaction::{
    StartTransactionRequest, StartTransactionResponse,
};
use rust_ocpp::v1_6::types::{AuthorizationStatus, IdTagInfo};
use tracing::{info, warn};

use crate::application::handlers::SystemHandler;
use crate::config::BusyConnectorPolicy;
use crate::domain::{OcppResult, Transaction};

impl SystemHandler {
    pub async fn start_transaction(
        &self,
        charge_point_id: &str,
        req: StartTransactionRequest,
    ) -> OcppResult<StartTransactionResponse> {
        let tag = self.resolve_user_tag(&req.id_tag).await;

        let mut displaced = None;
        let transaction = match self.store.charge_point(charge_point_id) {
            Some(state) => {
                let (shared, created) = state.connector_or_insert(req.connector_id);
                let mut connector = shared.lock().await;
                if created {
                    self.check_persisted(
                        "add_connector",
                        charge_point_id,
                        self.db.add_connector(charge_point_id, &connector).await,
                    );
                }

                if connector.is_active() {
                    self.log.error(&format!(
                        "StartTransaction on busy connector {} of {} (open transaction {})",
                        req.connector_id, charge_point_id, connector.current_transaction_id
                    ));
                    if self.settings.busy_connector_policy == BusyConnectorPolicy::Reject {
                        return Ok(response(0, AuthorizationStatus::ConcurrentTx));
                    }
                    displaced = Some(connector.current_transaction_id);
                }

                let transaction = self.open_transaction(charge_point_id, &req, tag.as_ref()).await;
                connector.current_transaction_id = transaction.id;
                self.check_persisted(
                    "update_connector",
                    charge_point_id,
                    self.db.update_connector(charge_point_id, &connector).await,
                );
                transaction
            }
            None => {
                warn!(charge_point_id, "StartTransaction from unknown charge point");
                self.open_transaction(charge_point_id, &req, tag.as_ref()).await
            }
        };

        info!(
            charge_point_id,
            connector_id = req.connector_id,
            transaction_id = transaction.id,
            id_tag = req.id_tag.as_str(),
            meter_start = req.meter_start,
            "Transaction started"
        );

        if let Some(displaced) = displaced {
            warn!(
                charge_point_id,
                connector_id = req.connector_id,
                transaction_id = displaced,
                "Displaced transaction released"
            );
            self.release_orphan(displaced);
        }

        self.events.on_transaction_start(&transaction).await;
        if let Some(trigger) = &self.trigger {
            trigger.register(charge_point_id, req.connector_id, transaction.id);
        }

        Ok(response(transaction.id, AuthorizationStatus::Accepted))
    }

    /// Allocate, persist and register a new transaction.
    async fn open_transaction(
        &self,
        charge_point_id: &str,
        req: &StartTransactionRequest,
        tag: Option<&crate::domain::UserTag>,
    ) -> Transaction {
        let mut transaction = Transaction::new(
            self.store.allocate_transaction_id(),
            charge_point_id,
            req.connector_id,
            &req.id_tag,
            req.meter_start,
            req.timestamp,
        );
        if let Some(tag) = tag {
            transaction.username = tag.username.clone();
            transaction.user_note = tag.note.clone();
        }
        transaction.reservation_id = req.reservation_id.map(|id| id as i32);

        self.check_persisted(
            "add_transaction",
            charge_point_id,
            self.db.add_transaction(&transaction).await,
        );
        self.store.insert_transaction(transaction.clone());
        transaction
    }
}

fn response(transaction_id: i32, status: AuthorizationStatus) -> StartTransactionResponse {
    StartTransactionResponse {
        transaction_id,
        id_tag_info: IdTagInfo {
            status,
            expiry_date: None,
            parent_id_tag: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use rust_ocpp::v1_6::types::AuthorizationStatus;
    use serde_json::json;

    use crate::application::handlers::test_support::{harness, harness_with};
    use crate::application::handlers::HandlerSettings;
    use crate::application::ocpp::{Request, Response};
    use crate::application::ports::RecordingPowerHandler;
    use crate::application::trigger_watcher::trigger_watcher;
    use crate::config::BusyConnectorPolicy;
    use crate::domain::{ChargePoint, Transaction};
    use crate::infrastructure::storage::InMemoryDatabase;

    fn start(connector_id: u32, id_tag: &str) -> Request {
        Request::decode(
            "StartTransaction",
            json!({
                "connectorId": connector_id,
                "idTag": id_tag,
                "meterStart": 1000,
                "timestamp": "2024-05-01T10:00:00Z"
            }),
        )
        .unwrap()
    }

    fn transaction_id(resp: Response) -> (i32, AuthorizationStatus) {
        match resp {
            Response::StartTransaction(r) => (r.transaction_id, r.id_tag_info.status),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn ids_continue_after_highest_persisted() {
        let db = Arc::new(InMemoryDatabase::new());
        db.insert_charge_point(ChargePoint::new("CP1"));
        let mut old = Transaction::new(57, "CP1", 1, "TAG-1", 0, Utc::now());
        old.finish(10, Utc::now(), None);
        db.insert_transaction(old);
        let h = harness_with(db, HandlerSettings::default()).await;

        let (id, status) = transaction_id(h.handler.handle("CP1", start(1, "TAG-1")).await.unwrap());
        assert_eq!(id, 58);
        assert!(matches!(status, AuthorizationStatus::Accepted));
    }

    #[tokio::test]
    async fn start_links_connector_and_resolves_user() {
        let h = harness(HandlerSettings::default()).await;
        let (id, _) = transaction_id(h.handler.handle("CP1", start(2, "TAG-1")).await.unwrap());

        let state = h.handler.store().charge_point("CP1").unwrap();
        let connector = state.connector(2).unwrap();
        assert_eq!(connector.lock().await.current_transaction_id, id);

        let persisted = h.db.transaction(id).unwrap();
        assert_eq!(persisted.username, "alice");
        assert_eq!(persisted.user_note, "fleet");
        assert_eq!(persisted.meter_start, 1000);
        assert_eq!(h.db.connector("CP1", 2).unwrap().current_transaction_id, id);
    }

    #[tokio::test]
    async fn busy_connector_policy() {
        let h = harness(HandlerSettings::default()).await;
        let (first, _) = transaction_id(h.handler.handle("CP1", start(1, "TAG-1")).await.unwrap());
        let (second, status) = transaction_id(h.handler.handle("CP1", start(1, "TAG-1")).await.unwrap());
        assert!(second > first);
        assert!(matches!(status, AuthorizationStatus::Accepted));
        assert_eq!(h.log.errors().len(), 1);

        let settings = HandlerSettings {
            busy_connector_policy: BusyConnectorPolicy::Reject,
            ..HandlerSettings::default()
        };
        let h = harness(settings).await;
        let (first, _) = transaction_id(h.handler.handle("CP1", start(1, "TAG-1")).await.unwrap());
        let (_, status) = transaction_id(h.handler.handle("CP1", start(1, "TAG-1")).await.unwrap());
        assert!(matches!(status, AuthorizationStatus::ConcurrentTx));
        let state = h.handler.store().charge_point("CP1").unwrap();
        assert_eq!(state.connector(1).unwrap().lock().await.current_transaction_id, first);
    }

    #[tokio::test]
    async fn displaced_transaction_is_no_longer_polled() {
        let h = harness(HandlerSettings::default()).await;
        let power = Arc::new(RecordingPowerHandler::new());
        let (trigger, mut watcher) = trigger_watcher(power.clone(), Duration::from_secs(20));
        let handler = h.handler.with_trigger_watcher(trigger);

        let (first, _) = transaction_id(handler.handle("CP1", start(1, "TAG-1")).await.unwrap());
        let (second, _) = transaction_id(handler.handle("CP1", start(1, "TAG-1")).await.unwrap());
        watcher.drain_pending();
        let watched: Vec<i32> = watcher.watch_list().iter().map(|w| w.transaction_id).collect();
        assert_eq!(watched, vec![second]);
        assert!(handler.store().transaction(first).is_none());
        assert!(!h.db.transaction(first).unwrap().is_finished);

        let stop = |id: i32| {
            Request::decode(
                "StopTransaction",
                json!({
                    "transactionId": id,
                    "meterStop": 2000,
                    "timestamp": "2024-05-01T11:00:00Z"
                }),
            )
            .unwrap()
        };
        handler.handle("CP1", stop(second)).await.unwrap();
        watcher.drain_pending();
        assert!(watcher.watch_list().is_empty());
        watcher.tick().await;
        assert!(power.sent().is_empty());

        // A late stop for the displaced transaction still closes it
        handler.handle("CP1", stop(first)).await.unwrap();
        assert!(h.db.transaction(first).unwrap().is_finished);
    }

    #[tokio::test]
    async fn unknown_station_still_gets_an_id() {
        let h = harness(HandlerSettings::default()).await;
        let (id, status) = transaction_id(h.handler.handle("CP-X", start(1, "TAG-1")).await.unwrap());
        assert!(id > 0);
        assert!(matches!(status, AuthorizationStatus::Accepted));
        assert!(h.db.transaction(id).is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_starts_on_distinct_connectors() {
        for _ in 0..20 {
            let h = Arc::new(harness(HandlerSettings::default()).await);
            let mut tasks = Vec::new();
            for connector_id in 1..=8u32 {
                let h = h.clone();
                tasks.push(tokio::spawn(async move {
                    let resp = h.handler.handle("CP1", start(connector_id, "TAG-1")).await.unwrap();
                    (connector_id, transaction_id(resp).0)
                }));
            }

            let mut ids = HashSet::new();
            let state = h.handler.store().charge_point("CP1").unwrap();
            for task in tasks {
                let (connector_id, id) = task.await.unwrap();
                assert!(ids.insert(id), "duplicate transaction id {}", id);
                let connector = state.connector(connector_id).unwrap();
                assert_eq!(connector.lock().await.current_transaction_id, id);
            }
            assert_eq!(state.connector_ids(), (1..=8).collect::<Vec<u32>>());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_starts_on_two_connectors_keep_map_consistent() {
        for _ in 0..50 {
            let h = Arc::new(harness(HandlerSettings::default()).await);
            let a = {
                let h = h.clone();
                tokio::spawn(async move { h.handler.handle("CP1", start(1, "TAG-1")).await })
            };
            let b = {
                let h = h.clone();
                tokio::spawn(async move { h.handler.handle("CP1", start(2, "TAG-1")).await })
            };
            let (id_a, _) = transaction_id(a.await.unwrap().unwrap());
            let (id_b, _) = transaction_id(b.await.unwrap().unwrap());
            assert_ne!(id_a, id_b);

            let state = h.handler.store().charge_point("CP1").unwrap();
            assert_eq!(state.connector_ids(), vec![1, 2]);
            assert_eq!(state.connector(1).unwrap().lock().await.current_transaction_id, id_a);
            assert_eq!(state.connector(2).unwrap().lock().await.current_transaction_id, id_b);
        }
    }
}
