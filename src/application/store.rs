//! In-memory registry of charge points, connectors and open transactions
//!
//! The store is authoritative while the process runs; the [`Database`] is a
//! mirror written through by the handlers. Lock order is Transaction before
//! Connector, and no caller holds two Connector locks at once.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::domain::{ChargePoint, Connector, Database, OcppResult, Transaction};

pub type SharedConnector = Arc<Mutex<Connector>>;
pub type SharedTransaction = Arc<Mutex<Transaction>>;

/// A registered charge point and its connectors.
pub struct ChargePointState {
    pub charge_point: RwLock<ChargePoint>,
    connectors: DashMap<u32, SharedConnector>,
}

impl ChargePointState {
    fn new(charge_point: ChargePoint) -> Self {
        Self {
            charge_point: RwLock::new(charge_point),
            connectors: DashMap::new(),
        }
    }

    pub fn connector(&self, connector_id: u32) -> Option<SharedConnector> {
        self.connectors.get(&connector_id).map(|c| c.clone())
    }

    /// Existing connector, or a fresh one inserted atomically.
    ///
    /// The flag is `true` when the connector was created by this call.
    pub fn connector_or_insert(&self, connector_id: u32) -> (SharedConnector, bool) {
        let mut created = false;
        let connector = self
            .connectors
            .entry(connector_id)
            .or_insert_with(|| {
                created = true;
                Arc::new(Mutex::new(Connector::new(connector_id)))
            })
            .clone();
        (connector, created)
    }

    /// Connector ids in ascending order.
    pub fn connector_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.connectors.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    fn insert_connector(&self, connector: Connector) {
        self.connectors
            .insert(connector.id, Arc::new(Mutex::new(connector)));
    }
}

pub struct StateStore {
    charge_points: DashMap<String, Arc<ChargePointState>>,
    transactions: DashMap<i32, SharedTransaction>,
    next_transaction_id: AtomicI32,
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_next_transaction_id(1)
    }

    pub fn with_next_transaction_id(next: i32) -> Self {
        Self {
            charge_points: DashMap::new(),
            transactions: DashMap::new(),
            next_transaction_id: AtomicI32::new(next),
        }
    }

    /// Build the store from the database: every charge point with its
    /// connectors, the transactions those connectors still reference, and the
    /// id counter seeded past the highest persisted transaction.
    pub async fn load(db: &dyn Database) -> OcppResult<Self> {
        let next_id = db
            .get_last_transaction()
            .await?
            .map_or(1, |tx| tx.id.saturating_add(1));
        let store = Self::with_next_transaction_id(next_id);

        for cp in db.get_charge_points().await? {
            let connectors = db.get_connectors(&cp.id).await?;
            let state = store.insert_charge_point(cp);

            for connector in connectors {
                if connector.is_active() {
                    match db.get_transaction(connector.current_transaction_id).await? {
                        Some(tx) if !tx.is_finished => {
                            store.insert_transaction(tx);
                        }
                        _ => warn!(
                            connector_id = connector.id,
                            transaction_id = connector.current_transaction_id,
                            "Connector references a missing or closed transaction"
                        ),
                    }
                }
                state.insert_connector(connector);
            }
        }

        info!(
            charge_points = store.charge_points.len(),
            open_transactions = store.transactions.len(),
            next_transaction_id = next_id,
            "State store loaded"
        );
        Ok(store)
    }

    pub fn charge_point(&self, charge_point_id: &str) -> Option<Arc<ChargePointState>> {
        self.charge_points.get(charge_point_id).map(|s| s.clone())
    }

    /// Register a charge point, returning the existing state if it is already known.
    pub fn insert_charge_point(&self, charge_point: ChargePoint) -> Arc<ChargePointState> {
        self.charge_points
            .entry(charge_point.id.clone())
            .or_insert_with(|| Arc::new(ChargePointState::new(charge_point)))
            .clone()
    }

    /// Charge point ids in ascending order.
    pub fn charge_point_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.charge_points.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Next transaction id; unique for the life of the process.
    pub fn allocate_transaction_id(&self) -> i32 {
        self.next_transaction_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn insert_transaction(&self, transaction: Transaction) -> SharedTransaction {
        let id = transaction.id;
        let shared = Arc::new(Mutex::new(transaction));
        self.transactions.insert(id, shared.clone());
        shared
    }

    pub fn transaction(&self, transaction_id: i32) -> Option<SharedTransaction> {
        self.transactions.get(&transaction_id).map(|t| t.clone())
    }

    pub fn remove_transaction(&self, transaction_id: i32) -> Option<SharedTransaction> {
        self.transactions.remove(&transaction_id).map(|(_, t)| t)
    }

    /// `(charge_point_id, connector_id, transaction_id)` for every connector
    /// with an open transaction.
    pub async fn active_connectors(&self) -> Vec<(String, u32, i32)> {
        let mut active = Vec::new();
        for cp_id in self.charge_point_ids() {
            let Some(state) = self.charge_point(&cp_id) else {
                continue;
            };
            for connector_id in state.connector_ids() {
                if let Some(connector) = state.connector(connector_id) {
                    let connector = connector.lock().await;
                    if connector.is_active() {
                        active.push((cp_id.clone(), connector_id, connector.current_transaction_id));
                    }
                }
            }
        }
        active
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
