//! Registry of live charge point sessions
//!
//! [`ConnectionManager`] is the production [`PowerHandler`]: outbound Calls
//! get a fresh UUID unique id and are remembered until the charge point
//! answers, so the CallResult / CallError can be logged against its action.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use super::Connection;
use crate::application::ocpp::{Action, OutgoingRequest};
use crate::application::ports::PowerHandler;
use crate::domain::{OcppError, OcppResult};

pub struct ConnectionManager {
    connections: DashMap<String, Arc<Connection>>,
    /// Outbound Calls awaiting an answer, keyed by (charge_point_id, unique_id)
    pending: DashMap<(String, String), Action>,
    next_connection_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            pending: DashMap::new(),
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Register a session, replacing any previous one for the same id.
    pub fn register(
        &self,
        charge_point_id: &str,
        remote_addr: Option<SocketAddr>,
        sender: mpsc::UnboundedSender<String>,
    ) -> Arc<Connection> {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
        let connection = Arc::new(Connection::new(
            charge_point_id,
            connection_id,
            remote_addr,
            sender,
        ));
        if let Some(previous) = self
            .connections
            .insert(charge_point_id.to_string(), connection.clone())
        {
            info!(
                charge_point_id,
                previous = previous.connection_id,
                connection_id,
                "Session replaced by reconnect"
            );
        } else {
            info!(charge_point_id, connection_id, "Session registered");
        }
        connection
    }

    /// Remove `connection` unless a newer session already took its place.
    pub fn unregister(&self, connection: &Connection) -> bool {
        let removed = self
            .connections
            .remove_if(&connection.charge_point_id, |_, current| {
                current.connection_id == connection.connection_id
            })
            .is_some();
        if removed {
            self.pending
                .retain(|(cp, _), _| cp != &connection.charge_point_id);
            info!(
                charge_point_id = connection.charge_point_id.as_str(),
                connection_id = connection.connection_id,
                "Session unregistered"
            );
        }
        removed
    }

    pub fn get(&self, charge_point_id: &str) -> Option<Arc<Connection>> {
        self.connections.get(charge_point_id).map(|c| c.clone())
    }

    pub fn is_connected(&self, charge_point_id: &str) -> bool {
        self.connections.contains_key(charge_point_id)
    }

    /// Connected charge point ids in ascending order.
    pub fn connected_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Action of the outbound Call answered by `unique_id`, if it was ours.
    pub fn take_pending(&self, charge_point_id: &str, unique_id: &str) -> Option<Action> {
        self.pending
            .remove(&(charge_point_id.to_string(), unique_id.to_string()))
            .map(|(_, action)| action)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop every session; writer tasks end once their senders are gone.
    pub fn close_all(&self) {
        let count = self.connections.len();
        self.connections.clear();
        self.pending.clear();
        if count > 0 {
            info!(count, "All sessions closed");
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PowerHandler for ConnectionManager {
    async fn send_request(
        &self,
        charge_point_id: &str,
        request: OutgoingRequest,
    ) -> OcppResult<String> {
        let connection = self
            .get(charge_point_id)
            .ok_or_else(|| OcppError::NotConnected(charge_point_id.to_string()))?;

        let unique_id = Uuid::new_v4().to_string();
        let frame = request.encode(&unique_id)?;
        let key = (charge_point_id.to_string(), unique_id.clone());
        self.pending.insert(key.clone(), request.action());

        if let Err(e) = connection.send(frame) {
            self.pending.remove(&key);
            return Err(e);
        }
        debug!(
            charge_point_id,
            action = %request.action(),
            unique_id = unique_id.as_str(),
            "Request sent"
        );
        Ok(unique_id)
    }
}

pub type SharedConnectionManager = Arc<ConnectionManager>;
