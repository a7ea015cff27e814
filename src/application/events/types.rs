//! Events published by the central system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Transaction;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    ConnectorStatusChanged(ConnectorStatusChangedEvent),
    TransactionStarted(TransactionStartedEvent),
    TransactionStopped(TransactionStoppedEvent),
    AuthorizationResult(AuthorizationEvent),
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::ConnectorStatusChanged(_) => "connector_status_changed",
            Event::TransactionStarted(_) => "transaction_started",
            Event::TransactionStopped(_) => "transaction_stopped",
            Event::AuthorizationResult(_) => "authorization_result",
        }
    }

    pub fn charge_point_id(&self) -> &str {
        match self {
            Event::ConnectorStatusChanged(e) => &e.charge_point_id,
            Event::TransactionStarted(e) => &e.charge_point_id,
            Event::TransactionStopped(e) => &e.charge_point_id,
            Event::AuthorizationResult(e) => &e.charge_point_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorStatusChangedEvent {
    pub charge_point_id: String,
    /// 0 for the charge point itself
    pub connector_id: u32,
    pub status: String,
    pub error_code: String,
    pub info: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStartedEvent {
    pub charge_point_id: String,
    pub connector_id: u32,
    pub transaction_id: i32,
    pub id_tag: String,
    pub username: String,
    pub meter_start: i32,
    pub timestamp: DateTime<Utc>,
}

impl From<&Transaction> for TransactionStartedEvent {
    fn from(tx: &Transaction) -> Self {
        Self {
            charge_point_id: tx.charge_point_id.clone(),
            connector_id: tx.connector_id,
            transaction_id: tx.id,
            id_tag: tx.id_tag.clone(),
            username: tx.username.clone(),
            meter_start: tx.meter_start,
            timestamp: tx.time_start,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStoppedEvent {
    pub charge_point_id: String,
    pub connector_id: u32,
    pub transaction_id: i32,
    pub id_tag: String,
    pub meter_stop: i32,
    /// Wh delivered over the whole session
    pub energy_consumed_wh: i32,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<&Transaction> for TransactionStoppedEvent {
    fn from(tx: &Transaction) -> Self {
        Self {
            charge_point_id: tx.charge_point_id.clone(),
            connector_id: tx.connector_id,
            transaction_id: tx.id,
            id_tag: tx.id_tag.clone(),
            meter_stop: tx.meter_stop,
            energy_consumed_wh: tx.energy_consumed().unwrap_or(0),
            reason: tx.reason.clone(),
            timestamp: tx.time_stop.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationEvent {
    pub charge_point_id: String,
    pub id_tag: String,
    pub status: String,
}

/// Event with its publication time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: Event,
    pub published_at: DateTime<Utc>,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            event,
            published_at: Utc::now(),
        }
    }
}
