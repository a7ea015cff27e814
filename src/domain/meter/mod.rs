//! Meter readings reported through MeterValues

use chrono::{DateTime, Utc};

/// A single sampled value as reported by a charge point.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterSample {
    pub charge_point_id: String,
    pub connector_id: u32,
    pub transaction_id: Option<i32>,
    pub timestamp: DateTime<Utc>,
    pub measurand: String,
    pub value: String,
    pub unit: Option<String>,
    pub context: Option<String>,
}
