//! Collaborator interfaces consumed by the central system core
//!
//! - [`Database`]: durable mirror of charge points, connectors, transactions and tags
//! - [`EventHandler`]: sink for domain events (notifications, OCPI push, ...)
//! - [`LogHandler`]: operational log and feature-usage sink
//! - [`PowerRepository`]: location data and power limits for the load balancer

use async_trait::async_trait;

use crate::domain::{
    ChargePoint, Connector, ConnectorStatus, Location, MeterSample, OcppResult, Transaction,
    UserTag,
};

/// Persistence collaborator.
///
/// Every failure is reported as `OcppError::Database`; callers log it and keep
/// the in-memory state authoritative.
#[async_trait]
pub trait Database: Send + Sync {
    async fn get_charge_points(&self) -> OcppResult<Vec<ChargePoint>>;
    async fn get_connectors(&self, charge_point_id: &str) -> OcppResult<Vec<Connector>>;
    async fn add_charge_point(&self, charge_point: &ChargePoint) -> OcppResult<()>;
    async fn update_charge_point(&self, charge_point: &ChargePoint) -> OcppResult<()>;
    async fn add_connector(&self, charge_point_id: &str, connector: &Connector) -> OcppResult<()>;
    async fn update_connector(&self, charge_point_id: &str, connector: &Connector)
        -> OcppResult<()>;

    async fn add_transaction(&self, transaction: &Transaction) -> OcppResult<()>;
    async fn update_transaction(&self, transaction: &Transaction) -> OcppResult<()>;
    async fn get_transaction(&self, id: i32) -> OcppResult<Option<Transaction>>;
    /// Transaction with the highest id, used to seed the id counter.
    async fn get_last_transaction(&self) -> OcppResult<Option<Transaction>>;

    async fn get_user_tag(&self, id_tag: &str) -> OcppResult<Option<UserTag>>;
    async fn add_user_tag(&self, tag: &UserTag) -> OcppResult<()>;

    async fn add_meter_samples(&self, samples: &[MeterSample]) -> OcppResult<()>;
}

/// Receives state-machine events after they have been applied.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_status_notification(
        &self,
        charge_point_id: &str,
        connector_id: u32,
        status: ConnectorStatus,
        error_code: &str,
        info: Option<&str>,
    );
    async fn on_transaction_start(&self, transaction: &Transaction);
    async fn on_transaction_stop(&self, transaction: &Transaction);
    async fn on_authorize(&self, charge_point_id: &str, id_tag: &str, status: &str);
}

pub trait LogHandler: Send + Sync {
    fn debug(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
    /// Records use of a protocol feature, e.g. an action the system does not support.
    fn feature_event(&self, feature: &str, charge_point_id: &str, text: &str);
}

#[async_trait]
pub trait PowerRepository: Send + Sync {
    async fn get_charge_point(&self, charge_point_id: &str) -> OcppResult<Option<ChargePoint>>;
    async fn get_location(&self, location_id: &str) -> OcppResult<Option<Location>>;
    async fn update_connector_current_power(
        &self,
        charge_point_id: &str,
        connector_id: u32,
        power_limit: i32,
    ) -> OcppResult<()>;
}
