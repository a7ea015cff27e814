//! Core domain entities, errors and collaborator interfaces

pub mod charge_point;
pub mod error;
pub mod location;
pub mod meter;
pub mod ports;
pub mod transaction;
pub mod user_tag;

pub use charge_point::{ChargePoint, Connector, ConnectorStatus, NO_TRANSACTION};
pub use error::{OcppError, OcppResult};
pub use location::Location;
pub use meter::MeterSample;
pub use ports::{Database, EventHandler, LogHandler, PowerRepository};
pub use transaction::Transaction;
pub use user_tag::UserTag;
