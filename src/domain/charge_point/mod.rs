mod model;

pub use model::{ChargePoint, Connector, ConnectorStatus, NO_TRANSACTION};
