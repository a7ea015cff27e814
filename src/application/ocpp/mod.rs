//! OCPP 1.6 message layer: typed requests/responses and their action tables

pub mod constraints;
pub mod messages;

pub use constraints::Constrained;
pub use messages::{Action, OutgoingRequest, Request, Response, INBOUND, OUTBOUND};
