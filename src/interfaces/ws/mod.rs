//! WebSocket interface for charge points
//!
//! - `ocpp_server`: accept loop and one read loop per connection
//! - `negotiator`: `Sec-WebSocket-Protocol` selection

pub mod negotiator;
pub mod ocpp_server;

pub use negotiator::{Negotiation, SubprotocolNegotiator};
pub use ocpp_server::OcppServer;
