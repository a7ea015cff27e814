//! Application ports
//!
//! Domain collaborators (database, events, logging, power data) are defined in
//! `domain::ports`. Ports that depend on application-layer message types live here.

pub mod outbound;

pub use outbound::{PowerHandler, SharedPowerHandler};

#[cfg(test)]
pub use outbound::RecordingPowerHandler;
