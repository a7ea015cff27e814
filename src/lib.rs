//! # OCPP 1.6-J Central System
//!
//! Central system for EV charging stations speaking OCPP 1.6-J, with site
//! load balancing across connectors.
//!
//! ## Architecture
//!
//! - **domain**: entities, errors and collaborator interfaces
//! - **application**: message codec, dispatcher, state machine, load balancer
//! - **infrastructure**: in-memory storage
//! - **session**: live charge point sessions and the outbound request path
//! - **interfaces**: WebSocket server
//! - **server**: runtime wiring and shutdown

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod server;
pub mod session;
pub mod support;

pub use config::{AppConfig, ConfigError};
pub use domain::{OcppError, OcppResult};
pub use server::{init_tracing, ServerHandle};
