//! A live WebSocket session with one charge point

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::application::ocpp::Response;
use crate::domain::{OcppError, OcppResult};
use crate::support::ocpp_frame::OcppFrame;

/// Outbound half of a connection.
///
/// Text frames are pushed onto an unbounded channel drained by the
/// connection's writer task, so sending never waits on the socket.
#[derive(Debug)]
pub struct Connection {
    pub charge_point_id: String,
    /// Distinguishes sessions of a charge point that reconnected.
    pub connection_id: u64,
    pub remote_addr: Option<SocketAddr>,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::UnboundedSender<String>,
    last_call_id: Mutex<Option<String>>,
}

impl Connection {
    pub fn new(
        charge_point_id: impl Into<String>,
        connection_id: u64,
        remote_addr: Option<SocketAddr>,
        sender: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            charge_point_id: charge_point_id.into(),
            connection_id,
            remote_addr,
            connected_at: Utc::now(),
            sender,
            last_call_id: Mutex::new(None),
        }
    }

    /// Queue a raw frame for the socket.
    pub fn send(&self, frame: String) -> OcppResult<()> {
        self.sender
            .send(frame)
            .map_err(|_| OcppError::NotConnected(self.charge_point_id.clone()))
    }

    /// Remember the unique id of the Call being processed.
    pub fn set_last_call_id(&self, unique_id: &str) {
        *self
            .last_call_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(unique_id.to_string());
    }

    pub fn last_call_id(&self) -> Option<String> {
        self.last_call_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Answer the most recently received Call with a CallResult.
    pub fn send_response(&self, response: &Response) -> OcppResult<()> {
        let unique_id = self.current_call_id()?;
        self.send(response.encode(&unique_id)?)
    }

    /// Answer the most recently received Call with a CallError.
    pub fn send_error(&self, error_code: &str, description: &str) -> OcppResult<()> {
        let unique_id = self.current_call_id()?;
        self.send(OcppFrame::error_response(unique_id, error_code, description).serialize())
    }

    fn current_call_id(&self) -> OcppResult<String> {
        self.last_call_id()
            .ok_or_else(|| OcppError::Format("no Call received on this connection".into()))
    }
}
