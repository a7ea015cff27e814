//! Outbound port for central-system-initiated requests
//!
//! [`PowerHandler`] decouples the load balancer, trigger watcher and remote
//! commands from the WebSocket transport. The production implementation is
//! [`ConnectionManager`](crate::session::ConnectionManager).

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::ocpp::OutgoingRequest;
use crate::domain::OcppResult;

#[async_trait]
pub trait PowerHandler: Send + Sync {
    /// Queue `request` for the charge point's socket.
    ///
    /// Fails with `OcppError::NotConnected` when no live session exists.
    /// Returns the unique id of the sent Call.
    async fn send_request(
        &self,
        charge_point_id: &str,
        request: OutgoingRequest,
    ) -> OcppResult<String>;
}

pub type SharedPowerHandler = Arc<dyn PowerHandler>;

#[cfg(test)]
mod recording {
    use std::sync::Mutex;

    use super::*;
    use crate::application::ocpp::Action;
    use crate::domain::OcppError;

    /// Records every request instead of sending it.
    #[derive(Default)]
    pub struct RecordingPowerHandler {
        sent: Mutex<Vec<(String, OutgoingRequest)>>,
        offline: Mutex<Vec<String>>,
    }

    impl RecordingPowerHandler {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make sends to `charge_point_id` fail with NotConnected.
        pub fn disconnect(&self, charge_point_id: &str) {
            self.offline.lock().unwrap().push(charge_point_id.to_string());
        }

        pub fn sent(&self) -> Vec<(String, OutgoingRequest)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn sent_actions(&self) -> Vec<(String, Action)> {
            self.sent()
                .into_iter()
                .map(|(cp, req)| (cp, req.action()))
                .collect()
        }

        pub fn clear(&self) {
            self.sent.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl PowerHandler for RecordingPowerHandler {
        async fn send_request(
            &self,
            charge_point_id: &str,
            request: OutgoingRequest,
        ) -> OcppResult<String> {
            if self.offline.lock().unwrap().iter().any(|id| id == charge_point_id) {
                return Err(OcppError::NotConnected(charge_point_id.to_string()));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push((charge_point_id.to_string(), request));
            Ok(format!("rec-{}", sent.len()))
        }
    }
}

#[cfg(test)]
pub use recording::RecordingPowerHandler;
