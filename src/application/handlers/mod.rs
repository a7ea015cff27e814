//! System handler: state machine for every charge-point-initiated action
//!
//! One method per action lives in `ocpp_v16/handle_*.rs`. [`SystemHandler::handle`]
//! routes a decoded [`Request`] to its method with an exhaustive match, and
//! [`SystemHandler::follow_up`] runs the load balancer reaction once the
//! response has been written.

mod ocpp_v16;

use std::sync::Arc;

use tracing::warn;

use crate::application::load_balancer::LoadBalancer;
use crate::application::ocpp::{Request, Response};
use crate::application::store::StateStore;
use crate::application::trigger_watcher::TriggerHandle;
use crate::config::{BusyConnectorPolicy, OcppConfig};
use crate::domain::{Database, EventHandler, LogHandler, OcppResult};

/// Protocol policies applied by the handlers.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub heartbeat_interval: u32,
    pub auto_register_charge_points: bool,
    pub auto_register_tags: bool,
    pub busy_connector_policy: BusyConnectorPolicy,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self::from(&OcppConfig::default())
    }
}

impl From<&OcppConfig> for HandlerSettings {
    fn from(config: &OcppConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval,
            auto_register_charge_points: config.auto_register_charge_points,
            auto_register_tags: config.auto_register_tags,
            busy_connector_policy: config.busy_connector_policy,
        }
    }
}

pub struct SystemHandler {
    store: Arc<StateStore>,
    db: Arc<dyn Database>,
    events: Arc<dyn EventHandler>,
    log: Arc<dyn LogHandler>,
    load_balancer: Option<Arc<LoadBalancer>>,
    trigger: Option<TriggerHandle>,
    settings: HandlerSettings,
}

impl SystemHandler {
    pub fn new(
        store: Arc<StateStore>,
        db: Arc<dyn Database>,
        events: Arc<dyn EventHandler>,
        log: Arc<dyn LogHandler>,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            store,
            db,
            events,
            log,
            load_balancer: None,
            trigger: None,
            settings,
        }
    }

    pub fn with_load_balancer(mut self, load_balancer: Arc<LoadBalancer>) -> Self {
        self.load_balancer = Some(load_balancer);
        self
    }

    pub fn with_trigger_watcher(mut self, trigger: TriggerHandle) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn log(&self) -> &Arc<dyn LogHandler> {
        &self.log
    }

    /// Apply `request` from `charge_point_id` and build its response.
    pub async fn handle(&self, charge_point_id: &str, request: Request) -> OcppResult<Response> {
        let response = match request {
            Request::BootNotification(req) => {
                Response::BootNotification(self.boot_notification(charge_point_id, req).await?)
            }
            Request::Authorize(req) => {
                Response::Authorize(self.authorize(charge_point_id, req).await?)
            }
            Request::Heartbeat(req) => {
                Response::Heartbeat(self.heartbeat(charge_point_id, req).await?)
            }
            Request::StartTransaction(req) => {
                Response::StartTransaction(self.start_transaction(charge_point_id, req).await?)
            }
            Request::StopTransaction(req) => {
                Response::StopTransaction(self.stop_transaction(charge_point_id, req).await?)
            }
            Request::MeterValues(req) => {
                Response::MeterValues(self.meter_values(charge_point_id, req).await?)
            }
            Request::StatusNotification(req) => Response::StatusNotification(
                self.status_notification(charge_point_id, req).await?,
            ),
            Request::DataTransfer(req) => {
                Response::DataTransfer(self.data_transfer(charge_point_id, req).await?)
            }
            Request::DiagnosticsStatusNotification(req) => {
                Response::DiagnosticsStatusNotification(
                    self.diagnostics_status_notification(charge_point_id, req)
                        .await?,
                )
            }
            Request::FirmwareStatusNotification(req) => Response::FirmwareStatusNotification(
                self.firmware_status_notification(charge_point_id, req)
                    .await?,
            ),
        };
        Ok(response)
    }

    /// Work that must not overtake the response to `request`.
    pub async fn follow_up(&self, charge_point_id: &str, request: &Request) {
        let Some(load_balancer) = &self.load_balancer else {
            return;
        };

        let result = match request {
            Request::BootNotification(_) => {
                if self.store.charge_point(charge_point_id).is_none() {
                    return;
                }
                load_balancer.on_charge_point_boot(charge_point_id).await
            }
            Request::StartTransaction(_)
            | Request::StopTransaction(_)
            | Request::StatusNotification(_) => load_balancer
                .check_power_limit(charge_point_id)
                .await
                .map(|_| ()),
            _ => return,
        };

        if let Err(e) = result {
            warn!(charge_point_id, error = %e, "Load balancer follow-up failed");
        }
    }

    /// Forget a transaction whose connector link was dropped without a
    /// StopTransaction. It stays open in the database, where a late stop
    /// still finds it.
    fn release_orphan(&self, transaction_id: i32) {
        self.store.remove_transaction(transaction_id);
        if let Some(trigger) = &self.trigger {
            trigger.unregister(transaction_id);
        }
    }

    /// Log a failed write-through; in-memory state stays authoritative.
    fn check_persisted(&self, operation: &str, charge_point_id: &str, result: OcppResult<()>) {
        if let Err(e) = result {
            self.log.error(&format!(
                "{} failed for charge point {}: {}",
                operation, charge_point_id, e
            ));
        }
    }
}
