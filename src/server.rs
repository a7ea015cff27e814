//! Reusable central system runtime.
//!
//! [`ServerHandle`] wires the in-memory database, state store, handlers,
//! load balancer, trigger watcher and WebSocket server, and owns graceful
//! shutdown. The CLI binary is a thin wrapper around it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::application::{
    commands, trigger_watcher, Dispatcher, EventBus, HandlerSettings, LoadBalancer, PowerTiers,
    SharedEventBus, SharedPowerHandler, StateStore, SystemHandler, TracingLogHandler,
};
use crate::config::{AppConfig, LogFormat, LoggingConfig};
use crate::domain::OcppResult;
use crate::infrastructure::storage::InMemoryDatabase;
use crate::interfaces::ws::{OcppServer, SubprotocolNegotiator};
use crate::session::ConnectionManager;
use crate::support::shutdown::{ShutdownCoordinator, ShutdownSignal};

pub type ServerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Handle to a running central system.
pub struct ServerHandle {
    /// Broadcast of applied state-machine events.
    pub event_bus: SharedEventBus,
    /// Live charge point sessions; also the outbound request path.
    pub connections: Arc<ConnectionManager>,
    pub store: Arc<StateStore>,
    pub db: Arc<InMemoryDatabase>,
    pub config: AppConfig,
    /// Address the WebSocket listener is bound to.
    pub local_addr: SocketAddr,

    shutdown: ShutdownCoordinator,
    ws_task: JoinHandle<()>,
    trigger_task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub async fn start(config: AppConfig) -> ServerResult<Self> {
        info!("Starting OCPP central system...");

        let db = Arc::new(InMemoryDatabase::from_config(&config));
        let store = Arc::new(StateStore::load(db.as_ref()).await?);
        let event_bus: SharedEventBus = Arc::new(EventBus::new());
        let connections = Arc::new(ConnectionManager::new());
        let power: SharedPowerHandler = connections.clone();
        let shutdown = ShutdownCoordinator::new(config.server.shutdown_timeout_secs);

        let mut handler = SystemHandler::new(
            store.clone(),
            db.clone(),
            event_bus.clone(),
            Arc::new(TracingLogHandler),
            HandlerSettings::from(&config.ocpp),
        );

        if config.load_balancer.enabled {
            let tiers = PowerTiers::from(&config.load_balancer);
            info!(
                high = tiers.high,
                middle = tiers.middle,
                floor = tiers.floor,
                "Load balancer enabled"
            );
            handler = handler.with_load_balancer(Arc::new(LoadBalancer::new(
                store.clone(),
                db.clone(),
                power.clone(),
                tiers,
            )));
        }

        let trigger_task = if config.trigger.enabled {
            let (trigger, watcher) = trigger_watcher(
                power.clone(),
                Duration::from_secs(config.trigger.interval_secs),
            );
            for (charge_point_id, connector_id, transaction_id) in store.active_connectors().await {
                trigger.register(&charge_point_id, connector_id, transaction_id);
            }
            handler = handler.with_trigger_watcher(trigger);
            Some(tokio::spawn(watcher.run(shutdown.signal())))
        } else {
            None
        };

        let dispatcher = Arc::new(Dispatcher::new(Arc::new(handler), connections.clone()));
        let server = OcppServer::new(
            SubprotocolNegotiator::new(config.ocpp.subprotocols.clone()),
            connections.clone(),
            dispatcher,
            shutdown.signal(),
        );

        let listener = TcpListener::bind(config.address()).await?;
        let local_addr = listener.local_addr()?;
        let ws_task = tokio::spawn(server.run(listener));

        info!(%local_addr, "All services started");

        Ok(Self {
            event_bus,
            connections,
            store,
            db,
            config,
            local_addr,
            shutdown,
            ws_task,
            trigger_task,
        })
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Install OS signal listeners (SIGTERM, SIGINT) that trigger shutdown.
    pub fn install_signal_handler(&self) {
        self.shutdown.start_signal_listener();
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.signal().trigger();
    }

    /// Wait for every task to stop once shutdown has been triggered.
    pub async fn wait(self) {
        info!("Waiting for server tasks to complete...");

        let ws_task = self.ws_task;
        self.shutdown
            .drain("websocket", async {
                if let Err(e) = ws_task.await {
                    error!(error = %e, "WebSocket server task panicked");
                }
            })
            .await;

        if let Some(task) = self.trigger_task {
            self.shutdown
                .drain("trigger_watcher", async {
                    if let Err(e) = task.await {
                        error!(error = %e, "Trigger watcher task panicked");
                    }
                })
                .await;
        }

        info!("Central system shutdown complete");
    }

    pub async fn shutdown(self) {
        info!("Shutting down central system...");
        self.trigger_shutdown();
        self.wait().await;
    }

    pub fn is_running(&self) -> bool {
        !self.ws_task.is_finished()
    }

    /// Send RemoteStartTransaction to a connected station. Returns the Call's unique id.
    pub async fn remote_start_transaction(
        &self,
        charge_point_id: &str,
        id_tag: &str,
        connector_id: Option<u32>,
    ) -> OcppResult<String> {
        let power: SharedPowerHandler = self.connections.clone();
        commands::remote_start_transaction(&power, charge_point_id, id_tag, connector_id).await
    }

    /// Send RemoteStopTransaction to a connected station. Returns the Call's unique id.
    pub async fn remote_stop_transaction(
        &self,
        charge_point_id: &str,
        transaction_id: i32,
    ) -> OcppResult<String> {
        let power: SharedPowerHandler = self.connections.clone();
        commands::remote_stop_transaction(&power, charge_point_id, transaction_id).await
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Call once at
/// process startup.
pub fn init_tracing(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChargePointSeed, LocationSeed};
    use crate::domain::OcppError;

    fn local_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.server.host = "127.0.0.1".into();
        config.server.port = 0;
        config.server.shutdown_timeout_secs = 2;
        config.locations.push(LocationSeed {
            id: "SITE".into(),
            name: "Depot".into(),
            default_power_limit: 32,
            power_limit: 300,
            charge_points: vec!["CP1".into()],
        });
        config.charge_points.push(ChargePointSeed {
            id: "CP1".into(),
            enabled: true,
            location_id: None,
            smart_charging: true,
        });
        config
    }

    #[tokio::test]
    async fn starts_seeded_and_shuts_down() {
        let handle = ServerHandle::start(local_config()).await.unwrap();
        assert_ne!(handle.local_addr.port(), 0);
        assert!(handle.store.charge_point("CP1").is_some());
        assert_eq!(
            handle.db.charge_point("CP1").unwrap().location_id.as_deref(),
            Some("SITE")
        );
        assert!(handle.is_running());

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn remote_commands_need_a_live_session() {
        let handle = ServerHandle::start(local_config()).await.unwrap();

        let err = handle
            .remote_start_transaction("CP1", "TAG-1", Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, OcppError::NotConnected(_)));
        let err = handle.remote_stop_transaction("CP1", 7).await.unwrap_err();
        assert!(matches!(err, OcppError::NotConnected(_)));

        handle.shutdown().await;
    }
}
