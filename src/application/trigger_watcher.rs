//! Periodic MeterValues polling for open transactions
//!
//! Handlers register and unregister transactions through a [`TriggerHandle`].
//! The commands are queued on one channel and applied by the watcher loop,
//! which is the only owner of the watch list. On every tick the loop sends
//! `TriggerMessage(MeterValues)` for each watched connector.

use std::collections::BTreeMap;
use std::time::Duration;

use rust_ocpp::v1_6::messages::trigger_message::TriggerMessageRequest;
use rust_ocpp::v1_6::types::MessageTrigger;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::application::ocpp::OutgoingRequest;
use crate::application::ports::SharedPowerHandler;
use crate::support::shutdown::ShutdownSignal;

pub const DEFAULT_TRIGGER_INTERVAL: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedTransaction {
    pub transaction_id: i32,
    pub charge_point_id: String,
    pub connector_id: u32,
}

#[derive(Debug)]
enum WatchCommand {
    Register(WatchedTransaction),
    Unregister(i32),
}

/// Transactions currently polled, keyed by transaction id.
#[derive(Debug, Default)]
pub struct WatchList {
    entries: BTreeMap<i32, WatchedTransaction>,
}

impl WatchList {
    /// Returns `false` if the transaction was already registered.
    pub fn register(&mut self, entry: WatchedTransaction) -> bool {
        if self.entries.contains_key(&entry.transaction_id) {
            return false;
        }
        self.entries.insert(entry.transaction_id, entry);
        true
    }

    /// Returns `false` if the transaction was not registered.
    pub fn unregister(&mut self, transaction_id: i32) -> bool {
        self.entries.remove(&transaction_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WatchedTransaction> {
        self.entries.values()
    }
}

/// Cloneable sender side of the watcher queue.
#[derive(Clone)]
pub struct TriggerHandle {
    commands: mpsc::UnboundedSender<WatchCommand>,
}

impl TriggerHandle {
    pub fn register(&self, charge_point_id: &str, connector_id: u32, transaction_id: i32) {
        self.send(WatchCommand::Register(WatchedTransaction {
            transaction_id,
            charge_point_id: charge_point_id.to_string(),
            connector_id,
        }));
    }

    pub fn unregister(&self, transaction_id: i32) {
        self.send(WatchCommand::Unregister(transaction_id));
    }

    fn send(&self, command: WatchCommand) {
        if self.commands.send(command).is_err() {
            debug!("Trigger watcher stopped, command dropped");
        }
    }
}

pub struct TriggerWatcher {
    commands: mpsc::UnboundedReceiver<WatchCommand>,
    watch_list: WatchList,
    power: SharedPowerHandler,
    period: Duration,
}

/// Create a watcher and the handle used to feed it.
pub fn trigger_watcher(power: SharedPowerHandler, period: Duration) -> (TriggerHandle, TriggerWatcher) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        TriggerHandle { commands: tx },
        TriggerWatcher {
            commands: rx,
            watch_list: WatchList::default(),
            power,
            period,
        },
    )
}

impl TriggerWatcher {
    pub fn watch_list(&self) -> &WatchList {
        &self.watch_list
    }

    /// Run until `shutdown` fires.
    pub async fn run(mut self, shutdown: ShutdownSignal) {
        info!(interval_secs = self.period.as_secs(), "Trigger watcher started");

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(command) = self.commands.recv() => self.apply(command),
                _ = ticker.tick() => {
                    self.drain_pending();
                    self.tick().await;
                }
                _ = shutdown.wait() => {
                    info!(watched = self.watch_list.len(), "Trigger watcher stopped");
                    return;
                }
            }
        }
    }

    fn apply(&mut self, command: WatchCommand) {
        match command {
            WatchCommand::Register(entry) => {
                let transaction_id = entry.transaction_id;
                if self.watch_list.register(entry) {
                    debug!(transaction_id, "Watching transaction");
                }
            }
            WatchCommand::Unregister(transaction_id) => {
                if self.watch_list.unregister(transaction_id) {
                    debug!(transaction_id, "Stopped watching transaction");
                }
            }
        }
    }

    /// Apply every queued command without waiting.
    pub fn drain_pending(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }
    }

    /// Send one round of MeterValues triggers.
    pub async fn tick(&self) {
        for entry in self.watch_list.iter() {
            let request = OutgoingRequest::TriggerMessage(TriggerMessageRequest {
                requested_message: MessageTrigger::MeterValues,
                connector_id: Some(entry.connector_id),
            });
            if let Err(e) = self.power.send_request(&entry.charge_point_id, request).await {
                warn!(
                    charge_point_id = entry.charge_point_id.as_str(),
                    connector_id = entry.connector_id,
                    transaction_id = entry.transaction_id,
                    error = %e,
                    "MeterValues trigger not sent"
                );
            }
        }
    }
}
