//! Event bus broadcasting domain events to subscribers
//!
//! [`EventBus`] is the default [`EventHandler`]: every callback is turned into
//! an [`Event`] and published on a broadcast channel.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::types::{
    AuthorizationEvent, ConnectorStatusChangedEvent, Event, EventMessage,
    TransactionStartedEvent, TransactionStoppedEvent,
};
use crate::domain::{ConnectorStatus, EventHandler, Transaction};

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventMessage>,
    subscriber_count: Arc<AtomicUsize>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscriber_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn publish(&self, event: Event) {
        let message = EventMessage::new(event);
        let event_type = message.event.event_type();
        let charge_point_id = message.event.charge_point_id().to_string();

        match self.sender.send(message) {
            Ok(count) => debug!(
                event_type,
                charge_point_id = charge_point_id.as_str(),
                subscribers = count,
                "Event published"
            ),
            Err(_) => debug!(
                event_type,
                charge_point_id = charge_point_id.as_str(),
                "Event published (no subscribers)"
            ),
        }
    }

    pub fn subscribe(&self) -> EventSubscriber {
        let receiver = self.sender.subscribe();
        let total = self.subscriber_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!(total, "New event subscriber");

        EventSubscriber {
            receiver,
            subscriber_count: self.subscriber_count.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventHandler for EventBus {
    async fn on_status_notification(
        &self,
        charge_point_id: &str,
        connector_id: u32,
        status: ConnectorStatus,
        error_code: &str,
        info: Option<&str>,
    ) {
        self.publish(Event::ConnectorStatusChanged(ConnectorStatusChangedEvent {
            charge_point_id: charge_point_id.to_string(),
            connector_id,
            status: status.to_string(),
            error_code: error_code.to_string(),
            info: info.map(String::from),
        }));
    }

    async fn on_transaction_start(&self, transaction: &Transaction) {
        self.publish(Event::TransactionStarted(TransactionStartedEvent::from(
            transaction,
        )));
    }

    async fn on_transaction_stop(&self, transaction: &Transaction) {
        self.publish(Event::TransactionStopped(TransactionStoppedEvent::from(
            transaction,
        )));
    }

    async fn on_authorize(&self, charge_point_id: &str, id_tag: &str, status: &str) {
        self.publish(Event::AuthorizationResult(AuthorizationEvent {
            charge_point_id: charge_point_id.to_string(),
            id_tag: id_tag.to_string(),
            status: status.to_string(),
        }));
    }
}

pub struct EventSubscriber {
    receiver: broadcast::Receiver<EventMessage>,
    subscriber_count: Arc<AtomicUsize>,
}

impl EventSubscriber {
    pub async fn recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(missed = count, "Subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

impl Drop for EventSubscriber {
    fn drop(&mut self) {
        let prev = self.subscriber_count.fetch_sub(1, Ordering::SeqCst);
        debug!(remaining = prev.saturating_sub(1), "Event subscriber dropped");
    }
}

pub type SharedEventBus = Arc<EventBus>;

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[tokio::test]
    async fn status_notification_is_published() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        bus.on_status_notification("CP1", 2, ConnectorStatus::Charging, "NoError", None)
            .await;

        let msg = sub.recv().await.unwrap();
        match msg.event {
            Event::ConnectorStatusChanged(e) => {
                assert_eq!(e.charge_point_id, "CP1");
                assert_eq!(e.connector_id, 2);
                assert_eq!(e.status, "Charging");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn stop_event_carries_energy() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        let mut tx = Transaction::new(9, "CP1", 1, "TAG", 1000, Utc::now());
        tx.finish(3500, Utc::now(), Some("Local".into()));
        bus.on_transaction_stop(&tx).await;

        match sub.try_recv().unwrap().event {
            Event::TransactionStopped(e) => {
                assert_eq!(e.transaction_id, 9);
                assert_eq!(e.energy_consumed_wh, 2500);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn subscriber_count_tracks_drops() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let _b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        drop(a);
        assert_eq!(bus.subscriber_count(), 1);
    }
}
