//! In-process notification broker
//!
//! `publish` only enqueues. A worker task drains the queue and hands every
//! event to each subscriber's bounded queue with `try_send`, so a slow
//! listener loses messages instead of holding up the others.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;

use crate::analysis::{ConsolidatedReport, ProjectHealth};

/// Per-subscriber queue length unless configured otherwise
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

/// Something listeners are told about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrokerEvent {
    /// An analysis run produced a report
    ReportGenerated {
        /// Overall verdict
        health: ProjectHealth,
        /// Overall summary sentence
        summary: String,
    },
    /// Free-text notice
    Notice {
        /// Text shown to listeners
        message: String,
    },
}

impl BrokerEvent {
    /// Event announcing `report`
    pub fn report_generated(report: &ConsolidatedReport) -> Self {
        Self::ReportGenerated {
            health: report.health(),
            summary: report.summary().to_string(),
        }
    }

    /// Free-text event
    pub fn notice(message: impl Into<String>) -> Self {
        Self::Notice {
            message: message.into(),
        }
    }

    /// JSON text frame sent to WebSocket listeners
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.to_string())
    }
}

impl fmt::Display for BrokerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReportGenerated { health, summary } => {
                write!(f, "New report generated: {} ({})", health, summary)
            }
            Self::Notice { message } => f.write_str(message),
        }
    }
}

type Subscribers = Arc<RwLock<HashMap<u64, mpsc::Sender<BrokerEvent>>>>;

/// Receiving end handed to one listener
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<BrokerEvent>,
}

impl Subscription {
    /// Identifier used with [`Broker::unsubscribe`]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, or `None` once the broker is gone
    pub async fn recv(&mut self) -> Option<BrokerEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<BrokerEvent> {
        self.rx.try_recv().ok()
    }
}

/// Fans events out to every current subscriber, at most once each
#[derive(Clone)]
pub struct Broker {
    subscribers: Subscribers,
    queue: mpsc::UnboundedSender<BrokerEvent>,
    next_id: Arc<AtomicU64>,
    capacity: usize,
}

impl Broker {
    /// Create a broker and spawn its delivery worker.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Like [`Broker::new`] with a custom per-subscriber queue length
    pub fn with_capacity(capacity: usize) -> Self {
        let subscribers: Subscribers = Arc::new(RwLock::new(HashMap::new()));
        let (queue, rx) = mpsc::unbounded_channel();
        tokio::spawn(deliver(rx, subscribers.clone()));

        Self {
            subscribers,
            queue,
            next_id: Arc::new(AtomicU64::new(1)),
            capacity: capacity.max(1),
        }
    }

    /// Registers a new listener
    pub async fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.write().await.insert(id, tx);
        debug!("Subscriber {} registered", id);
        Subscription { id, rx }
    }

    /// Removes a listener. Returns whether it was registered.
    pub async fn unsubscribe(&self, id: u64) -> bool {
        self.subscribers.write().await.remove(&id).is_some()
    }

    /// Queues `event` for every current subscriber. Never blocks.
    pub fn publish(&self, event: BrokerEvent) {
        if self.queue.send(event).is_err() {
            warn!("Notification worker has stopped, event dropped");
        }
    }

    /// Number of registered listeners
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

async fn deliver(mut rx: mpsc::UnboundedReceiver<BrokerEvent>, subscribers: Subscribers) {
    while let Some(event) = rx.recv().await {
        let mut closed = Vec::new();
        {
            let subscribers = subscribers.read().await;
            for (id, tx) in subscribers.iter() {
                match tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!("Subscriber {} is lagging, message dropped", id);
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = subscribers.write().await;
            for id in closed {
                subscribers.remove(&id);
                debug!("Subscriber {} disconnected", id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    async fn next(subscription: &mut Subscription) -> BrokerEvent {
        timeout(Duration::from_secs(1), subscription.recv())
            .await
            .expect("timed out waiting for event")
            .expect("broker closed")
    }

    #[tokio::test]
    async fn test_every_subscriber_gets_one_copy() {
        let broker = Broker::new();
        let mut subs = vec![
            broker.subscribe().await,
            broker.subscribe().await,
            broker.subscribe().await,
        ];
        assert_eq!(broker.subscriber_count().await, 3);

        broker.publish(BrokerEvent::notice("hello"));

        for sub in subs.iter_mut() {
            assert_eq!(next(sub).await, BrokerEvent::notice("hello"));
        }
        sleep(Duration::from_millis(20)).await;
        for sub in subs.iter_mut() {
            assert!(sub.try_recv().is_none());
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let broker = Broker::new();
        broker.publish(BrokerEvent::notice("nobody listens"));
        assert_eq!(broker.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_stall_others() {
        let broker = Broker::with_capacity(1);
        let mut slow = broker.subscribe().await;
        let mut fast = broker.subscribe().await;

        for i in 0..3 {
            broker.publish(BrokerEvent::notice(format!("event {}", i)));
            assert_eq!(next(&mut fast).await, BrokerEvent::notice(format!("event {}", i)));
        }

        assert_eq!(next(&mut slow).await, BrokerEvent::notice("event 0"));
        assert!(slow.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_removed() {
        let broker = Broker::new();
        let gone = broker.subscribe().await;
        let mut kept = broker.subscribe().await;
        drop(gone);

        broker.publish(BrokerEvent::notice("ping"));
        next(&mut kept).await;
        sleep(Duration::from_millis(20)).await;

        assert_eq!(broker.subscriber_count().await, 1);
    }

    #[test]
    fn test_frame_format() {
        let event = BrokerEvent::ReportGenerated {
            health: ProjectHealth::AtRisk,
            summary: "Architecture risk: High.".into(),
        };
        assert_eq!(
            event.to_frame(),
            r#"{"type":"report_generated","health":"At Risk","summary":"Architecture risk: High."}"#
        );
        assert_eq!(
            event.to_string(),
            "New report generated: At Risk (Architecture risk: High.)"
        );
    }
}
