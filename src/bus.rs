//! Event bus between the gateway and the worker.
//!
//! The gateway only sees [`EventPublisher`]; the worker only sees a
//! [`Subscription`]. [`InMemoryBus`] is the in-process transport used by the
//! binary and the tests.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::BusConfig;
use crate::error::PublishError;

pub type MessageId = Uuid;

/// A raw webhook body in flight between the two stages.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub id: MessageId,
    pub topic: String,
    pub body: Bytes,
    pub published_at: DateTime<Utc>,
    /// 1 on first delivery, incremented on each redelivery.
    pub delivery_attempt: u32,
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Forward the payload verbatim. Delivery is promised only once this
    /// returns `Ok`.
    async fn publish(&self, body: Bytes) -> Result<MessageId, PublishError>;
}

pub struct InMemoryBus {
    topic: String,
    sender: mpsc::Sender<BusMessage>,
    receiver: Mutex<Option<mpsc::Receiver<BusMessage>>>,
    max_deliveries: u32,
}

impl InMemoryBus {
    pub fn new(topic: impl Into<String>, capacity: usize, max_deliveries: u32) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            topic: topic.into(),
            sender,
            receiver: Mutex::new(Some(receiver)),
            max_deliveries: max_deliveries.max(1),
        }
    }

    pub fn from_config(topic: impl Into<String>, config: &BusConfig) -> Self {
        Self::new(topic, config.capacity, config.max_deliveries)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Take the consuming end. There is exactly one; later calls get `None`.
    pub fn subscribe(&self) -> Option<Subscription> {
        let receiver = self.receiver.lock().ok()?.take()?;
        Some(Subscription {
            topic: self.topic.clone(),
            receiver,
            requeue: self.sender.downgrade(),
            max_deliveries: self.max_deliveries,
        })
    }
}

#[async_trait]
impl EventPublisher for InMemoryBus {
    async fn publish(&self, body: Bytes) -> Result<MessageId, PublishError> {
        let message = BusMessage {
            id: Uuid::now_v7(),
            topic: self.topic.clone(),
            body,
            published_at: Utc::now(),
            delivery_attempt: 1,
        };
        let id = message.id;

        // Never wait for room: the webhook caller has a request timeout.
        match self.sender.try_send(message) {
            Ok(()) => {
                debug!("Published message {} to topic '{}'", id, self.topic);
                Ok(id)
            }
            Err(TrySendError::Full(_)) => Err(PublishError::Full(self.topic.clone())),
            Err(TrySendError::Closed(_)) => Err(PublishError::Closed(self.topic.clone())),
        }
    }
}

/// Consuming end of an [`InMemoryBus`].
///
/// Holds only a weak handle for redelivery so the queue closes once every
/// publisher is gone.
pub struct Subscription {
    topic: String,
    receiver: mpsc::Receiver<BusMessage>,
    requeue: mpsc::WeakSender<BusMessage>,
    max_deliveries: u32,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next message, or `None` once all publishers are dropped and the queue
    /// is drained.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.receiver.recv().await
    }

    /// Put a message back for another attempt. Returns `false` when it was
    /// dropped instead (attempts exhausted, queue closed or full).
    pub fn redeliver(&self, message: BusMessage) -> bool {
        if message.delivery_attempt >= self.max_deliveries {
            error!(
                "Message {} dropped after {} delivery attempts",
                message.id, message.delivery_attempt
            );
            return false;
        }

        let Some(sender) = self.requeue.upgrade() else {
            warn!(
                "Topic '{}' closed; message {} not redelivered",
                self.topic, message.id
            );
            return false;
        };

        let id = message.id;
        let next = BusMessage {
            delivery_attempt: message.delivery_attempt + 1,
            ..message
        };
        match sender.try_send(next) {
            Ok(()) => {
                debug!("Message {} queued for redelivery", id);
                true
            }
            Err(e) => {
                error!("Failed to redeliver message {}: {}", id, e);
                false
            }
        }
    }
}
