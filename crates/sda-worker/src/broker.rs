//! Broker contract
//!
//! The workers only need a small slice of a message broker: a subscription
//! yielding deliveries, confirmed publishing, per-delivery ack/nack, and a
//! signal when the connection goes away. A concrete client implements
//! [`Broker`] and [`Acker`].

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("publish was not confirmed: {0}")]
    Unconfirmed(String),

    #[error("acknowledgement failed: {0}")]
    Acknowledge(String),

    #[error("connection lost: {0}")]
    ConnectionLost(String),
}

/// Resolves one delivery with the broker.
#[async_trait]
pub trait Acker: Send {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError>;
    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), BrokerError>;
}

/// One inbound message instance.
///
/// `ack` and `nack` consume the delivery, so it is resolved at most once; the
/// worker loop resolves every delivery it receives before taking the next.
pub struct Delivery {
    pub correlation_id: String,
    pub body: Bytes,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(
        correlation_id: impl Into<String>,
        body: impl Into<Bytes>,
        acker: Box<dyn Acker>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            body: body.into(),
            acker,
        }
    }

    pub async fn ack(self) -> Result<(), BrokerError> {
        self.acker.ack().await
    }

    pub async fn nack(self, requeue: bool) -> Result<(), BrokerError> {
        self.acker.nack(requeue).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("correlation_id", &self.correlation_id)
            .field("body_len", &self.body.len())
            .finish_non_exhaustive()
    }
}

pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, BrokerError>> + Send>>;

/// An outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub correlation_id: String,
    pub exchange: String,
    pub routing_key: String,
    pub durable: bool,
    pub body: Bytes,
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Subscribe to `queue`.
    async fn consume(&self, queue: &str) -> Result<DeliveryStream, BrokerError>;

    /// Publish a message. Resolves once the broker has confirmed it.
    async fn publish(&self, publication: Publication) -> Result<(), BrokerError>;

    /// Resolves when the connection to the broker is lost.
    async fn closed(&self) -> BrokerError;
}
