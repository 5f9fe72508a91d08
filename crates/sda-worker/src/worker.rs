//! The worker loop
//!
//! Per delivery, strictly one at a time:
//!
//! ```text
//! received -> validated -> processed -> persisted -> published -> acknowledged
//!     \____________\___ rejected
//! ```
//!
//! A failure at any step stops the sequence and resolves the delivery as the
//! error's [`Disposition`] says. Nothing is acknowledged before the follow-on
//! event is confirmed, so a crash anywhere leaves the message redeliverable.

use async_trait::async_trait;
use futures::StreamExt;
use sda_core::{validate_message, BrokerSettings, ErrorEvent, Schema, WorkMessage};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use validator::Validate;

use crate::broker::{Broker, BrokerError, Delivery, Publication};
use crate::error::{Disposition, WorkError};

/// Where a delivery's handling ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    Validated,
    Processed,
    Persisted,
    Published,
    Acknowledged,
    Rejected,
}

/// The worker-specific step of the loop.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    type Message: DeserializeOwned + Validate + WorkMessage + Send + Sync;
    type Output: Send + Sync;

    /// Schema inbound messages are validated against.
    const INBOUND: Schema;
    /// Worker name for logs.
    const NAME: &'static str;

    /// Do the work. `None` means the message is fully handled and nothing is
    /// persisted or published for it.
    async fn process(&self, message: &Self::Message) -> Result<Option<Self::Output>, WorkError>;

    /// Validated body of the follow-on event.
    fn completion(&self, message: &Self::Message, output: &Self::Output)
        -> Result<Vec<u8>, WorkError>;

    /// Record the state transition. Must be idempotent.
    async fn persist(&self, message: &Self::Message, output: &Self::Output)
        -> Result<(), WorkError>;
}

pub struct WorkerLoop<U> {
    unit: U,
    broker: Arc<dyn Broker>,
    settings: BrokerSettings,
}

impl<U: UnitOfWork> WorkerLoop<U> {
    pub fn new(unit: U, broker: Arc<dyn Broker>, settings: BrokerSettings) -> Self {
        Self {
            unit,
            broker,
            settings,
        }
    }

    /// Consume the configured queue until the subscription ends.
    pub async fn run(&self) -> Result<(), BrokerError> {
        let mut deliveries = self.broker.consume(&self.settings.queue).await?;

        tracing::info!(
            worker = U::NAME,
            queue = %self.settings.queue,
            "Worker started"
        );

        while let Some(delivery) = deliveries.next().await {
            self.handle_delivery(delivery?).await;
        }

        Err(BrokerError::ConnectionLost(format!(
            "subscription to {} ended",
            self.settings.queue
        )))
    }

    /// Handle one delivery to completion and return the stage it ended in.
    ///
    /// The delivery is always resolved (acked or nacked) before this returns.
    pub async fn handle_delivery(&self, delivery: Delivery) -> Stage {
        let span = tracing::info_span!(
            "delivery",
            worker = U::NAME,
            correlation_id = %delivery.correlation_id
        );
        self.handle(delivery).instrument(span).await
    }

    async fn handle(&self, delivery: Delivery) -> Stage {
        let started = Instant::now();
        tracing::debug!(body_len = delivery.body.len(), "Received a message");

        let message: U::Message = match validate_message(U::INBOUND, &delivery.body) {
            Ok(message) => message,
            Err(e) => {
                let error = WorkError::from(e);
                return self.fail(delivery, None, error, Stage::Received).await;
            }
        };

        tracing::info!(
            user = %message.user(),
            filepath = %message.filepath(),
            accession_id = message.accession_id(),
            "Received work"
        );

        let mut stage = Stage::Validated;
        if let Err(error) = self.execute(&message, &delivery.correlation_id, &mut stage).await {
            return self.fail(delivery, Some(&message), error, stage).await;
        }

        let correlation_id = delivery.correlation_id.clone();
        if let Err(e) = delivery.ack().await {
            tracing::error!(
                error = %e,
                correlation_id = %correlation_id,
                user = %message.user(),
                filepath = %message.filepath(),
                "Failed to ack message after work completed"
            );
        }

        tracing::info!(
            user = %message.user(),
            filepath = %message.filepath(),
            accession_id = message.accession_id(),
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Work completed"
        );

        Stage::Acknowledged
    }

    async fn execute(
        &self,
        message: &U::Message,
        correlation_id: &str,
        stage: &mut Stage,
    ) -> Result<(), WorkError> {
        let Some(output) = self.unit.process(message).await? else {
            return Ok(());
        };
        let body = self.unit.completion(message, &output)?;
        *stage = Stage::Processed;

        self.unit.persist(message, &output).await?;
        *stage = Stage::Persisted;

        self.broker
            .publish(Publication {
                correlation_id: correlation_id.to_string(),
                exchange: self.settings.exchange.clone(),
                routing_key: self.settings.routing_key.clone(),
                durable: self.settings.durable,
                body: body.into(),
            })
            .await
            .map_err(|e| WorkError::Publish(e.to_string()))?;
        *stage = Stage::Published;

        Ok(())
    }

    async fn fail(
        &self,
        delivery: Delivery,
        message: Option<&U::Message>,
        error: WorkError,
        reached: Stage,
    ) -> Stage {
        let user = message.map(|m| m.user());
        let filepath = message.map(|m| m.filepath());
        let accession_id = message.and_then(|m| m.accession_id());

        match error.disposition() {
            Disposition::Requeue => {
                tracing::error!(
                    error = %error,
                    kind = error.kind(),
                    stage = ?reached,
                    user,
                    filepath,
                    accession_id,
                    "Work failed, requeueing message"
                );
                if let Err(e) = delivery.nack(true).await {
                    tracing::error!(error = %e, "Failed to nack message");
                }
                reached
            }
            Disposition::Reject { report } => {
                tracing::error!(
                    error = %error,
                    kind = error.kind(),
                    stage = ?reached,
                    user,
                    filepath,
                    accession_id,
                    "Work failed, rejecting message"
                );
                if report {
                    let mut event = ErrorEvent::new(error.to_string(), &delivery.body);
                    if let Some(message) = message {
                        event = event.with_message(message);
                    }
                    self.report(&delivery.correlation_id, &event).await;
                }
                if let Err(e) = delivery.nack(false).await {
                    tracing::error!(error = %e, "Failed to nack message");
                }
                Stage::Rejected
            }
        }
    }

    /// Best-effort publish of a diagnostic event to the error routing key.
    async fn report(&self, correlation_id: &str, event: &ErrorEvent) {
        let body = match serde_json::to_vec(event) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode error event");
                return;
            }
        };

        let publication = Publication {
            correlation_id: correlation_id.to_string(),
            exchange: self.settings.exchange.clone(),
            routing_key: self.settings.routing_error.clone(),
            durable: self.settings.durable,
            body: body.into(),
        };

        if let Err(e) = self.broker.publish(publication).await {
            tracing::error!(error = %e, "Failed to publish error event");
        }
    }
}
