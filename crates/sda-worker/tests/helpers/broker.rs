use async_trait::async_trait;
use sda_worker::{Acker, Broker, BrokerError, Delivery, DeliveryStream, Publication};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// How a delivery was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Ack,
    Nack { requeue: bool },
}

struct MemoryAcker {
    correlation_id: String,
    resolutions: Arc<Mutex<Vec<(String, Resolution)>>>,
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        self.resolutions
            .lock()
            .unwrap()
            .push((self.correlation_id.clone(), Resolution::Ack));
        Ok(())
    }

    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), BrokerError> {
        self.resolutions
            .lock()
            .unwrap()
            .push((self.correlation_id.clone(), Resolution::Nack { requeue }));
        Ok(())
    }
}

/// Broker that records publications and resolutions.
#[derive(Default)]
pub struct MemoryBroker {
    published: Mutex<Vec<Publication>>,
    resolutions: Arc<Mutex<Vec<(String, Resolution)>>>,
    pending: Mutex<Vec<Delivery>>,
    fail_publish: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A delivery whose resolution is recorded by this broker.
    pub fn delivery(&self, correlation_id: &str, body: impl Into<Vec<u8>>) -> Delivery {
        let body: Vec<u8> = body.into();
        Delivery::new(
            correlation_id,
            body,
            Box::new(MemoryAcker {
                correlation_id: correlation_id.to_string(),
                resolutions: self.resolutions.clone(),
            }),
        )
    }

    /// Queue a delivery for the next `consume` call.
    pub fn enqueue(&self, correlation_id: &str, body: impl Into<Vec<u8>>) {
        let delivery = self.delivery(correlation_id, body);
        self.pending.lock().unwrap().push(delivery);
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn publications(&self) -> Vec<Publication> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_to(&self, routing_key: &str) -> Vec<Publication> {
        self.publications()
            .into_iter()
            .filter(|p| p.routing_key == routing_key)
            .collect()
    }

    pub fn resolutions(&self) -> Vec<(String, Resolution)> {
        self.resolutions.lock().unwrap().clone()
    }

    pub fn count(&self, resolution: Resolution) -> usize {
        self.resolutions()
            .iter()
            .filter(|(_, r)| *r == resolution)
            .count()
    }

    pub fn acks(&self) -> usize {
        self.count(Resolution::Ack)
    }

    pub fn requeues(&self) -> usize {
        self.count(Resolution::Nack { requeue: true })
    }

    pub fn rejects(&self) -> usize {
        self.count(Resolution::Nack { requeue: false })
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn consume(&self, _queue: &str) -> Result<DeliveryStream, BrokerError> {
        let deliveries: Vec<_> = self
            .pending
            .lock()
            .unwrap()
            .drain(..)
            .map(Ok::<_, BrokerError>)
            .collect();
        Ok(Box::pin(futures::stream::iter(deliveries)))
    }

    async fn publish(&self, publication: Publication) -> Result<(), BrokerError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BrokerError::Unconfirmed(format!(
                "nack from broker for {}",
                publication.correlation_id
            )));
        }
        self.published.lock().unwrap().push(publication);
        Ok(())
    }

    async fn closed(&self) -> BrokerError {
        futures::future::pending::<()>().await;
        BrokerError::ConnectionLost("unreachable".to_string())
    }
}
