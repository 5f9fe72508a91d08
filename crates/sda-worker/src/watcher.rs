//! Broker connection supervision.
//!
//! Losing the broker connection is fatal: the process exits and relies on its
//! supervisor to restart it. In-flight deliveries are never acknowledged and
//! will be redelivered.

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::broker::Broker;

/// Exit status used when the broker connection is lost.
pub const CONNECTION_LOST_EXIT_CODE: i32 = 1;

/// Spawn a task that terminates the process once `broker` reports the
/// connection closed.
pub fn watch_connection(broker: Arc<dyn Broker>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let error = broker.closed().await;
        tracing::error!(error = %error, "Broker connection lost, exiting");
        std::process::exit(CONNECTION_LOST_EXIT_CODE);
    })
}
