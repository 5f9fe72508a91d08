//! SDA Worker Library
//!
//! The message-driven execution model shared by the ingestion workers: a
//! sequential loop that validates each delivery, runs a unit of work,
//! persists the resulting state, publishes the follow-on event and only then
//! acknowledges. [`CopyWorker`] and [`VerifyWorker`] are the two units of work.
//!
//! Shutdown: there is none. Losing the broker connection ends the process
//! (see [`watcher`]); unacknowledged deliveries are redelivered to the next
//! instance.

pub mod bootstrap;
pub mod broker;
pub mod copy;
pub mod error;
pub mod telemetry;
pub mod verify;
pub mod watcher;
pub mod worker;

pub use bootstrap::{run_worker, Resources};
pub use broker::{Acker, Broker, BrokerError, Delivery, DeliveryStream, Publication};
pub use copy::{CopiedFile, CopyWorker};
pub use error::{Disposition, WorkError};
pub use telemetry::init_telemetry;
pub use verify::VerifyWorker;
pub use watcher::watch_connection;
pub use worker::{Stage, UnitOfWork, WorkerLoop};
