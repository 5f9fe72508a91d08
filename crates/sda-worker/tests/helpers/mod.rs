//! Test helpers: in-memory collaborators for driving the worker loop.
//!
//! Run from workspace root: `cargo test -p sda-worker`.

#![allow(dead_code)]

pub mod broker;
pub mod fixtures;
pub mod repository;

pub use broker::{MemoryBroker, Resolution};
pub use repository::MemoryRepository;

use sda_core::BrokerSettings;

/// Broker routing used by every test loop.
pub fn settings(queue: &str, routing_key: &str) -> BrokerSettings {
    BrokerSettings {
        queue: queue.to_string(),
        exchange: "sda".to_string(),
        routing_key: routing_key.to_string(),
        routing_error: "error".to_string(),
        durable: true,
    }
}
