//! Message-bus plumbing for hearth.
//!
//! Devices live behind a publish/subscribe bus with hierarchical topics
//! rooted at a toplevel segment (mqtt-smarthome convention). This crate
//! provides the low-level [`BusClient`] contract with an MQTT
//! implementation, a [`DeviceRegistry`] of last observed values, and the
//! [`BusAdapter`] the evaluator drives: wildcard `set` fan-out, cached
//! `get`, and value-filtered `when` subscriptions.

pub mod adapter;
pub mod cancel;
pub mod client;
pub mod memory;
pub mod mqtt;
pub mod registry;
pub mod topic;
pub mod value;

pub use adapter::{BusAdapter, WhenCallback};
pub use cancel::{CancelHandle, CancelSignal};
pub use client::{BusClient, BusError, BusResult, StatusMessage, Subscription, GET_TIMEOUT};
pub use memory::{MemoryClient, SetRecord};
pub use mqtt::MqttClient;
pub use registry::{DeviceId, DeviceRegistry};
pub use value::Value;
