//! The bus client contract consumed by the runtime.
//!
//! A client exposes fire-and-forget writes, request/response reads with a
//! timeout, opaque commands, and status subscriptions. Implementations:
//! [`crate::mqtt::MqttClient`] for a live broker and
//! [`crate::memory::MemoryClient`] for in-process tests.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::value::Value;

/// How long a live `get` waits for a status reply.
pub const GET_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Capacity of a subscription channel; overflow is dropped non-blockingly.
pub const SUBSCRIPTION_CAPACITY: usize = 64;

/// Bus errors.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("timed out waiting for get response")]
    GetTimeout,

    #[error("bus client closed")]
    Closed,

    #[error("invalid device pattern {0:?}")]
    Pattern(String),

    #[error("mqtt error: {0}")]
    Mqtt(String),
}

pub type BusResult<T> = Result<T, BusError>;

/// A status event observed on the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub toplevel: String,
    pub item: String,
    pub value: Value,
}

/// Low-level pub/sub client.
///
/// `toplevel` and `item` may carry MQTT wildcards (`+`, `#`) for
/// `subscribe`; the other operations address one device.
#[async_trait]
pub trait BusClient: Send + Sync {
    /// Publish a set message. Resolves once the publish is handed to the
    /// underlying transport.
    async fn set(&self, toplevel: &str, item: &str, value: &str) -> BusResult<()>;

    /// Publish a get request and wait for the first status reply, up to
    /// [`GET_TIMEOUT`].
    async fn get(&self, toplevel: &str, item: &str) -> BusResult<Value>;

    /// Publish an opaque command to the toplevel's command topic.
    async fn command(&self, toplevel: &str, cmd: &[u8]) -> BusResult<()>;

    /// Receive status events for the matching devices until unsubscribed.
    async fn subscribe(&self, toplevel: &str, item: &str) -> BusResult<Subscription>;

    /// Disconnect. Idempotent.
    async fn close(&self) -> BusResult<()>;
}

/// A live status subscription. Unsubscribes when dropped.
pub struct Subscription {
    rx: mpsc::Receiver<StatusMessage>,
    unsub: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        rx: mpsc::Receiver<StatusMessage>,
        unsub: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            rx,
            unsub: Some(Box::new(unsub)),
        }
    }

    /// The next status event, or `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<StatusMessage> {
        self.rx.recv().await
    }

    pub fn unsubscribe(mut self) {
        if let Some(unsub) = self.unsub.take() {
            unsub();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsub) = self.unsub.take() {
            unsub();
        }
    }
}
