//! An in-process bus for tests.
//!
//! Records every `set` and `command`, answers `get` from a scripted table
//! (a missing entry times out immediately), and routes injected status
//! messages to subscriptions by MQTT filter match.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::trace;

use crate::client::{
    BusClient, BusError, BusResult, StatusMessage, Subscription, SUBSCRIPTION_CAPACITY,
};
use crate::topic::{filter_matches, status_topic};
use crate::value::Value;

/// A recorded `set` call.
#[derive(Debug, Clone, PartialEq)]
pub struct SetRecord {
    pub toplevel: String,
    pub item: String,
    pub value: String,
}

/// In-process [`BusClient`] used by unit and integration tests.
#[derive(Clone, Default)]
pub struct MemoryClient {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    sets: Mutex<Vec<SetRecord>>,
    commands: Mutex<Vec<(String, Vec<u8>)>>,
    get_responses: DashMap<(String, String), Value>,
    subs: DashMap<u64, SubEntry>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

struct SubEntry {
    filter: String,
    tx: mpsc::Sender<StatusMessage>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the reply for a future `get` on this device.
    pub fn respond_to_get(&self, toplevel: &str, item: &str, value: Value) {
        self.inner
            .get_responses
            .insert((toplevel.to_string(), item.to_string()), value);
    }

    /// Inject a status event, fanning it out to matching subscriptions.
    pub fn publish_status(&self, toplevel: &str, item: &str, value: Value) {
        let topic = status_topic(toplevel, item);
        let message = StatusMessage {
            toplevel: toplevel.to_string(),
            item: item.to_string(),
            value,
        };
        for entry in self.inner.subs.iter() {
            if filter_matches(&entry.filter, &topic) {
                // Overflow is dropped, matching the live client.
                let _ = entry.tx.try_send(message.clone());
            }
        }
    }

    /// Every `set` issued so far, in order.
    pub fn sets(&self) -> Vec<SetRecord> {
        self.inner.sets.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<(String, Vec<u8>)> {
        self.inner.commands.lock().unwrap().clone()
    }

    fn check_open(&self) -> BusResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl BusClient for MemoryClient {
    async fn set(&self, toplevel: &str, item: &str, value: &str) -> BusResult<()> {
        self.check_open()?;
        trace!(toplevel, item, value, "memory set");
        self.inner.sets.lock().unwrap().push(SetRecord {
            toplevel: toplevel.to_string(),
            item: item.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn get(&self, toplevel: &str, item: &str) -> BusResult<Value> {
        self.check_open()?;
        self.inner
            .get_responses
            .get(&(toplevel.to_string(), item.to_string()))
            .map(|v| v.clone())
            .ok_or(BusError::GetTimeout)
    }

    async fn command(&self, toplevel: &str, cmd: &[u8]) -> BusResult<()> {
        self.check_open()?;
        self.inner
            .commands
            .lock()
            .unwrap()
            .push((toplevel.to_string(), cmd.to_vec()));
        Ok(())
    }

    async fn subscribe(&self, toplevel: &str, item: &str) -> BusResult<Subscription> {
        self.check_open()?;
        let filter = status_topic(toplevel, item);
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.subs.insert(id, SubEntry { filter, tx });
        let inner = self.inner.clone();
        Ok(Subscription::new(rx, move || {
            inner.subs.remove(&id);
        }))
    }

    async fn close(&self) -> BusResult<()> {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.subs.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_is_recorded() {
        let client = MemoryClient::new();
        client.set("a", "b", "on").await.unwrap();
        assert_eq!(
            client.sets(),
            vec![SetRecord {
                toplevel: "a".to_string(),
                item: "b".to_string(),
                value: "on".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_get_times_out_without_response() {
        let client = MemoryClient::new();
        assert!(matches!(
            client.get("a", "b").await,
            Err(BusError::GetTimeout)
        ));
    }

    #[tokio::test]
    async fn test_subscription_receives_matching_status() {
        let client = MemoryClient::new();
        let mut sub = client.subscribe("a", "b").await.unwrap();
        client.publish_status("a", "b", Value::new("on"));
        client.publish_status("a", "other", Value::new("off"));
        let msg = sub.recv().await.unwrap();
        assert_eq!(msg.item, "b");
        assert_eq!(msg.value.coerce_str(), "on");
    }

    #[tokio::test]
    async fn test_wildcard_subscription() {
        let client = MemoryClient::new();
        let mut sub = client.subscribe("+", "#").await.unwrap();
        client.publish_status("house", "room1/light", Value::new("on"));
        let msg = sub.recv().await.unwrap();
        assert_eq!(msg.toplevel, "house");
        assert_eq!(msg.item, "room1/light");
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let client = MemoryClient::new();
        let sub = client.subscribe("a", "b").await.unwrap();
        sub.unsubscribe();
        client.publish_status("a", "b", Value::new("on"));
        assert!(client.inner.subs.is_empty());
    }
}
