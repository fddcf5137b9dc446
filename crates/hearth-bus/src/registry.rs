//! Device registry: last observed value per device.
//!
//! Populated by a single subscription to every status message. Read by
//! cached `get` and by wildcard `set` expansion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use regex::Regex;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::client::{BusClient, BusResult};
use crate::value::Value;

/// Identifies a device: the toplevel group and the item path below it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub toplevel: String,
    pub item: String,
}

/// Tracks the last observed value of every device seen on the bus.
pub struct DeviceRegistry {
    devices: Arc<DashMap<DeviceId, Value>>,
    closing: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl DeviceRegistry {
    /// Subscribe to all status messages and start tracking.
    pub async fn new(client: &dyn BusClient) -> BusResult<Self> {
        let mut sub = client.subscribe("+", "#").await?;
        let devices: Arc<DashMap<DeviceId, Value>> = Arc::new(DashMap::new());
        let (closing, mut closing_rx) = watch::channel(false);

        let task_devices = devices.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = async {
                        while !*closing_rx.borrow() {
                            if closing_rx.changed().await.is_err() {
                                break;
                            }
                        }
                    } => break,
                    message = sub.recv() => {
                        let Some(message) = message else { break };
                        trace!(
                            toplevel = %message.toplevel,
                            item = %message.item,
                            "registry observed status"
                        );
                        task_devices.insert(
                            DeviceId {
                                toplevel: message.toplevel,
                                item: message.item,
                            },
                            message.value,
                        );
                    }
                }
            }
            debug!("device registry stopped");
        });

        Ok(Self {
            devices,
            closing,
            task: Mutex::new(Some(task)),
            closed: AtomicBool::new(false),
        })
    }

    /// The last observed value for a device, if any.
    pub fn get(&self, toplevel: &str, item: &str) -> Option<Value> {
        self.devices
            .get(&DeviceId {
                toplevel: toplevel.to_string(),
                item: item.to_string(),
            })
            .map(|v| v.clone())
    }

    /// Every known device under `toplevel` whose item matches the regex.
    pub fn find(&self, toplevel: &str, item_match: &Regex) -> Vec<(DeviceId, Value)> {
        self.devices
            .iter()
            .filter(|entry| entry.key().toplevel == toplevel && item_match.is_match(&entry.key().item))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Stop the tracking task. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.closing.send(true);
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
    }
}
