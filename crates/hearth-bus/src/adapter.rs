//! High-level bus operations: wildcard fan-out, cached reads, and
//! value-filtered subscriptions.
//!
//! Wildcards are honoured only by `set`; `get` and `when` address one
//! device literally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use regex::Regex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::cancel::CancelHandle;
use crate::client::{BusClient, BusError, BusResult};
use crate::registry::DeviceRegistry;
use crate::value::Value;

/// Async callback invoked for each matching status event.
pub type WhenCallback = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Adapter over a [`BusClient`] adding a device registry and the `set` /
/// `get` / `when` operations the evaluator needs.
pub struct BusAdapter {
    client: Arc<dyn BusClient>,
    registry: DeviceRegistry,
    closing: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl BusAdapter {
    pub async fn new(client: Arc<dyn BusClient>) -> BusResult<Self> {
        let registry = DeviceRegistry::new(client.as_ref()).await?;
        let (closing, _) = watch::channel(false);
        Ok(Self {
            client,
            registry,
            closing,
            tasks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Write a value. A device path containing `*` or `**` fans out to
    /// every registry-known device matching the pattern under `toplevel`;
    /// the last error is returned and earlier successes are not rolled
    /// back.
    pub async fn set(&self, toplevel: &str, device: &str, value: &str) -> BusResult<()> {
        if !contains_wildcard(device) {
            return self.client.set(toplevel, device, value).await;
        }
        let pattern = pattern_to_regex(device)?;
        let matches = self.registry.find(toplevel, &pattern);
        debug!(toplevel, device, count = matches.len(), "wildcard set");
        let mut last_err = None;
        for (id, _) in matches {
            if let Err(err) = self.client.set(toplevel, &id.item, value).await {
                last_err = Some(err);
            }
        }
        match last_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Read a device value: the registry's cached value if present,
    /// otherwise a live get.
    pub async fn get(&self, toplevel: &str, device: &str) -> BusResult<Value> {
        if let Some(value) = self.registry.get(toplevel, device) {
            return Ok(value);
        }
        self.client.get(toplevel, device).await
    }

    /// Invoke `callback` for every status event on the device whose value
    /// equals `expected` by string comparison. The returned handle stops
    /// future callbacks; one already entered runs to completion.
    pub async fn when(
        &self,
        toplevel: &str,
        device: &str,
        expected: &str,
        callback: WhenCallback,
    ) -> BusResult<CancelHandle> {
        let mut sub = self.client.subscribe(toplevel, device).await?;
        let (handle, mut signal) = CancelHandle::new();
        let mut closing_rx = self.closing.subscribe();
        let expected = expected.to_string();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = signal.cancelled() => break,
                    _ = async {
                        while !*closing_rx.borrow() {
                            if closing_rx.changed().await.is_err() {
                                break;
                            }
                        }
                    } => break,
                    message = sub.recv() => {
                        let Some(message) = message else { break };
                        let observed = message.value.coerce_str();
                        if observed == expected {
                            trace!(item = %message.item, value = %observed, "when matched");
                            callback().await;
                        }
                    }
                }
            }
        });

        let mut tasks = self.tasks.lock().unwrap();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
        Ok(handle)
    }

    /// Stop every subscription task and the registry, then close the
    /// underlying client. Idempotent.
    pub async fn close(&self) -> BusResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _ = self.closing.send(true);
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
        for task in tasks {
            let _ = task.await;
        }
        self.registry.close().await;
        self.client.close().await
    }
}

fn contains_wildcard(device: &str) -> bool {
    device.split('/').any(|segment| segment == "*" || segment == "**")
}

/// Translate a device pattern into an anchored regex: `*` matches one
/// segment, `**` matches any remainder, literal segments are quoted.
fn pattern_to_regex(device: &str) -> BusResult<Regex> {
    let translated = device
        .split('/')
        .map(|segment| match segment {
            "*" => "[^/]+".to_string(),
            "**" => ".*".to_string(),
            literal => regex::escape(literal),
        })
        .collect::<Vec<_>>()
        .join("/");
    Regex::new(&format!("^{translated}$")).map_err(|_| BusError::Pattern(device.to_string()))
}
