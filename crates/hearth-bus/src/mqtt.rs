//! MQTT-backed [`BusClient`].
//!
//! One broker subscription to `+/status/#` feeds a local router that fans
//! status messages out to [`Subscription`]s by filter match. When acting as
//! a server for a toplevel, the client carries a retained last-will `0` on
//! `<toplevel>/connected` and publishes retained `2`/`0` connected markers
//! around its lifetime.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rumqttc::{AsyncClient, Event, Incoming, LastWill, MqttOptions, QoS};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{
    BusClient, BusError, BusResult, StatusMessage, Subscription, GET_TIMEOUT,
    SUBSCRIPTION_CAPACITY,
};
use crate::topic;
use crate::value::Value;

/// All status messages, every toplevel.
const STATUS_FILTER: &str = "+/status/#";

struct RouteEntry {
    filter: String,
    tx: mpsc::Sender<StatusMessage>,
}

/// A connected MQTT bus client.
#[derive(Clone)]
pub struct MqttClient {
    inner: Arc<MqttInner>,
}

struct MqttInner {
    client: AsyncClient,
    routes: Arc<DashMap<u64, RouteEntry>>,
    next_route_id: AtomicU64,
    server_toplevel: Option<String>,
    closing: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl MqttClient {
    /// Connect to the broker. With `server_toplevel` set, the connection
    /// registers a retained last-will `0` on `<toplevel>/connected` and
    /// publishes a retained `2` online marker.
    pub async fn connect(
        mut options: MqttOptions,
        server_toplevel: Option<String>,
    ) -> BusResult<Self> {
        if let Some(toplevel) = &server_toplevel {
            options.set_last_will(LastWill::new(
                topic::connected_topic(toplevel),
                "0",
                QoS::AtLeastOnce,
                true,
            ));
        }

        let (client, mut eventloop) = AsyncClient::new(options, SUBSCRIPTION_CAPACITY);
        client
            .subscribe(STATUS_FILTER, QoS::AtMostOnce)
            .await
            .map_err(|e| BusError::Mqtt(e.to_string()))?;

        if let Some(toplevel) = &server_toplevel {
            client
                .subscribe(topic::command_topic(toplevel), QoS::AtMostOnce)
                .await
                .map_err(|e| BusError::Mqtt(e.to_string()))?;
            client
                .publish(topic::connected_topic(toplevel), QoS::AtLeastOnce, true, "2")
                .await
                .map_err(|e| BusError::Mqtt(e.to_string()))?;
            info!(toplevel = %toplevel, "published online marker");
        }

        let routes: Arc<DashMap<u64, RouteEntry>> = Arc::new(DashMap::new());
        let (closing, mut closing_rx) = watch::channel(false);

        let loop_routes = routes.clone();
        let loop_toplevel = server_toplevel.clone();
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
                    event = eventloop.poll() => match event {
                        Ok(Event::Incoming(Incoming::Publish(publish))) => {
                            handle_publish(
                                &loop_routes,
                                loop_toplevel.as_deref(),
                                &publish.topic,
                                &publish.payload,
                            );
                        }
                        Ok(_) => {}
                        Err(err) => {
                            warn!(error = %err, "mqtt connection error");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    },
                }
            }
            debug!("mqtt event loop stopped");
        });

        Ok(Self {
            inner: Arc::new(MqttInner {
                client,
                routes,
                next_route_id: AtomicU64::new(1),
                server_toplevel,
                closing,
                task: Mutex::new(Some(task)),
                closed: AtomicBool::new(false),
            }),
        })
    }

    fn check_open(&self) -> BusResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        Ok(())
    }
}

/// Route one incoming publish to matching local subscriptions.
fn handle_publish(
    routes: &DashMap<u64, RouteEntry>,
    server_toplevel: Option<&str>,
    publish_topic: &str,
    payload: &[u8],
) {
    if let Some((toplevel, item)) = topic::split_status(publish_topic) {
        let message = StatusMessage {
            toplevel: toplevel.to_string(),
            item: item.to_string(),
            value: Value::from_payload(payload),
        };
        for entry in routes.iter() {
            if topic::filter_matches(&entry.filter, publish_topic) {
                // A slow consumer loses messages rather than stalling the
                // event loop.
                let _ = entry.tx.try_send(message.clone());
            }
        }
        return;
    }
    if let Some(toplevel) = server_toplevel {
        if publish_topic == topic::command_topic(toplevel) {
            debug!(bytes = payload.len(), "command received");
        }
    }
}

#[async_trait]
impl BusClient for MqttClient {
    async fn set(&self, toplevel: &str, item: &str, value: &str) -> BusResult<()> {
        self.check_open()?;
        self.inner
            .client
            .publish(
                topic::set_topic(toplevel, item),
                QoS::AtMostOnce,
                false,
                value.as_bytes().to_vec(),
            )
            .await
            .map_err(|e| BusError::Mqtt(e.to_string()))
    }

    async fn get(&self, toplevel: &str, item: &str) -> BusResult<Value> {
        self.check_open()?;
        let mut sub = self.subscribe(toplevel, item).await?;
        self.inner
            .client
            .publish(
                topic::get_topic(toplevel, item),
                QoS::AtMostOnce,
                false,
                "?",
            )
            .await
            .map_err(|e| BusError::Mqtt(e.to_string()))?;

        match tokio::time::timeout(GET_TIMEOUT, sub.recv()).await {
            Ok(Some(message)) => Ok(message.value),
            Ok(None) => Err(BusError::Closed),
            Err(_) => Err(BusError::GetTimeout),
        }
    }

    async fn command(&self, toplevel: &str, cmd: &[u8]) -> BusResult<()> {
        self.check_open()?;
        self.inner
            .client
            .publish(
                topic::command_topic(toplevel),
                QoS::AtMostOnce,
                false,
                cmd.to_vec(),
            )
            .await
            .map_err(|e| BusError::Mqtt(e.to_string()))
    }

    async fn subscribe(&self, toplevel: &str, item: &str) -> BusResult<Subscription> {
        self.check_open()?;
        let filter = topic::status_topic(toplevel, item);
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        let id = self.inner.next_route_id.fetch_add(1, Ordering::SeqCst);
        self.inner.routes.insert(id, RouteEntry { filter, tx });
        let routes = self.inner.routes.clone();
        Ok(Subscription::new(rx, move || {
            routes.remove(&id);
        }))
    }

    async fn close(&self) -> BusResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(toplevel) = &self.inner.server_toplevel {
            let _ = self
                .inner
                .client
                .publish(topic::connected_topic(toplevel), QoS::AtLeastOnce, true, "0")
                .await;
        }
        let _ = self.inner.closing.send(true);
        if let Some(task) = self.inner.task.lock().await.take() {
            let _ = task.await;
        }
        let _ = self.inner.client.disconnect().await;
        Ok(())
    }
}
