//! Recurring time-based events.
//!
//! Each added event owns a background task that sleeps until the timer's
//! next firing instant and invokes the callback. The target firing time
//! seeds the next computation, so a sleep that overruns does not drift the
//! schedule. Tasks race their sleep against a per-event cancel and the
//! scheduler-wide close signal; on either, the callback is not invoked
//! again.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use hearth_bus::CancelHandle;

use crate::timer::Timer;

/// Scheduling errors.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression {expr:?}: {message}")]
    InvalidCron { expr: String, message: String },

    #[error("schedule closed")]
    Closed,
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Async callback invoked with the target firing time.
pub type TimerCallback = Box<dyn Fn(DateTime<Local>) -> BoxFuture<'static, ()> + Send + Sync>;

/// A snapshot entry from [`Scheduler::upcoming`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    pub time: DateTime<Local>,
    pub description: String,
}

struct EventEntry {
    id: u64,
    timer: Arc<dyn Timer>,
    description: String,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    events: Vec<EventEntry>,
    next_id: u64,
    closed: bool,
}

/// Owns every scheduled event and their tasks.
pub struct Scheduler {
    inner: Arc<Mutex<Inner>>,
    closing: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (closing, _) = watch::channel(false);
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            closing,
        }
    }

    /// Register an event and spawn its task. The list append and handle
    /// return happen atomically under the scheduler's lock.
    pub fn add(
        &self,
        timer: Arc<dyn Timer>,
        description: impl Into<String>,
        callback: TimerCallback,
    ) -> ScheduleResult<CancelHandle> {
        let description = description.into();
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(ScheduleError::Closed);
        }
        let id = inner.next_id;
        inner.next_id += 1;

        let (handle, mut signal) = CancelHandle::new();
        let mut closing_rx = self.closing.subscribe();
        let task_timer = timer.clone();
        let task_inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let mut seed = Local::now();
            loop {
                let Some(next) = task_timer.next(seed) else {
                    break;
                };
                let sleep = (next - Local::now())
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO);
                tokio::select! {
                    _ = signal.cancelled() => break,
                    _ = async {
                        while !*closing_rx.borrow() {
                            if closing_rx.changed().await.is_err() {
                                break;
                            }
                        }
                    } => break,
                    _ = tokio::time::sleep(sleep) => {
                        trace!(target_time = %next, "timer fired");
                        callback(next).await;
                    }
                }
                seed = next;
            }
            // Drop the upcoming entry for a cancelled event; on close the
            // whole list is drained instead.
            let mut inner = task_inner.lock().unwrap();
            if !inner.closed {
                inner.events.retain(|event| event.id != id);
            }
        });

        debug!(id, description = %description, "scheduled event");
        inner.events.push(EventEntry {
            id,
            timer,
            description,
            task,
        });
        Ok(handle)
    }

    /// Each event's next firing time at or after `now`, in registration
    /// order.
    pub fn upcoming(&self, now: DateTime<Local>) -> Vec<ScheduledEvent> {
        let inner = self.inner.lock().unwrap();
        inner
            .events
            .iter()
            .filter_map(|event| {
                event.timer.next(now).map(|time| ScheduledEvent {
                    time,
                    description: event.description.clone(),
                })
            })
            .collect()
    }

    /// Signal every task to stop and wait for them. Idempotent.
    pub async fn close(&self) {
        let events = {
            let mut inner = self.inner.lock().unwrap();
            if inner.closed {
                return;
            }
            inner.closed = true;
            std::mem::take(&mut inner.events)
        };
        let _ = self.closing.send(true);
        for event in events {
            let _ = event.task.await;
        }
        debug!("scheduler closed");
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
