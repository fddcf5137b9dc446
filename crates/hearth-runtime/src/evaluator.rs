//! The evaluator: turns a parsed program into live timers, subscriptions
//! and scene lifetimes.
//!
//! All AST walking and scene-map mutation is serialised under one
//! non-reentrant async mutex. Timer and subscription callbacks re-enter
//! through [`Evaluator::eval_block_in`], which re-acquires it; callbacks
//! are only ever invoked from scheduler and adapter worker tasks, never
//! synchronously from `eval` itself, so the lock is never taken twice on
//! one call path.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Local;
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use hearth_bus::{
    BusAdapter, BusClient, CancelHandle, MqttClient, WhenCallback,
};
use hearth_dsl::{format_block, AtStmt, Block, Program, SetStmt, Stmt, TimeKind, WhenStmt};

use crate::config::Config;
use crate::error::{EvalError, EvalResult};
use crate::outcome::Outcome;
use crate::scheduler::{ScheduledEvent, Scheduler, TimerCallback};
use crate::timer::{CronTimer, SunEvent, SunTimer, Timer};

/// The scene a registration belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SceneRef {
    Global,
    Named(String),
}

/// A defined scene: its block plus every live registration made on its
/// behalf. Start appends registrations; stop cancels and removes them all.
struct SceneState {
    block: Block,
    cancels: Vec<CancelHandle>,
    vars: HashMap<String, String>,
}

#[derive(Default)]
struct Scenes {
    named: HashMap<String, SceneState>,
    global_cancels: Vec<CancelHandle>,
    global_vars: HashMap<String, String>,
}

struct EvaluatorInner {
    config: Config,
    bus: BusAdapter,
    scheduler: Scheduler,
    state: Mutex<Scenes>,
}

/// Evaluates programs against the bus and the scheduler.
///
/// Cheap to clone; every clone shares the same runtime state.
#[derive(Clone)]
pub struct Evaluator {
    inner: Arc<EvaluatorInner>,
}

impl Evaluator {
    /// Connect to the bus and build a ready evaluator. Unless
    /// `client_only` is set, the connection acts as a server for
    /// `config.toplevel`: retained connected markers and a last-will.
    pub async fn new(config: Config) -> EvalResult<Self> {
        let server_toplevel = if config.client_only {
            None
        } else {
            Some(config.toplevel.clone())
        };
        let client = MqttClient::connect(config.mqtt.clone(), server_toplevel).await?;
        Self::with_client(config, Arc::new(client)).await
    }

    /// Build an evaluator over an already-connected client. This is the
    /// seam tests use to run against the in-process bus.
    pub async fn with_client(config: Config, client: Arc<dyn BusClient>) -> EvalResult<Self> {
        let bus = BusAdapter::new(client).await?;
        Ok(Self {
            inner: Arc::new(EvaluatorInner {
                config,
                bus,
                scheduler: Scheduler::new(),
                state: Mutex::new(Scenes::default()),
            }),
        })
    }

    /// Evaluate a program against the global scene.
    pub async fn eval(&self, program: &Program) -> EvalResult<Outcome> {
        let mut state = self.inner.state.lock().await;
        self.eval_statements(&mut state, &SceneRef::Global, &program.statements)
            .await
    }

    /// Snapshot of every scheduled event's next firing time.
    pub fn upcoming(&self) -> Vec<ScheduledEvent> {
        self.inner.scheduler.upcoming(Local::now())
    }

    /// Stop the scheduler and all subscriptions, then disconnect from the
    /// bus. Idempotent.
    pub async fn close(&self) {
        self.inner.scheduler.close().await;
        if let Err(err) = self.inner.bus.close().await {
            warn!(error = %err, "closing bus adapter failed");
        }
    }

    // --- Dispatch ---

    async fn eval_statements(
        &self,
        state: &mut Scenes,
        scene: &SceneRef,
        statements: &[Stmt],
    ) -> EvalResult<Outcome> {
        let mut results = Vec::with_capacity(statements.len());
        for stmt in statements {
            results.push(self.eval_stmt(state, scene, stmt).await?);
        }
        Ok(Outcome::List(results))
    }

    fn eval_stmt<'a>(
        &'a self,
        state: &'a mut Scenes,
        scene: &'a SceneRef,
        stmt: &'a Stmt,
    ) -> BoxFuture<'a, EvalResult<Outcome>> {
        async move {
            match stmt {
                Stmt::Set(set) => self.eval_set(set).await,
                Stmt::Get(get) => {
                    let value = self.read_device(&get.path.path).await?;
                    Ok(Outcome::Value(value))
                }
                Stmt::Var(var) => {
                    let value = self.read_device(&var.get.path.path).await?;
                    set_var(state, scene, var.name.clone(), value);
                    Ok(Outcome::Nil)
                }
                Stmt::Scene(def) => {
                    debug!(scene = %def.name, "scene defined");
                    state.named.insert(
                        def.name.clone(),
                        SceneState {
                            block: def.block.clone(),
                            cancels: Vec::new(),
                            vars: HashMap::new(),
                        },
                    );
                    Ok(Outcome::Nil)
                }
                Stmt::Start(start) => {
                    let block = state
                        .named
                        .get(&start.scene)
                        .map(|s| s.block.clone())
                        .ok_or_else(|| EvalError::UnknownScene(start.scene.clone()))?;
                    debug!(scene = %start.scene, "starting scene");
                    let scene_ref = SceneRef::Named(start.scene.clone());
                    self.eval_statements(state, &scene_ref, &block.statements)
                        .await
                }
                Stmt::Stop(stop) => {
                    let mut removed = state
                        .named
                        .remove(&stop.scene)
                        .ok_or_else(|| EvalError::UnknownScene(stop.scene.clone()))?;
                    debug!(
                        scene = %stop.scene,
                        registrations = removed.cancels.len(),
                        "stopping scene"
                    );
                    for cancel in removed.cancels.drain(..) {
                        cancel.cancel();
                    }
                    Ok(Outcome::Nil)
                }
                Stmt::At(at) => self.eval_at(state, scene, at).await,
                Stmt::When(when) => self.eval_when(state, scene, when).await,
            }
        }
        .boxed()
    }

    async fn eval_set(&self, set: &SetStmt) -> EvalResult<Outcome> {
        let (toplevel, device) = split_path(&set.device.path)?;
        self.inner.bus.set(toplevel, device, &set.value.value).await?;
        Ok(Outcome::Nil)
    }

    async fn read_device(&self, path: &str) -> EvalResult<String> {
        let (toplevel, device) = split_path(path)?;
        let value = self.inner.bus.get(toplevel, device).await?;
        Ok(value.coerce_str())
    }

    async fn eval_at(
        &self,
        state: &mut Scenes,
        scene: &SceneRef,
        at: &AtStmt,
    ) -> EvalResult<Outcome> {
        let timer: Arc<dyn Timer> = match &at.time.kind {
            TimeKind::Keyword(word) => {
                let event = match word.as_str() {
                    "sunrise" => SunEvent::Sunrise,
                    "sunset" => SunEvent::Sunset,
                    _ => return Err(EvalError::UnknownTimeKeyword(word.clone())),
                };
                Arc::new(SunTimer {
                    event,
                    latitude: self.inner.config.latitude,
                    longitude: self.inner.config.longitude,
                })
            }
            TimeKind::Clock { hour, minute, am } => {
                Arc::new(CronTimer::daily(hour_24(*hour, *am), *minute)?)
            }
        };

        let description = format_block(&at.block);
        let run = self.block_runner(scene.clone(), at.block.clone());
        let callback: TimerCallback = Box::new(move |_fired| run());
        let handle = self.inner.scheduler.add(timer, description, callback)?;
        push_cancel(state, scene, handle);
        Ok(Outcome::Nil)
    }

    async fn eval_when(
        &self,
        state: &mut Scenes,
        scene: &SceneRef,
        when: &WhenStmt,
    ) -> EvalResult<Outcome> {
        let (toplevel, device) = split_path(&when.path.path)?;
        let run = self.block_runner(scene.clone(), when.block.clone());
        let wait = when.wait.as_ref().map(|d| d.duration);
        let callback: WhenCallback = Box::new(move || match wait {
            Some(delay) => {
                let run = run.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    run().await;
                });
                futures::future::ready(()).boxed()
            }
            None => run(),
        });

        let handle = self
            .inner
            .bus
            .when(toplevel, device, &when.is_value.value, callback)
            .await?;
        push_cancel(state, scene, handle);
        Ok(Outcome::Nil)
    }

    /// A clonable closure that evaluates `block` under `scene`, used as the
    /// body of timer and subscription callbacks.
    fn block_runner(
        &self,
        scene: SceneRef,
        block: Block,
    ) -> impl Fn() -> BoxFuture<'static, ()> + Send + Sync + Clone {
        let evaluator = self.clone();
        move || {
            let evaluator = evaluator.clone();
            let scene = scene.clone();
            let block = block.clone();
            async move {
                if let Err(err) = evaluator.eval_block_in(&scene, &block).await {
                    warn!(error = %err, "callback block failed");
                }
            }
            .boxed()
        }
    }

    /// Re-entry point for callbacks: re-acquires the evaluator lock and
    /// evaluates the block under its owning scene. A named scene that has
    /// been stopped in the meantime is skipped.
    async fn eval_block_in(&self, scene: &SceneRef, block: &Block) -> EvalResult<Outcome> {
        let mut state = self.inner.state.lock().await;
        if let SceneRef::Named(name) = scene {
            if !state.named.contains_key(name) {
                debug!(scene = %name, "skipping callback for stopped scene");
                return Ok(Outcome::Nil);
            }
        }
        self.eval_statements(&mut state, scene, &block.statements)
            .await
    }
}

/// Route a new cancel handle to its owning scene. A named scene that no
/// longer exists cannot be resurrected: the registration is cancelled on
/// the spot.
fn push_cancel(state: &mut Scenes, scene: &SceneRef, handle: CancelHandle) {
    match scene {
        SceneRef::Global => state.global_cancels.push(handle),
        SceneRef::Named(name) => match state.named.get_mut(name) {
            Some(scene_state) => scene_state.cancels.push(handle),
            None => {
                debug!(scene = %name, "registration for stopped scene cancelled");
                handle.cancel();
            }
        },
    }
}

fn set_var(state: &mut Scenes, scene: &SceneRef, name: String, value: String) {
    match scene {
        SceneRef::Global => {
            state.global_vars.insert(name, value);
        }
        SceneRef::Named(scene_name) => {
            if let Some(scene_state) = state.named.get_mut(scene_name) {
                scene_state.vars.insert(name, value);
            }
        }
    }
}

/// Split a device path into `(toplevel, device)` on the first `/`.
fn split_path(path: &str) -> EvalResult<(&str, &str)> {
    match path.split_once('/') {
        Some((toplevel, device)) if !toplevel.is_empty() && !device.is_empty() => {
            Ok((toplevel, device))
        }
        _ => Err(EvalError::InvalidPath(path.to_string())),
    }
}

/// 24-hour conversion: 12 AM is midnight, 12 PM is noon.
fn hour_24(hour: u8, am: bool) -> u8 {
    match (hour, am) {
        (12, true) => 0,
        (12, false) => 12,
        (hour, true) => hour,
        (hour, false) => hour + 12,
    }
}
