//! Runtime for hearth automation scripts.
//!
//! The [`Evaluator`] walks a parsed [`hearth_dsl::Program`] and turns it
//! into live side effects: device writes and reads through the bus
//! adapter, value-filtered subscriptions, and recurring timers. Scenes tie
//! registration lifetimes together — starting a scene runs its block,
//! stopping it cancels everything the block registered.
//!
//! ```no_run
//! use hearth_dsl::parse;
//! use hearth_runtime::{Config, Evaluator};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let evaluator = Evaluator::new(Config::default()).await?;
//! let program = parse("scene night { set livingroom/lights off }\nstart night")?;
//! let outcome = evaluator.eval(&program).await?;
//! println!("{outcome}");
//! evaluator.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod evaluator;
pub mod outcome;
pub mod scheduler;
pub mod timer;

pub use config::{default_mqtt_options, Config};
pub use error::{EvalError, EvalResult};
pub use evaluator::Evaluator;
pub use outcome::Outcome;
pub use scheduler::{ScheduleError, ScheduleResult, ScheduledEvent, Scheduler, TimerCallback};
pub use timer::{CronTimer, SunEvent, SunTimer, Timer};
