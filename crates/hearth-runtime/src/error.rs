//! Evaluation errors.

use thiserror::Error;

use hearth_bus::BusError;

use crate::scheduler::ScheduleError;

/// Errors surfaced from [`crate::Evaluator::eval`].
///
/// An error aborts the remaining statements of the enclosing block; errors
/// inside timer and subscription callbacks are logged instead.
#[derive(Debug, Error)]
pub enum EvalError {
    /// A device path with no `/` or an empty toplevel/device part.
    #[error("invalid path {0:?}")]
    InvalidPath(String),

    #[error("unknown scene {0:?}")]
    UnknownScene(String),

    /// A time word other than `sunrise` or `sunset`.
    #[error("unknown time word {0:?}")]
    UnknownTimeKeyword(String),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

pub type EvalResult<T> = Result<T, EvalError>;
