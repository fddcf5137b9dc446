//! Timers: things that know their next firing instant.

use chrono::{DateTime, Datelike, Local};
use cron::Schedule;

use crate::scheduler::{ScheduleError, ScheduleResult};

/// Computes the next firing instant strictly after `after`.
///
/// `next` is monotonically non-decreasing under iteration: feeding a firing
/// time back in yields a later one.
pub trait Timer: Send + Sync {
    fn next(&self, after: DateTime<Local>) -> Option<DateTime<Local>>;
}

/// A timer driven by a cron expression (with seconds field).
pub struct CronTimer {
    schedule: Schedule,
}

impl CronTimer {
    pub fn new(expr: &str) -> ScheduleResult<Self> {
        let schedule = expr
            .parse::<Schedule>()
            .map_err(|err| ScheduleError::InvalidCron {
                expr: expr.to_string(),
                message: err.to_string(),
            })?;
        Ok(Self { schedule })
    }

    /// Fires every day at the given 24-hour wall-clock time.
    pub fn daily(hour: u8, minute: u8) -> ScheduleResult<Self> {
        Self::new(&format!("0 {minute} {hour} * * *"))
    }
}

impl Timer for CronTimer {
    fn next(&self, after: DateTime<Local>) -> Option<DateTime<Local>> {
        self.schedule.after(&after).next()
    }
}

/// Which sun event a [`SunTimer`] fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SunEvent {
    Sunrise,
    Sunset,
}

/// Fires at the next sunrise or sunset for a geographic position.
pub struct SunTimer {
    pub event: SunEvent,
    pub latitude: f64,
    pub longitude: f64,
}

impl Timer for SunTimer {
    fn next(&self, after: DateTime<Local>) -> Option<DateTime<Local>> {
        let mut date = after.date_naive();
        // The event for `after`'s date may already be past; look a few days
        // ahead (sunrise/sunset always recur within two days).
        for _ in 0..3 {
            let (rise, set) = sunrise::sunrise_sunset(
                self.latitude,
                self.longitude,
                date.year(),
                date.month(),
                date.day(),
            );
            let timestamp = match self.event {
                SunEvent::Sunrise => rise,
                SunEvent::Sunset => set,
            };
            if let Some(instant) = DateTime::from_timestamp(timestamp, 0) {
                let instant = instant.with_timezone(&Local);
                if instant > after {
                    return Some(instant);
                }
            }
            date = date.succ_opt()?;
        }
        None
    }
}
