//! Wall-clock sources and clock anomaly detection.
//!
//! The engine reads "now" through the [`Clock`] trait so tests can drive it
//! with a [`ManualClock`]. [`ClockWatch`] compares consecutive readings and
//! reports backward jumps and skipped minute boundaries. Anomalies are
//! informational only: a skipped minute is never back-filled.

use chrono::{Duration, NaiveDateTime, Timelike};
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Source of the current local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// The system's local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Settable clock for tests and simulations.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Irregularity observed between two consecutive clock readings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClockAnomaly {
    /// The clock moved backwards.
    Backward {
        previous: NaiveDateTime,
        observed: NaiveDateTime,
    },
    /// One or more minute boundaries passed without being observed.
    /// Events scheduled in those minutes are permanently missed.
    Skipped {
        previous: NaiveDateTime,
        observed: NaiveDateTime,
        missed_minutes: i64,
    },
}

impl std::fmt::Display for ClockAnomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backward { previous, observed } => {
                write!(f, "clock moved backwards from {previous} to {observed}")
            }
            Self::Skipped {
                previous,
                observed,
                missed_minutes,
            } => write!(
                f,
                "{missed_minutes} minute boundary(ies) skipped between {previous} and {observed}"
            ),
        }
    }
}

/// Tracks the last reading to detect [`ClockAnomaly`]s.
#[derive(Debug, Default)]
pub struct ClockWatch {
    last: Option<NaiveDateTime>,
}

impl ClockWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `now` and report any anomaly relative to the previous reading.
    pub fn observe(&mut self, now: NaiveDateTime) -> Option<ClockAnomaly> {
        let previous = self.last.replace(now)?;

        if now < previous {
            return Some(ClockAnomaly::Backward {
                previous,
                observed: now,
            });
        }

        // Boundaries in (previous, now]; the one at `now` counts as seen
        // when this reading lands on second zero.
        let crossed = (truncate_to_minute(now) - truncate_to_minute(previous)).num_minutes();
        let seen_now = i64::from(crossed > 0 && now.second() == 0);
        let missed_minutes = crossed - seen_now;

        (missed_minutes > 0).then_some(ClockAnomaly::Skipped {
            previous,
            observed: now,
            missed_minutes,
        })
    }

    /// Forget the previous reading.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

fn truncate_to_minute(t: NaiveDateTime) -> NaiveDateTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}
