//! Exact-minute fire decisions.
//!
//! [`decide`] only matches readings that land on second zero, checks the
//! categories in priority order (combined daily, weekday instant, hourly
//! tick) and returns at most one match. A match whose [`EventKey`] equals the
//! last key recorded for its category is suppressed, so re-evaluating the
//! same minute (sub-second polling, a repeated or slightly earlier
//! timestamp) never fires twice. The caller records the key after a match.

use super::dedup::DedupGuard;
use super::table::{Category, ScheduleEntry, ScheduleTable, TimeOfDay};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Identity of one physical firing instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EventKey {
    pub category: Category,
    pub time: TimeOfDay,
    pub date: NaiveDate,
}

impl EventKey {
    pub fn new(category: Category, time: TimeOfDay, date: NaiveDate) -> Self {
        Self {
            category,
            time,
            date,
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.category, self.date, self.time)
    }
}

/// A schedule entry that matched "now".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedEvent {
    pub key: EventKey,
    pub entry: ScheduleEntry,
    pub at: NaiveDateTime,
}

impl MatchedEvent {
    pub fn category(&self) -> Category {
        self.key.category
    }

    pub fn label(&self) -> &str {
        &self.entry.label
    }
}

/// Decide whether `now` fires an instant that has not fired yet.
pub fn decide(
    now: NaiveDateTime,
    table: &ScheduleTable,
    guard: &DedupGuard,
) -> Option<MatchedEvent> {
    let matched = match_instant(now, table)?;
    if guard.has_fired(&matched.key) {
        debug!(key = %matched.key, "instant already fired, suppressing");
        return None;
    }
    Some(matched)
}

/// Match `now` against the table without consulting dedup state.
pub fn match_instant(now: NaiveDateTime, table: &ScheduleTable) -> Option<MatchedEvent> {
    if now.second() != 0 {
        return None;
    }

    let weekday = now.weekday();
    let time = TimeOfDay::of(now);
    let hit = |entry: &&ScheduleEntry| entry.is_active_on(weekday) && entry.time == time;

    let entry = table
        .entries()
        .iter()
        .filter(|e| e.category == Category::CombinedDaily)
        .find(hit)
        .or_else(|| {
            table
                .entries()
                .iter()
                .filter(|e| e.category == Category::WeekdayInstant)
                .find(hit)
        })
        .cloned()
        .or_else(|| {
            let rule = table.hourly()?;
            (time.minute == 0 && rule.covers(weekday, time.hour)).then(|| rule.entry_for(time.hour))
        })?;

    Some(MatchedEvent {
        key: EventKey::new(entry.category, time, now.date()),
        entry,
        at: now,
    })
}
