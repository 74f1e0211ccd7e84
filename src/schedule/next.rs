//! Next upcoming instant, for display and planning.

use super::table::{Category, ScheduleTable, TimeOfDay};
use chrono::{Datelike, NaiveDateTime};
use serde::Serialize;

/// Projection of the soonest entry still ahead today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextEventView {
    pub category: Category,
    pub time: TimeOfDay,
    pub label: String,
    pub description: String,
    /// Whole seconds from "now" to the instant.
    pub seconds_until: i64,
}

/// Earliest entry of `now`'s weekday strictly after `now`.
///
/// Does not roll over into tomorrow and never looks at dedup state.
pub fn next_event(now: NaiveDateTime, table: &ScheduleTable) -> Option<NextEventView> {
    let today = now.date();
    table
        .entries_for_day(now.weekday())
        .into_iter()
        .find_map(|entry| {
            let at = today.and_time(entry.time.to_naive_time()?);
            (at > now).then(|| NextEventView {
                category: entry.category,
                time: entry.time,
                label: entry.label,
                description: entry.description,
                seconds_until: (at - now).num_seconds(),
            })
        })
}
