//! Schedule evaluation: what fires when, and what has already fired.
//!
//! - [`table`]: the static, weekday-aware instant definitions
//! - [`decider`]: exact-minute matching with category priority
//! - [`dedup`]: last-fired key per category
//! - [`next`]: soonest upcoming instant for display

pub mod decider;
pub mod dedup;
pub mod next;
pub mod table;

pub use decider::{EventKey, MatchedEvent, decide};
pub use dedup::DedupGuard;
pub use next::{NextEventView, next_event};
pub use table::{Category, DaySet, HourlyTickRule, ScheduleEntry, ScheduleTable, TimeOfDay};
