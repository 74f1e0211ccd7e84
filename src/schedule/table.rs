//! Static, day-of-week aware schedule definition.
//!
//! A [`ScheduleTable`] holds the explicit [`ScheduleEntry`] list (the combined
//! daily ceremony and the weekday shift instants) plus an optional
//! [`HourlyTickRule`] that expands to one entry per whole hour. The table is
//! built once at startup and is read-only afterwards.

use crate::config::ScheduleConfig;
use crate::error::{BellError, Result};
use chrono::{NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rule category of a schedulable instant.
///
/// The declaration order is the display tie-break order and the firing
/// priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Once-per-workday ceremony that plays a two-cue chain.
    CombinedDaily,
    /// Named shift instant that varies by weekday group.
    WeekdayInstant,
    /// Reminder at every whole hour inside the active range.
    HourlyTick,
}

impl Category {
    /// Stable machine identifier, also used as the activity event type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CombinedDaily => "combined_daily",
            Self::WeekdayInstant => "weekday_instant",
            Self::HourlyTick => "hourly_tick",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hour and minute of a day. Serialized as `"HH:MM"`.
///
/// Values are range-checked when a [`ScheduleTable`] is built, not on
/// construction, so a malformed configuration is reported as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl TimeOfDay {
    pub const fn new(hour: u8, minute: u8) -> Self {
        Self { hour, minute }
    }

    /// `hour * 60 + minute`.
    pub fn minutes_of_day(self) -> u32 {
        u32::from(self.hour) * 60 + u32::from(self.minute)
    }

    pub fn is_valid(self) -> bool {
        self.hour < 24 && self.minute < 60
    }

    /// The instant at second zero, or `None` when out of range.
    pub fn to_naive_time(self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
    }

    /// Hour and minute of `now`, discarding seconds.
    pub fn of(now: NaiveDateTime) -> Self {
        // chrono guarantees hour < 24 and minute < 60.
        Self {
            hour: u8::try_from(now.hour()).unwrap_or(0),
            minute: u8::try_from(now.minute()).unwrap_or(0),
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = BellError;

    fn from_str(s: &str) -> Result<Self> {
        let (h, m) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| BellError::Config(format!("time '{s}' is not HH:MM")))?;
        let hour = h
            .parse::<u8>()
            .map_err(|e| BellError::Config(format!("bad hour in '{s}': {e}")))?;
        let minute = m
            .parse::<u8>()
            .map_err(|e| BellError::Config(format!("bad minute in '{s}': {e}")))?;
        Ok(Self { hour, minute })
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = BellError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// Set of weekday ordinals, `0 = Sunday .. 6 = Saturday`.
///
/// Serialized as a list of ordinals.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct DaySet(u8);

impl DaySet {
    pub const EMPTY: DaySet = DaySet(0);
    pub const ALL: DaySet = DaySet(0b111_1111);
    /// Monday through Friday.
    pub const WORKDAYS: DaySet = DaySet(0b011_1110);

    /// Build from ordinals. Ordinals above 6 are rejected.
    pub fn from_ordinals(days: &[u8]) -> Result<Self> {
        let mut bits = 0u8;
        for &day in days {
            if day > 6 {
                return Err(BellError::Config(format!(
                    "weekday ordinal {day} out of range (0=Sunday..6=Saturday)"
                )));
            }
            bits |= 1 << day;
        }
        Ok(Self(bits))
    }

    pub fn contains(self, weekday: Weekday) -> bool {
        self.contains_ordinal(weekday_ordinal(weekday))
    }

    pub fn contains_ordinal(self, day: u8) -> bool {
        day <= 6 && self.0 & (1 << day) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Ordinals in ascending order.
    pub fn ordinals(self) -> Vec<u8> {
        (0..=6).filter(|d| self.contains_ordinal(*d)).collect()
    }
}

impl fmt::Debug for DaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.ordinals()).finish()
    }
}

impl TryFrom<Vec<u8>> for DaySet {
    type Error = BellError;

    fn try_from(value: Vec<u8>) -> Result<Self> {
        Self::from_ordinals(&value)
    }
}

impl From<DaySet> for Vec<u8> {
    fn from(value: DaySet) -> Self {
        value.ordinals()
    }
}

/// Weekday ordinal with Sunday as zero.
pub fn weekday_ordinal(weekday: Weekday) -> u8 {
    // num_days_from_sunday() is always 0..=6.
    u8::try_from(weekday.num_days_from_sunday()).unwrap_or(0)
}

/// One triggerable instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub category: Category,
    pub time: TimeOfDay,
    pub days: DaySet,
    pub label: String,
    pub description: String,
}

impl ScheduleEntry {
    pub fn new(
        category: Category,
        time: TimeOfDay,
        days: DaySet,
        label: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            category,
            time,
            days,
            label: label.into(),
            description: description.into(),
        }
    }

    pub fn is_active_on(&self, weekday: Weekday) -> bool {
        self.days.contains(weekday)
    }
}

/// Parametrized hourly rule: fires at `HH:00` for every hour in
/// `start_hour..=end_hour` on the configured days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyTickRule {
    pub start_hour: u8,
    pub end_hour: u8,
    pub days: DaySet,
    pub label: String,
    pub description: String,
}

impl HourlyTickRule {
    pub fn covers(&self, weekday: Weekday, hour: u8) -> bool {
        self.days.contains(weekday) && (self.start_hour..=self.end_hour).contains(&hour)
    }

    /// The concrete entry for one hour of the range.
    ///
    /// `{hour}` in the description is replaced by the hour.
    pub fn entry_for(&self, hour: u8) -> ScheduleEntry {
        ScheduleEntry::new(
            Category::HourlyTick,
            TimeOfDay::new(hour, 0),
            self.days,
            self.label.clone(),
            self.description.replace("{hour}", &hour.to_string()),
        )
    }
}

/// Ordered collection of schedule entries plus the hourly rule.
#[derive(Debug, Clone)]
pub struct ScheduleTable {
    entries: Vec<ScheduleEntry>,
    hourly: Option<HourlyTickRule>,
}

impl ScheduleTable {
    /// Validate and build a table.
    ///
    /// # Errors
    ///
    /// Returns [`BellError::Config`] when an entry has an empty day set or an
    /// out-of-range time, when more than one combined daily entry is given,
    /// when an explicit entry claims the hourly category, or when the hourly
    /// range is inverted or out of range.
    pub fn new(entries: Vec<ScheduleEntry>, hourly: Option<HourlyTickRule>) -> Result<Self> {
        let mut combined = 0usize;
        for entry in &entries {
            if !entry.time.is_valid() {
                return Err(BellError::Config(format!(
                    "'{}' has out-of-range time {}",
                    entry.label, entry.time
                )));
            }
            if entry.days.is_empty() {
                return Err(BellError::Config(format!(
                    "'{}' at {} has no active days",
                    entry.label, entry.time
                )));
            }
            match entry.category {
                Category::CombinedDaily => combined += 1,
                Category::WeekdayInstant => {}
                Category::HourlyTick => {
                    return Err(BellError::Config(format!(
                        "'{}' at {}: hourly ticks come from the hourly rule, not explicit entries",
                        entry.label, entry.time
                    )));
                }
            }
        }
        if combined > 1 {
            return Err(BellError::Config(format!(
                "{combined} combined daily entries configured, at most one allowed"
            )));
        }

        if let Some(rule) = &hourly {
            if rule.start_hour > 23 || rule.end_hour > 23 {
                return Err(BellError::Config(format!(
                    "hourly range {}..={} outside 0..=23",
                    rule.start_hour, rule.end_hour
                )));
            }
            if rule.start_hour > rule.end_hour {
                return Err(BellError::Config(format!(
                    "hourly range start {} is after end {}",
                    rule.start_hour, rule.end_hour
                )));
            }
            if rule.days.is_empty() {
                return Err(BellError::Config("hourly rule has no active days".to_owned()));
            }
        }

        Ok(Self { entries, hourly })
    }

    /// Build a table from the `[schedule]` configuration section.
    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        let mut entries = Vec::new();

        if let Some(daily) = &config.combined_daily {
            entries.push(ScheduleEntry::new(
                Category::CombinedDaily,
                daily.time,
                daily.days,
                daily.label.clone(),
                daily.description.clone(),
            ));
        }

        for group in &config.weekday_schedules {
            if group.days.is_empty() {
                return Err(BellError::Config(format!(
                    "weekday schedule '{}' has no active days",
                    group.name
                )));
            }
            for time in &group.times {
                entries.push(ScheduleEntry::new(
                    Category::WeekdayInstant,
                    *time,
                    group.days,
                    group.label.clone(),
                    group.description.clone(),
                ));
            }
        }

        let hourly = config.hourly.as_ref().map(|h| HourlyTickRule {
            start_hour: h.start_hour,
            end_hour: h.end_hour,
            days: h.days,
            label: h.label.clone(),
            description: h.description.clone(),
        });

        Self::new(entries, hourly)
    }

    /// Explicit entries in declaration order.
    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn hourly(&self) -> Option<&HourlyTickRule> {
        self.hourly.as_ref()
    }

    /// Every instant active on `weekday`, hourly ticks included, ordered by
    /// time of day. Equal times keep category order, then declaration order.
    pub fn entries_for_day(&self, weekday: Weekday) -> Vec<ScheduleEntry> {
        let mut day: Vec<ScheduleEntry> = self
            .entries
            .iter()
            .filter(|e| e.is_active_on(weekday))
            .cloned()
            .collect();

        if let Some(rule) = &self.hourly {
            if rule.days.contains(weekday) {
                day.extend((rule.start_hour..=rule.end_hour).map(|h| rule.entry_for(h)));
            }
        }

        // Stable sort keeps declaration order within equal keys.
        day.sort_by_key(|e| (e.time.minutes_of_day(), e.category));
        day
    }
}
