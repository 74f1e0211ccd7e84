//! Configuration types for the bell scheduler.

use crate::error::{BellError, Result};
use crate::playback::CueRef;
use crate::schedule::{Category, DaySet, TimeOfDay};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BellConfig {
    /// What fires when.
    pub schedule: ScheduleConfig,
    /// Audio cue per rule category.
    pub cues: CuesConfig,
    /// Driver loop timing.
    pub engine: EngineConfig,
    /// Audio output settings.
    pub audio: AudioConfig,
    /// Remote activity-log sink.
    pub activity: ActivityConfig,
    /// Desktop notifications on fire.
    pub notify: NotifyConfig,
    /// Activity-log HTTP service.
    pub server: ServerConfig,
}

/// The `[schedule]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// The once-per-workday ceremony (None disables it).
    pub combined_daily: Option<CombinedDailyConfig>,
    /// Weekday groups, each with its own ordered instant list.
    pub weekday_schedules: Vec<WeekdayScheduleConfig>,
    /// Hourly reminder range (None disables it).
    pub hourly: Option<HourlyConfig>,
    /// Initial playback volume in `0.0..=1.0`.
    pub default_volume: f32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            combined_daily: Some(CombinedDailyConfig::default()),
            weekday_schedules: vec![
                WeekdayScheduleConfig {
                    name: "senin_kamis".to_owned(),
                    days: DaySet::from_ordinals(&[1, 2, 3, 4]).unwrap_or(DaySet::WORKDAYS),
                    times: vec![
                        TimeOfDay::new(8, 0),
                        TimeOfDay::new(12, 0),
                        TimeOfDay::new(13, 0),
                        TimeOfDay::new(17, 0),
                    ],
                    ..WeekdayScheduleConfig::default()
                },
                WeekdayScheduleConfig {
                    name: "jumat".to_owned(),
                    days: DaySet::from_ordinals(&[5]).unwrap_or(DaySet::WORKDAYS),
                    times: vec![
                        TimeOfDay::new(8, 0),
                        TimeOfDay::new(11, 30),
                        TimeOfDay::new(12, 30),
                        TimeOfDay::new(17, 0),
                    ],
                    ..WeekdayScheduleConfig::default()
                },
            ],
            hourly: Some(HourlyConfig::default()),
            default_volume: 0.8,
        }
    }
}

/// Combined daily ceremony instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CombinedDailyConfig {
    pub time: TimeOfDay,
    pub days: DaySet,
    pub label: String,
    pub description: String,
}

impl Default for CombinedDailyConfig {
    fn default() -> Self {
        Self {
            time: TimeOfDay::new(7, 50),
            days: DaySet::WORKDAYS,
            label: "Blok Nasional".to_owned(),
            description: "Indonesia Raya & Hymne Sinarmas".to_owned(),
        }
    }
}

/// One weekday group (e.g. Monday-Thursday vs Friday) and its instants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeekdayScheduleConfig {
    pub name: String,
    pub days: DaySet,
    /// Instants in declaration order.
    pub times: Vec<TimeOfDay>,
    pub label: String,
    pub description: String,
}

impl Default for WeekdayScheduleConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            days: DaySet::EMPTY,
            times: Vec::new(),
            label: "Sirine Kerja".to_owned(),
            description: "Waktu kerja".to_owned(),
        }
    }
}

/// Hourly reminder range, inclusive on both ends.
///
/// `{hour}` in `description` expands to the firing hour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HourlyConfig {
    pub start_hour: u8,
    pub end_hour: u8,
    pub days: DaySet,
    pub label: String,
    pub description: String,
}

impl Default for HourlyConfig {
    fn default() -> Self {
        Self {
            start_hour: 7,
            end_hour: 18,
            days: DaySet::ALL,
            label: "Reminder Jam".to_owned(),
            description: "Pukul {hour}:00".to_owned(),
        }
    }
}

/// Cue lists per category plus the manual test cue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CuesConfig {
    pub combined_daily: Vec<CueRef>,
    pub weekday_instant: Vec<CueRef>,
    pub hourly_tick: Vec<CueRef>,
    pub test: CueRef,
}

impl CuesConfig {
    pub fn for_category(&self, category: Category) -> &[CueRef] {
        match category {
            Category::CombinedDaily => &self.combined_daily,
            Category::WeekdayInstant => &self.weekday_instant,
            Category::HourlyTick => &self.hourly_tick,
        }
    }
}

impl Default for CuesConfig {
    fn default() -> Self {
        Self {
            combined_daily: vec![
                CueRef::new("Indonesia Raya", "sounds/indonesia_raya.mp3"),
                CueRef::new("Hymne Sinarmas", "sounds/hymne_sinarmas.mp3"),
            ],
            weekday_instant: vec![CueRef::new("Sirine Kerja", "sounds/sirine.mp3")],
            hourly_tick: vec![CueRef::new("Reminder Jam", "sounds/chime.mp3")],
            test: CueRef::new("Test Audio", "sounds/chime.mp3"),
        }
    }
}

/// Driver loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ticker period in milliseconds.
    pub tick_millis: u64,
    /// Pause between chained cues in milliseconds.
    pub grace_millis: u64,
    /// Entries kept in the in-memory recent activity list.
    pub recent_activity_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_millis: 1000,
            grace_millis: 500,
            recent_activity_limit: 10,
        }
    }
}

/// Audio output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

/// Remote activity-log sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// `POST` endpoint for activity records (None = records are dropped).
    pub endpoint: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 5,
        }
    }
}

/// Desktop notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub enabled: bool,
    /// Application name shown by the notification daemon.
    pub app_name: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            app_name: "Workbell".to_owned(),
        }
    }
}

/// Activity-log HTTP service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// SQLite database file (None = in-memory).
    pub database: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8001,
            database: None,
        }
    }
}

impl BellConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// settings are out of range.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| BellError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| BellError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/workbell/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("workbell").join("config.toml")
        } else if let Some(dir) = dirs::config_dir() {
            dir.join("workbell").join("config.toml")
        } else {
            PathBuf::from("/tmp/workbell-config/config.toml")
        }
    }

    /// Range checks that the schedule table does not cover.
    ///
    /// # Errors
    ///
    /// Returns [`BellError::Config`] for an out-of-range volume or a zero tick period.
    pub fn validate(&self) -> Result<()> {
        let volume = self.schedule.default_volume;
        if !(0.0..=1.0).contains(&volume) {
            return Err(BellError::Config(format!(
                "default_volume {volume} outside 0.0..=1.0"
            )));
        }
        if self.engine.tick_millis == 0 {
            return Err(BellError::Config("tick_millis must be positive".to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = BellConfig::default();
        config.validate().unwrap();
        let daily = config.schedule.combined_daily.as_ref().unwrap();
        assert_eq!(daily.time, TimeOfDay::new(7, 50));
        assert_eq!(daily.days, DaySet::WORKDAYS);
        assert_eq!(config.schedule.weekday_schedules.len(), 2);
        assert_eq!(config.cues.combined_daily.len(), 2);
        assert_eq!(config.engine.grace_millis, 500);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = BellConfig::default();
        config.schedule.default_volume = 0.5;
        config.activity.endpoint = Some("http://localhost:8001/api/activity-log".to_owned());
        config.save_to_file(&path).unwrap();

        let loaded = BellConfig::from_file(&path).unwrap();
        assert!((loaded.schedule.default_volume - 0.5).abs() < f32::EPSILON);
        assert_eq!(loaded.activity.endpoint, config.activity.endpoint);
        assert_eq!(
            loaded.schedule.weekday_schedules[1].times,
            config.schedule.weekday_schedules[1].times
        );
    }

    #[test]
    fn partial_file_uses_defaults() {
        let toml_str = r#"
[schedule]
default_volume = 0.3

[schedule.hourly]
start_hour = 8
end_hour = 16
"#;
        let config: BellConfig = toml::from_str(toml_str).unwrap();
        let hourly = config.schedule.hourly.unwrap();
        assert_eq!(hourly.start_hour, 8);
        assert_eq!(hourly.days, DaySet::ALL);
        assert_eq!(config.engine.tick_millis, 1000);
        assert!(config.notify.enabled);
    }

    #[test]
    fn notifications_can_be_disabled() {
        let config: BellConfig = toml::from_str("[notify]\nenabled = false\n").unwrap();
        assert!(!config.notify.enabled);
        assert_eq!(config.notify.app_name, "Workbell");
    }

    #[test]
    fn weekday_groups_parse_from_toml() {
        let toml_str = r#"
[[schedule.weekday_schedules]]
name = "weekend"
days = [0, 6]
times = ["09:15", "15:45"]
label = "Weekend Bell"
"#;
        let config: BellConfig = toml::from_str(toml_str).unwrap();
        let group = &config.schedule.weekday_schedules[0];
        assert_eq!(group.days.ordinals(), vec![0, 6]);
        assert_eq!(group.times, vec![TimeOfDay::new(9, 15), TimeOfDay::new(15, 45)]);
        assert_eq!(group.description, "Waktu kerja");
    }

    #[test]
    fn bad_time_string_is_rejected() {
        let toml_str = r#"
[schedule.combined_daily]
time = "seven fifty"
"#;
        assert!(toml::from_str::<BellConfig>(toml_str).is_err());
    }

    #[test]
    fn bad_weekday_ordinal_is_rejected() {
        let toml_str = r#"
[schedule.combined_daily]
days = [1, 9]
"#;
        assert!(toml::from_str::<BellConfig>(toml_str).is_err());
    }

    #[test]
    fn volume_out_of_range_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[schedule]\ndefault_volume = 1.5\n").unwrap();
        let err = BellConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, BellError::Config(_)));
    }

    #[test]
    fn cues_for_category() {
        let cues = CuesConfig::default();
        assert_eq!(cues.for_category(Category::CombinedDaily)[1].label, "Hymne Sinarmas");
        assert_eq!(cues.for_category(Category::HourlyTick).len(), 1);
    }
}
