//! Workbell: recurring bell and reminder scheduler.
//!
//! Plays audio cues at fixed wall-clock instants that depend on the weekday:
//! a once-per-workday ceremony, weekday siren instants and hourly reminders.
//!
//! # Architecture
//!
//! A ticker reads the [`clock::Clock`] about once per second and hands the
//! reading to the [`engine::Engine`]:
//! - **Schedule**: [`schedule::ScheduleTable`] holds the instants, the fire
//!   decider picks at most one unfired match per minute, and
//!   [`schedule::DedupGuard`] remembers what already fired
//! - **Playback**: [`playback::PlaybackSequencer`] plays cue chains through
//!   an [`playback::AudioSink`] (cpal in production), one chain at a time
//! - **Activity**: every dispatch is posted to an [`activity::ActivitySink`];
//!   [`activity::server`] is the HTTP service that stores those records
//! - **Notices**: scheduled fires also show a desktop notice through a
//!   [`notify::Notifier`]

pub mod activity;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod playback;
pub mod schedule;

pub use config::BellConfig;
pub use engine::{Engine, EngineEvent};
pub use error::{BellError, Result};
