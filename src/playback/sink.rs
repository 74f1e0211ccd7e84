//! Audio sink capability and cue references.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// A single playable audio unit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CueRef {
    /// Display label (shown as "now playing").
    pub label: String,
    /// Where the audio comes from (file path for the cpal sink).
    pub source: String,
}

impl CueRef {
    pub fn new(label: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
        }
    }
}

/// How a single cue ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The cue played to its natural end (or was stopped via `cancel`).
    Completed,
    /// The device or codec refused the cue.
    Failed(String),
}

/// Something that can play a cue to completion.
///
/// Implementations must stop promptly once `cancel` fires; the sequencer
/// cancels the token when a newer request preempts this one.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn start(&self, cue: &CueRef, volume: f32, cancel: CancellationToken) -> PlaybackOutcome;
}

/// Deterministic sink that completes every cue immediately.
///
/// Records the labels it was asked to play. Cues whose label was
/// registered with [`InstantSink::failing_on`] report a failure instead.
#[derive(Debug, Default)]
pub struct InstantSink {
    played: Mutex<Vec<String>>,
    failing: HashSet<String>,
}

impl InstantSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make cues with this label fail.
    pub fn failing_on(mut self, label: impl Into<String>) -> Self {
        self.failing.insert(label.into());
        self
    }

    /// Labels started so far, in order.
    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl AudioSink for InstantSink {
    async fn start(
        &self,
        cue: &CueRef,
        _volume: f32,
        _cancel: CancellationToken,
    ) -> PlaybackOutcome {
        self.played
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(cue.label.clone());
        if self.failing.contains(&cue.label) {
            PlaybackOutcome::Failed(format!("'{}' refused by test sink", cue.label))
        } else {
            PlaybackOutcome::Completed
        }
    }
}
