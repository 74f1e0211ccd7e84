//! Single-slot cue sequencer.
//!
//! [`PlaybackSequencer::play`] starts a chain of cues on a background task
//! and returns immediately. At most one chain owns the output slot: a new
//! request cancels the in-flight cue and discards the rest of its chain.
//! After a cue completes naturally the next one starts after a short grace
//! pause. A failed cue abandons the chain and is reported through the
//! returned [`PlaybackHandle`]; nothing is retried.

use super::sink::{AudioSink, CueRef, PlaybackOutcome};
use crate::error::{BellError, Result};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pause between a cue's natural end and the next cue of its chain.
pub const DEFAULT_GRACE: Duration = Duration::from_millis(500);

/// Observable playback state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    /// Label of the cue currently sounding.
    pub current_label: Option<String>,
    /// Label of the whole request (e.g. the schedule entry).
    pub chain_label: Option<String>,
    /// Cues still waiting after the current one.
    pub queue: Vec<CueRef>,
}

/// How a chain ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainEnd {
    /// Every cue played to its end.
    Completed,
    /// A newer request or a stop took the slot.
    Preempted,
}

/// Handle to a running chain.
#[derive(Debug)]
pub struct PlaybackHandle {
    generation: u64,
    task: JoinHandle<Result<ChainEnd>>,
}

impl PlaybackHandle {
    /// Request number; strictly increasing per sequencer.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the chain to end.
    ///
    /// # Errors
    ///
    /// Returns [`BellError::Playback`] when a cue failed.
    pub async fn finished(self) -> Result<ChainEnd> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(ChainEnd::Preempted),
            Err(e) => Err(BellError::Playback(format!("playback task panicked: {e}"))),
        }
    }
}

struct Slot {
    generation: u64,
    cancel: CancellationToken,
    state: PlaybackState,
}

struct Inner {
    sink: Arc<dyn AudioSink>,
    grace: Duration,
    slot: Mutex<Slot>,
    volume: Mutex<f32>,
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark `cue` as sounding. Returns `false` if `generation` lost the slot.
    fn begin_cue(&self, generation: u64, cue: &CueRef, remaining: &VecDeque<CueRef>) -> bool {
        let mut slot = self.slot();
        if slot.generation != generation {
            return false;
        }
        slot.state.is_playing = true;
        slot.state.current_label = Some(cue.label.clone());
        slot.state.queue = remaining.iter().cloned().collect();
        true
    }

    /// Clear the state if `generation` still owns the slot.
    fn finish(&self, generation: u64) {
        let mut slot = self.slot();
        if slot.generation == generation {
            slot.state = PlaybackState::default();
        }
    }
}

/// Drives one chain of cues at a time through an [`AudioSink`].
///
/// Cheap to clone; clones share the same slot.
#[derive(Clone)]
pub struct PlaybackSequencer {
    inner: Arc<Inner>,
}

impl PlaybackSequencer {
    pub fn new(sink: Arc<dyn AudioSink>, grace: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink,
                grace,
                slot: Mutex::new(Slot {
                    generation: 0,
                    cancel: CancellationToken::new(),
                    state: PlaybackState::default(),
                }),
                volume: Mutex::new(1.0),
            }),
        }
    }

    /// Set the volume used for subsequent cues (clamped to `0.0..=1.0`).
    pub fn set_volume(&self, volume: f32) {
        *self.inner.volume.lock().unwrap_or_else(|e| e.into_inner()) = volume.clamp(0.0, 1.0);
    }

    pub fn volume(&self) -> f32 {
        *self.inner.volume.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> PlaybackState {
        self.inner.slot().state.clone()
    }

    /// Preempt whatever is playing and start `cues` in order.
    ///
    /// Must be called from within a tokio runtime.
    pub fn play(&self, cues: Vec<CueRef>, label: impl Into<String>) -> PlaybackHandle {
        let label = label.into();
        let (generation, cancel) = {
            let mut slot = self.inner.slot();
            slot.cancel.cancel();
            slot.generation += 1;
            slot.cancel = CancellationToken::new();
            slot.state = PlaybackState {
                is_playing: !cues.is_empty(),
                current_label: cues.first().map(|c| c.label.clone()),
                chain_label: (!cues.is_empty()).then(|| label.clone()),
                queue: cues.iter().skip(1).cloned().collect(),
            };
            (slot.generation, slot.cancel.clone())
        };

        info!(chain = %label, cues = cues.len(), generation, "starting playback");
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(run_chain(inner, generation, cancel, cues, label));
        PlaybackHandle { generation, task }
    }

    /// Halt the in-flight chain, if any, and release the slot.
    pub fn stop(&self) {
        let mut slot = self.inner.slot();
        slot.cancel.cancel();
        slot.generation += 1;
        slot.cancel = CancellationToken::new();
        if slot.state.is_playing {
            debug!(chain = ?slot.state.chain_label, "playback stopped");
        }
        slot.state = PlaybackState::default();
    }
}

async fn run_chain(
    inner: Arc<Inner>,
    generation: u64,
    cancel: CancellationToken,
    cues: Vec<CueRef>,
    label: String,
) -> Result<ChainEnd> {
    let mut remaining: VecDeque<CueRef> = cues.into();
    let mut first = true;

    while let Some(cue) = remaining.pop_front() {
        if !first {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(ChainEnd::Preempted),
                _ = tokio::time::sleep(inner.grace) => {}
            }
        }
        first = false;

        if !inner.begin_cue(generation, &cue, &remaining) {
            return Ok(ChainEnd::Preempted);
        }

        let volume = *inner.volume.lock().unwrap_or_else(|e| e.into_inner());
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(chain = %label, cue = %cue.label, "cue preempted");
                return Ok(ChainEnd::Preempted);
            }
            outcome = inner.sink.start(&cue, volume, cancel.clone()) => outcome,
        };

        match outcome {
            PlaybackOutcome::Completed if cancel.is_cancelled() => {
                return Ok(ChainEnd::Preempted);
            }
            PlaybackOutcome::Completed => {
                debug!(chain = %label, cue = %cue.label, "cue completed");
            }
            PlaybackOutcome::Failed(reason) => {
                warn!(chain = %label, cue = %cue.label, "cue failed: {reason}");
                inner.finish(generation);
                return Err(BellError::Playback(format!("{}: {reason}", cue.label)));
            }
        }
    }

    inner.finish(generation);
    Ok(ChainEnd::Completed)
}
