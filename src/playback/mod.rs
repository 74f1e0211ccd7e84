//! Cue playback: the sink capability, the single-slot sequencer and the
//! cpal-backed production sink.

pub mod cpal_sink;
pub mod sequencer;
pub mod sink;

pub use cpal_sink::CpalSink;
pub use sequencer::{ChainEnd, DEFAULT_GRACE, PlaybackHandle, PlaybackSequencer, PlaybackState};
pub use sink::{AudioSink, CueRef, InstantSink, PlaybackOutcome};
