//! Error types for the workbell scheduler.

/// Top-level error type for the bell scheduler.
#[derive(Debug, thiserror::Error)]
pub enum BellError {
    /// Malformed schedule or settings. Fatal at startup.
    #[error("config error: {0}")]
    Config(String),

    /// A cue could not be played (device refused, codec failure).
    #[error("playback error: {0}")]
    Playback(String),

    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Activity-log sink could not be reached.
    #[error("activity sink unavailable: {0}")]
    SinkUnavailable(String),

    /// Desktop notification could not be shown.
    #[error("notification error: {0}")]
    Notify(String),

    /// Activity store (SQLite) error.
    #[error("store error: {0}")]
    Store(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BellError>;
