use thiserror::Error;

/// Errors surfaced by backends and the file player.
///
/// Device-open failures never escape `MidiController::connect` — it folds
/// them into its boolean result. They exist as values so backends have a
/// real seam to report through.
#[derive(Debug, Error)]
pub enum MidiError {
    #[error("midi backend init failed: {0}")]
    Init(String),

    #[error("failed to open midi device {id}: {reason}")]
    DeviceOpen { id: usize, reason: String },

    #[error("no such midi device: {0}")]
    NoSuchDevice(usize),

    #[error("device {0} does not support the requested direction")]
    WrongDirection(usize),

    #[error("midi write failed: {0}")]
    Send(String),

    #[error("midi file uses SMPTE timecode timing, which is unsupported")]
    UnsupportedTiming,

    #[error("malformed midi file: {0}")]
    MidiFile(#[from] midly::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
