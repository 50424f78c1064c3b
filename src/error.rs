use thiserror::Error;

/// Failures that abort an attempted session start.
///
/// Both variants are fatal to the start attempt: the caller falls back to
/// "no active session" and must call `start_session` again to retry.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Permission denied, no capture device, or the device refused a stream.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),
    /// The file could not be opened, probed or decoded.
    #[error("could not decode audio file: {0}")]
    DecodeError(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum PaletteError {
    #[error("a palette needs at least one colour")]
    Empty,
    #[error("a palette holds at most 5 colours, got {0}")]
    TooMany(usize),
    #[error("invalid colour '{0}' (expected #rrggbb or #rgb)")]
    InvalidColor(String),
}
