use crate::config::Song;

/// Result alias that carries the custom [`EngineError`] type.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The audio bytes of a track could not be turned into PCM. Recovered
    /// locally by the playback controller: the load simply never completes.
    #[error("failed to decode `{song}`: {reason}")]
    DecodeFailure { song: Song, reason: String },
    /// The audio or rendering backend cannot be used at all. Fatal at startup.
    #[error("unsupported backend: {0}")]
    UnsupportedBackend(String),
    /// A configuration value is outside the range the engine can work with.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Fft(#[from] realfft::FftError),
}

impl EngineError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn decode(song: Song, reason: impl Into<String>) -> Self {
        Self::DecodeFailure {
            song,
            reason: reason.into(),
        }
    }
}

impl From<&str> for EngineError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for EngineError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
