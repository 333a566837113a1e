use crate::BackendKind;

/// Result alias that carries the custom [`MixerError`] type.
pub type Result<T> = std::result::Result<T, MixerError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum MixerError {
    /// Free-form message for conditions without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// A backend selector outside the two known values.
    #[error("unrecognized backend selector {0}")]
    InvalidSelector(u32),
    /// A backend name that does not match any known variant.
    #[error("unknown backend `{0}`")]
    UnknownBackend(String),
    /// The backend could not prepare its resources.
    #[error("failed to load {kind} backend: {reason}")]
    BackendLoad { kind: BackendKind, reason: String },
    /// Playback was requested on a backend whose `load` never succeeded.
    #[error("{0} backend is not loaded")]
    BackendNotLoaded(BackendKind),
    /// `load` was called a second time on the same handle.
    #[error("{0} backend was already loaded")]
    AlreadyLoaded(BackendKind),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Fft(#[from] realfft::FftError),
}

impl MixerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}
