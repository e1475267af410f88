use crate::context::ContextError;

/// Errors that can occur in connection operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    /// Stream-level error.
    #[error("stream error: {0}")]
    Stream(#[from] sealink_stream::StreamError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] sealink_frame::FrameError),

    /// Key handling or per-message encryption error.
    #[error("crypto error: {0}")]
    Crypto(#[from] sealink_crypto::CryptoError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Connection context error.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// A message carried a payload of the wrong shape for its protocol id.
    #[error("unexpected payload on protocol {protocol}: expected {expected}")]
    UnexpectedPayload {
        protocol: u16,
        expected: &'static str,
    },

    /// An application handler failed.
    #[error("handler failed: {0}")]
    Handler(String),

    /// A handler or receive-loop thread could not be started.
    #[error("failed to spawn thread: {0}")]
    Spawn(std::io::Error),
}

impl ConnError {
    /// Wrap an application error raised inside a handler.
    pub fn handler(err: impl std::fmt::Display) -> Self {
        Self::Handler(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConnError>;
