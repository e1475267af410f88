use std::fmt;
use std::io;

use sealink_conn::{ConnError, ContextError};
use sealink_crypto::CryptoError;
use sealink_frame::FrameError;
use sealink_stream::StreamError;

// Exit code constants.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const STREAM_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const CRYPTO_ERROR: i32 = 70;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn stream_error(context: &str, err: StreamError) -> CliError {
    match err {
        StreamError::Bind { source, .. }
        | StreamError::Connect { source, .. }
        | StreamError::Accept(source)
        | StreamError::Io(source) => io_error(context, source),
        other => CliError::new(STREAM_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::Stream(err) => stream_error(context, err),
        FrameError::PayloadTooLarge { .. } | FrameError::InvalidFlag { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::Truncated { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn crypto_error(context: &str, err: CryptoError) -> CliError {
    match err {
        CryptoError::PlaintextTooLarge { .. } | CryptoError::InvalidKey { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(CRYPTO_ERROR, format!("{context}: {other}")),
    }
}

pub fn conn_error(context: &str, err: ConnError) -> CliError {
    match err {
        ConnError::Stream(err) => stream_error(context, err),
        ConnError::Frame(err) => frame_error(context, err),
        ConnError::Crypto(err) => crypto_error(context, err),
        ConnError::Json(err) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        ConnError::UnexpectedPayload { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        ConnError::Context(ContextError::Unbound) => {
            CliError::new(INTERNAL, format!("{context}: {err}"))
        }
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_map_to_codes() {
        let err = io_error("x", io::Error::from(io::ErrorKind::TimedOut));
        assert_eq!(err.code, TIMEOUT);
        let err = io_error("x", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(err.code, PERMISSION_DENIED);
    }

    #[test]
    fn nested_errors_keep_their_category() {
        let err = conn_error(
            "send failed",
            ConnError::Crypto(CryptoError::PlaintextTooLarge { size: 300, max: 190 }),
        );
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("send failed: "));

        let err = conn_error(
            "receive failed",
            ConnError::Frame(FrameError::Io(io::Error::from(io::ErrorKind::WouldBlock))),
        );
        assert_eq!(err.code, TIMEOUT);

        let err = conn_error(
            "connect failed",
            ConnError::Stream(StreamError::Unresolved("nowhere".into())),
        );
        assert_eq!(err.code, STREAM_ERROR);
    }
}
