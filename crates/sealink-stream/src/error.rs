use std::net::SocketAddr;

/// Errors that can occur while establishing or using a byte stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the stream.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The address did not resolve to any socket address.
    #[error("address {0} did not resolve")]
    Unresolved(String),

    /// The peer address is not available for this stream kind.
    #[error("no peer address for {0}")]
    NoPeerAddr(&'static str),
}

impl StreamError {
    /// Build a connect error for an already-resolved address.
    pub(crate) fn connect_to(addr: SocketAddr, source: std::io::Error) -> Self {
        Self::Connect {
            addr: addr.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
