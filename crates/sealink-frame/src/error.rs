/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A header flag byte was neither 0 nor 1.
    #[error("invalid {field} flag byte {value:#04x} (expected 0 or 1)")]
    InvalidFlag { field: &'static str, value: u8 },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream could not be configured.
    #[error(transparent)]
    Stream(#[from] sealink_stream::StreamError),

    /// The peer closed the stream part-way through a frame.
    #[error("connection closed mid-frame ({buffered} bytes buffered)")]
    Truncated { buffered: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
