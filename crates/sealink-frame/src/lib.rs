//! Fixed-header message framing with protocol-id multiplexing.
//!
//! Every message is framed with an 8-byte little-endian header:
//! - A 4-byte payload length (bytes as transmitted)
//! - A 1-byte "encrypted" flag
//! - A 1-byte "is JSON" flag
//! - A 2-byte protocol id used to pick a handler on the receiving side
//!
//! Callers always see whole frames; partial reads are handled here.

pub mod codec;
pub mod error;
pub mod protocol;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, decode_header, encode_frame, Flags, Frame, FrameConfig, Header,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use protocol::{DEFAULT, DELIVER_PUBLIC_KEY, REQUEST_PUBLIC_KEY, USER_PROTOCOL_START};
pub use reader::FrameReader;
pub use writer::FrameWriter;
