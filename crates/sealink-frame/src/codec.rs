use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: length (4) + encrypted (1) + is_json (1) + protocol (2) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Per-frame flag bits carried in the header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    /// Payload was encrypted with the recipient's public key.
    pub encrypted: bool,
    /// Payload is JSON text.
    pub is_json: bool,
}

impl Flags {
    /// Flags for a plaintext JSON payload.
    pub fn json() -> Self {
        Self {
            encrypted: false,
            is_json: true,
        }
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Payload length in bytes as transmitted.
    pub length: u32,
    /// Header flags.
    pub flags: Flags,
    /// Protocol id used for dispatch.
    pub protocol: u16,
}

/// A framed message with protocol routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Protocol id this message belongs to.
    pub protocol: u16,
    /// Header flags.
    pub flags: Flags,
    /// The payload as transmitted (ciphertext when `flags.encrypted`).
    pub payload: Bytes,
}

impl Frame {
    /// Create a plaintext, non-JSON frame.
    pub fn new(protocol: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            protocol,
            flags: Flags::default(),
            payload: payload.into(),
        }
    }

    /// Replace the header flags.
    pub fn with_flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format (all integers little-endian):
/// ```text
/// ┌────────────┬───────────┬─────────┬────────────┬──────────────────┐
/// │ Length     │ Encrypted │ IsJson  │ Protocol   │ Payload          │
/// │ (4B LE)    │ (1B 0/1)  │ (1B 0/1)│ (2B LE)    │ (Length bytes)   │
/// └────────────┴───────────┴─────────┴────────────┴──────────────────┘
/// ```
pub fn encode_frame(protocol: u16, flags: Flags, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32_le(payload.len() as u32);
    dst.put_u8(u8::from(flags.encrypted));
    dst.put_u8(u8::from(flags.is_json));
    dst.put_u16_le(protocol);
    dst.put_slice(payload);
    Ok(())
}

/// Decode the fixed-size header.
pub fn decode_header(mut src: &[u8]) -> Result<Header> {
    if src.len() < HEADER_SIZE {
        return Err(FrameError::Truncated {
            buffered: src.len(),
        });
    }

    let length = src.get_u32_le();
    let encrypted = decode_flag("encrypted", src.get_u8())?;
    let is_json = decode_flag("is_json", src.get_u8())?;
    let protocol = src.get_u16_le();

    Ok(Header {
        length,
        flags: Flags { encrypted, is_json },
        protocol,
    })
}

fn decode_flag(field: &'static str, value: u8) -> Result<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        value => Err(FrameError::InvalidFlag { field, value }),
    }
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let header = decode_header(&src[..HEADER_SIZE])?;
    let payload_len = header.length as usize;

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame {
        protocol: header.protocol,
        flags: header.flags,
        payload,
    }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations. Default: none.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations. Default: none.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
