//! Framed, optionally RSA-encrypted message connections.
//!
//! sealink sends length-prefixed messages over TCP (or any byte stream), tags
//! each one with a protocol id for dispatch, and can encrypt payloads with the
//! peer's RSA public key after a built-in key exchange.
//!
//! # Crate Structure
//!
//! - [`stream`]: byte streams and the TCP endpoint
//! - [`frame`]: the 8-byte header codec and blocking frame reader/writer
//! - [`crypto`]: RSA keys and per-message OAEP encryption
//! - [`conn`]: connections, handler dispatch and the connection context (behind `conn` feature)

/// Re-export stream types.
pub mod stream {
    pub use sealink_stream::*;
}

/// Re-export frame types.
pub mod frame {
    pub use sealink_frame::*;
}

/// Re-export key and encryption types.
pub mod crypto {
    pub use sealink_crypto::*;
}

/// Re-export connection types (requires `conn` feature).
#[cfg(feature = "conn")]
pub mod conn {
    pub use sealink_conn::*;
}
