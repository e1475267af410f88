//! Byte-stream endpoints for sealink.
//!
//! This is the lowest layer: it only establishes and tears down bidirectional
//! byte streams. Framing, encryption and dispatch live in the crates above it.
//! - TCP streams and listeners (all platforms)
//! - Unix domain stream pairs for in-process wiring and tests (Unix only)

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, StreamError};
pub use stream::Stream;
pub use tcp::TcpEndpoint;
