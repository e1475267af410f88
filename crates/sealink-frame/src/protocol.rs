//! Reserved protocol ids.
//!
//! Ids below [`USER_PROTOCOL_START`] are reserved for built-in use; only 0-2 are
//! currently assigned. Nothing stops an application from registering a handler
//! on a low id, but the built-in key exchange owns 1 and 2.

/// Untagged messages.
pub const DEFAULT: u16 = 0;

/// Ask the peer for its public key (empty payload).
pub const REQUEST_PUBLIC_KEY: u16 = 1;

/// Deliver a PEM-encoded public key.
pub const DELIVER_PUBLIC_KEY: u16 = 2;

/// First id conventionally left to applications.
pub const USER_PROTOCOL_START: u16 = 16;

/// Returns a human-readable name for a protocol id.
pub fn protocol_name(id: u16) -> &'static str {
    match id {
        DEFAULT => "DEFAULT",
        REQUEST_PUBLIC_KEY => "REQUEST_PUBLIC_KEY",
        DELIVER_PUBLIC_KEY => "DELIVER_PUBLIC_KEY",
        3..=15 => "RESERVED",
        _ => "USER",
    }
}

/// Returns true if the id belongs to the built-in key exchange.
pub fn is_key_exchange(id: u16) -> bool {
    id == REQUEST_PUBLIC_KEY || id == DELIVER_PUBLIC_KEY
}

/// Returns true if the id is in the reserved range.
pub fn is_reserved(id: u16) -> bool {
    id < USER_PROTOCOL_START
}
