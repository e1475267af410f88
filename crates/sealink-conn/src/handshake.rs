//! Built-in handlers for the public-key exchange.
//!
//! A peer that wants to send encrypted traffic asks for the other side's key on
//! [`REQUEST_PUBLIC_KEY`]; the answer arrives on [`DELIVER_PUBLIC_KEY`] and is
//! installed as the recipient key. From then on, every send is encrypted.

use sealink_frame::{DELIVER_PUBLIC_KEY, REQUEST_PUBLIC_KEY};
use tracing::debug;

use crate::connection::Connection;
use crate::error::{ConnError, Result};
use crate::message::{Message, Payload};

/// Reply with the local public key, or an empty payload if there is none.
pub fn request_public_key(conn: &Connection, message: Message) -> Result<()> {
    debug!(conn = conn.id(), protocol = message.protocol, "public key requested");
    match conn.public_key_pem()? {
        Some(pem) => conn.send(pem, DELIVER_PUBLIC_KEY),
        None => conn.send(Payload::Empty, DELIVER_PUBLIC_KEY),
    }
}

/// Install the delivered key as the recipient key. An empty payload clears it.
pub fn deliver_public_key(conn: &Connection, message: Message) -> Result<()> {
    match message.data {
        Payload::Empty => {
            debug!(conn = conn.id(), "peer has no public key, clearing recipient key");
            conn.clear_recipient_key();
            Ok(())
        }
        Payload::Bytes(pem) if !message.encrypted => conn.set_recipient_key_pem(&pem),
        _ => Err(ConnError::UnexpectedPayload {
            protocol: DELIVER_PUBLIC_KEY,
            expected: "PEM public key",
        }),
    }
}

/// Ask the peer for its public key.
pub fn request(conn: &Connection) -> Result<()> {
    conn.send(Payload::Empty, REQUEST_PUBLIC_KEY)
}
