use std::sync::{Mutex, RwLock};

use bytes::Bytes;
use sealink_crypto::{PrivateKey, PublicKey};
use sealink_frame::{Flags, FrameConfig, FrameError, FrameReader, FrameWriter};
use sealink_stream::Stream;
use tracing::{debug, warn};

use crate::error::Result;
use crate::message::{Message, Payload};
use crate::sync::{lock, read, write};

/// Keys held by one transport.
///
/// Without a recipient key, outbound messages go out in plaintext. Without a
/// private key, inbound encrypted messages are handed up undecrypted.
#[derive(Debug, Clone, Default)]
pub struct KeyMaterial {
    pub private: Option<PrivateKey>,
    pub recipient: Option<PublicKey>,
}

/// Framed, optionally encrypted message transport over one [`Stream`].
///
/// Reads and writes use separate handles on the same socket and separate locks,
/// so one thread can block in [`Transport::recv`] while others send.
pub struct Transport {
    reader: Mutex<FrameReader<Stream>>,
    writer: Mutex<FrameWriter<Stream>>,
    control: Stream,
    keys: RwLock<KeyMaterial>,
}

impl Transport {
    pub fn new(stream: Stream) -> Result<Self> {
        Self::with_config(stream, FrameConfig::default())
    }

    pub fn with_config(stream: Stream, config: FrameConfig) -> Result<Self> {
        let reader_stream = stream.try_clone()?;
        let control = stream.try_clone()?;
        let reader = FrameReader::with_config_stream(reader_stream, config.clone())?;
        let writer = FrameWriter::with_config_stream(stream, config)?;

        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            control,
            keys: RwLock::new(KeyMaterial::default()),
        })
    }

    /// Send one message.
    ///
    /// `None` and an empty slice both go out as a zero-length payload. With a
    /// recipient key installed the payload is RSA-OAEP encrypted first; a payload
    /// over the key's capacity fails before anything is written. A failed write
    /// shuts the stream down, since the peer may have seen half a frame.
    pub fn send(&self, payload: Option<&[u8]>, is_json: bool, protocol: u16) -> Result<()> {
        let plaintext = payload.unwrap_or_default();

        let ciphertext = {
            let keys = read(&self.keys);
            match &keys.recipient {
                Some(key) => Some(sealink_crypto::encrypt(key, plaintext)?),
                None => None,
            }
        };
        let (wire, encrypted) = match &ciphertext {
            Some(bytes) => (bytes.as_slice(), true),
            None => (plaintext, false),
        };

        let flags = Flags { encrypted, is_json };
        let result = lock(&self.writer).send(protocol, flags, wire);
        if let Err(FrameError::Io(err)) = &result {
            warn!(protocol, error = %err, "write failed, shutting stream down");
            if let Err(shutdown_err) = self.control.shutdown() {
                debug!(error = %shutdown_err, "shutdown after failed write");
            }
        }
        result?;

        debug!(protocol, size = wire.len(), encrypted, is_json, "message sent");
        Ok(())
    }

    /// Receive the next message (blocking).
    ///
    /// Returns `Ok(None)` once the peer has closed the stream.
    pub fn recv(&self) -> Result<Option<Message>> {
        let Some(frame) = lock(&self.reader).read_frame()? else {
            return Ok(None);
        };

        let mut still_encrypted = false;
        let data = if frame.flags.encrypted {
            let keys = read(&self.keys);
            match &keys.private {
                Some(key) => Bytes::from(sealink_crypto::decrypt(key, &frame.payload)?),
                None => {
                    still_encrypted = true;
                    frame.payload
                }
            }
        } else {
            frame.payload
        };

        debug!(
            protocol = frame.protocol,
            size = data.len(),
            encrypted = frame.flags.encrypted,
            "message received"
        );

        Ok(Some(Message {
            encrypted: still_encrypted,
            is_json: frame.flags.is_json,
            protocol: frame.protocol,
            data: Payload::from_wire(data),
        }))
    }

    pub fn set_private_key(&self, key: PrivateKey) {
        debug!(fingerprint = %key.public_key().fingerprint(), "private key installed");
        write(&self.keys).private = Some(key);
    }

    pub fn set_private_key_pem(&self, pem: &[u8]) -> Result<()> {
        self.set_private_key(PrivateKey::from_pem(pem)?);
        Ok(())
    }

    pub fn clear_private_key(&self) {
        write(&self.keys).private = None;
    }

    /// Local private key as PKCS#8 PEM.
    pub fn private_key_pem(&self) -> Result<Option<Vec<u8>>> {
        match &read(&self.keys).private {
            Some(key) => Ok(Some(key.to_pem()?.to_vec())),
            None => Ok(None),
        }
    }

    /// Public half of the local private key, as SPKI PEM.
    pub fn public_key_pem(&self) -> Result<Option<Vec<u8>>> {
        match &read(&self.keys).private {
            Some(key) => Ok(Some(key.public_key().to_pem()?)),
            None => Ok(None),
        }
    }

    pub fn set_recipient_key(&self, key: PublicKey) {
        debug!(fingerprint = %key.fingerprint(), "recipient key installed");
        write(&self.keys).recipient = Some(key);
    }

    pub fn set_recipient_key_pem(&self, pem: &[u8]) -> Result<()> {
        self.set_recipient_key(PublicKey::from_pem(pem)?);
        Ok(())
    }

    pub fn recipient_key_pem(&self) -> Result<Option<Vec<u8>>> {
        match &read(&self.keys).recipient {
            Some(key) => Ok(Some(key.to_pem()?)),
            None => Ok(None),
        }
    }

    pub fn clear_recipient_key(&self) {
        if write(&self.keys).recipient.take().is_some() {
            debug!("recipient key cleared");
        }
    }

    pub fn has_private_key(&self) -> bool {
        read(&self.keys).private.is_some()
    }

    pub fn has_recipient_key(&self) -> bool {
        read(&self.keys).recipient.is_some()
    }

    /// Snapshot of the installed keys.
    pub fn keys(&self) -> KeyMaterial {
        read(&self.keys).clone()
    }

    /// Shut down both directions of the stream. A blocked [`Transport::recv`]
    /// wakes up with the closed signal.
    pub fn shutdown(&self) -> Result<()> {
        self.control.shutdown()?;
        Ok(())
    }

    pub fn stream_kind(&self) -> &'static str {
        self.control.kind()
    }

    pub fn peer_addr(&self) -> Option<std::net::SocketAddr> {
        self.control.peer_addr().ok()
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("stream", &self.control)
            .field("keys", &*read(&self.keys))
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use sealink_crypto::CryptoError;
    use sealink_frame::FrameReader;
    use serde_json::json;

    use super::*;
    use crate::error::ConnError;
    use crate::test_support::{other_test_key, test_key};

    fn pair() -> (Transport, Transport) {
        let (left, right) = Stream::pair().expect("stream pair");
        (
            Transport::new(left).expect("left transport"),
            Transport::new(right).expect("right transport"),
        )
    }

    #[test]
    fn plaintext_roundtrip() {
        let (a, b) = pair();
        a.send(Some(b"hello".as_slice()), false, 20).expect("send");

        let message = b.recv().expect("recv").expect("message");
        assert_eq!(
            message,
            Message {
                encrypted: false,
                is_json: false,
                protocol: 20,
                data: Payload::Bytes(Bytes::from_static(b"hello")),
            }
        );
    }

    #[test]
    fn none_and_empty_both_arrive_empty() {
        let (a, b) = pair();
        a.send(None, false, 0).expect("send none");
        a.send(Some(&[][..]), true, 3).expect("send empty");

        let first = b.recv().expect("recv").expect("message");
        let second = b.recv().expect("recv").expect("message");
        assert_eq!(first.data, Payload::Empty);
        assert_eq!(second.data, Payload::Empty);
        assert!(second.is_json);
        assert_eq!(second.protocol, 3);
    }

    #[test]
    fn closed_peer_yields_none() {
        let (a, b) = pair();
        drop(a);
        assert!(b.recv().expect("recv").is_none());
    }

    #[test]
    fn encrypted_roundtrip_with_private_key() {
        let (a, b) = pair();
        a.set_recipient_key(test_key().public_key().clone());
        b.set_private_key(test_key().clone());

        let body = serde_json::to_vec(&json!({"x": 1})).expect("json");
        a.send(Some(body.as_slice()), true, 5).expect("send");

        let message = b.recv().expect("recv").expect("message");
        assert!(!message.encrypted);
        assert!(message.is_json);
        assert_eq!(message.bytes(), Some(body.as_slice()));
    }

    #[test]
    fn encryption_changes_the_wire_bytes() {
        let (left, right) = Stream::pair().expect("stream pair");
        let a = Transport::new(left).expect("transport");
        let mut raw = FrameReader::new(right);
        a.set_recipient_key(test_key().public_key().clone());

        a.send(Some(b"plain words".as_slice()), false, 7).expect("send");

        let frame = raw.read_frame().expect("read").expect("frame");
        assert!(frame.flags.encrypted);
        assert_eq!(frame.payload.len(), test_key().public_key().size());
        assert_ne!(frame.payload.as_ref(), b"plain words");
    }

    #[test]
    fn without_private_key_ciphertext_stays_opaque() {
        let (a, b) = pair();
        a.set_recipient_key(test_key().public_key().clone());
        a.send(Some(b"secret".as_slice()), false, 9).expect("send");

        let message = b.recv().expect("recv").expect("message");
        assert!(message.encrypted);
        let bytes = message.bytes().expect("ciphertext bytes");
        assert_eq!(bytes.len(), test_key().public_key().size());
        assert_ne!(bytes, b"secret");
    }

    #[test]
    fn capacity_boundary() {
        let (a, b) = pair();
        let key = test_key();
        a.set_recipient_key(key.public_key().clone());
        b.set_private_key(key.clone());
        let capacity = key.public_key().max_plaintext_len();

        let fits = vec![0x5a; capacity];
        a.send(Some(fits.as_slice()), false, 16).expect("capacity-sized payload");
        let message = b.recv().expect("recv").expect("message");
        assert_eq!(message.bytes(), Some(fits.as_slice()));

        let over = vec![0x5a; capacity + 1];
        let err = a.send(Some(over.as_slice()), false, 16).expect_err("over capacity");
        assert!(matches!(
            err,
            ConnError::Crypto(CryptoError::PlaintextTooLarge { size, max })
                if size == capacity + 1 && max == capacity
        ));
    }

    #[test]
    fn wrong_private_key_fails_decryption() {
        let (a, b) = pair();
        a.set_recipient_key(test_key().public_key().clone());
        b.set_private_key(other_test_key().clone());

        a.send(Some(b"for someone else".as_slice()), false, 16).expect("send");
        assert!(matches!(
            b.recv(),
            Err(ConnError::Crypto(CryptoError::Decryption(_)))
        ));
    }

    #[test]
    fn key_pem_accessors() {
        let (a, _b) = pair();
        assert!(a.public_key_pem().expect("pem").is_none());
        assert!(a.recipient_key_pem().expect("pem").is_none());

        let private_pem = test_key().to_pem().expect("private pem");
        a.set_private_key_pem(&private_pem).expect("install private key");
        let public_pem = a.public_key_pem().expect("pem").expect("public key");
        assert_eq!(public_pem, test_key().public_key().to_pem().expect("pem"));
        assert_eq!(
            a.private_key_pem().expect("pem").expect("private key"),
            private_pem.to_vec()
        );

        a.set_recipient_key_pem(&public_pem).expect("install recipient");
        assert!(a.has_recipient_key());
        a.clear_recipient_key();
        assert!(!a.has_recipient_key());

        assert!(matches!(
            a.set_recipient_key_pem(b"junk"),
            Err(ConnError::Crypto(CryptoError::InvalidKey { .. }))
        ));
    }

    fn send_until_failure(transport: &Transport) -> ConnError {
        for _ in 0..64 {
            if let Err(err) = transport.send(Some(b"into the void".as_slice()), false, 16) {
                return err;
            }
        }
        panic!("send never failed after the peer went away");
    }

    #[test]
    fn failed_write_closes_local_reader() {
        let (a, b) = pair();
        drop(b);

        let err = send_until_failure(&a);
        assert!(matches!(err, ConnError::Frame(FrameError::Io(_))));
        assert!(a.recv().expect("recv after failed write").is_none());
    }

    #[test]
    fn shutdown_wakes_blocked_recv() {
        let (a, _b) = pair();
        let a = std::sync::Arc::new(a);
        let reader = std::sync::Arc::clone(&a);
        let handle = std::thread::spawn(move || reader.recv());

        std::thread::sleep(std::time::Duration::from_millis(50));
        a.shutdown().expect("shutdown");

        let result = handle.join().expect("reader thread");
        assert!(result.expect("recv after shutdown").is_none());
    }
}
