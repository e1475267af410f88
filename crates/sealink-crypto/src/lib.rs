//! RSA key material and per-message OAEP encryption.
//!
//! Each message is encrypted directly with the recipient's public key using
//! RSA-OAEP (MGF1/SHA-256, empty label). There is no symmetric session key, so a
//! single message can carry at most [`PublicKey::max_plaintext_len`] bytes.
//!
//! Keys travel as PEM bytes:
//! - public keys are written as SPKI and read as SPKI or PKCS#1
//! - private keys are written as PKCS#8 and read as PKCS#8 or PKCS#1

pub mod error;
pub mod keys;
pub mod oaep;

pub use error::{CryptoError, Result};
pub use keys::{PrivateKey, PublicKey, DEFAULT_KEY_BITS};
pub use oaep::{decrypt, encrypt, max_plaintext_len, OAEP_OVERHEAD};
