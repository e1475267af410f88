use rand::rngs::OsRng;
use rsa::Oaep;
use sha2::Sha256;

use crate::error::{CryptoError, Result};
use crate::keys::{PrivateKey, PublicKey};

/// OAEP padding overhead for SHA-256: two digests plus two marker bytes.
pub const OAEP_OVERHEAD: usize = 2 * 32 + 2;

/// Plaintext capacity of one OAEP block for a modulus of `modulus_len` bytes.
pub fn max_plaintext_len(modulus_len: usize) -> usize {
    modulus_len.saturating_sub(OAEP_OVERHEAD)
}

fn padding() -> Oaep {
    Oaep::new::<Sha256>()
}

/// Encrypt `plaintext` for the owner of `key`.
///
/// Fails with [`CryptoError::PlaintextTooLarge`] when the message does not fit in
/// one block; the input is never truncated.
pub fn encrypt(key: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let max = key.max_plaintext_len();
    if plaintext.len() > max {
        return Err(CryptoError::PlaintextTooLarge {
            size: plaintext.len(),
            max,
        });
    }

    key.as_rsa()
        .encrypt(&mut OsRng, padding(), plaintext)
        .map_err(|err| CryptoError::Encryption(err.to_string()))
}

/// Decrypt a ciphertext produced by [`encrypt`] with the matching public key.
pub fn decrypt(key: &PrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
    key.as_rsa()
        .decrypt(padding(), ciphertext)
        .map_err(|err| CryptoError::Decryption(err.to_string()))
}
