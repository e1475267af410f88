/// Errors that can occur in key handling and per-message encryption.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The key bytes are not a PEM key in a supported encoding.
    #[error("invalid {kind} key: {reason}")]
    InvalidKey { kind: &'static str, reason: String },

    /// Key generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// A key could not be serialized.
    #[error("key encoding failed: {0}")]
    Encoding(String),

    /// The plaintext does not fit in one OAEP block for this key.
    #[error("plaintext too large for recipient key ({size} bytes, max {max})")]
    PlaintextTooLarge { size: usize, max: usize },

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed (wrong key or corrupted ciphertext).
    #[error("decryption failed: {0}")]
    Decryption(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
