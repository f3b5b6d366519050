//! Error types for media decryption.

use thiserror::Error;

/// Errors that can occur while decrypting a media blob.
#[derive(Debug, Error)]
pub enum DecryptError {
    /// Media key is not valid base64.
    #[error("invalid base64 media key: {0}")]
    InvalidMediaKey(#[from] base64::DecodeError),

    /// Context info is not valid hex.
    #[error("invalid hex context info: {0}")]
    InvalidContextInfo(#[from] hex::FromHexError),

    /// Ciphertext (without trailer) is empty or not block aligned.
    #[error(
        "invalid ciphertext length: {0} bytes left after removing the 10 byte trailer, expected a positive multiple of 16"
    )]
    InvalidLength(usize),

    /// HKDF refused to expand the key material.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// PKCS#7 padding check failed after decryption.
    #[error("bad padding: decrypted data is not PKCS#7 padded (wrong key or corrupted data)")]
    BadPadding,

    /// Trailer does not match the HMAC over iv and ciphertext.
    #[error("media MAC mismatch: blob was tampered with or keys are wrong")]
    MacMismatch,
}

impl DecryptError {
    /// Returns true if the input itself was malformed (encoding or length).
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidMediaKey(_) | Self::InvalidContextInfo(_) | Self::InvalidLength(_)
        )
    }

    /// Returns true if the input was well formed but did not decrypt.
    pub fn is_crypto_error(&self) -> bool {
        !self.is_format_error()
    }
}

/// Result type for decryption operations.
pub type Result<T> = std::result::Result<T, DecryptError>;
