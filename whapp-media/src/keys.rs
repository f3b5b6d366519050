use crate::error::{DecryptError, Result};
use base64::Engine;
use hkdf::Hkdf;
use sha2::Sha256;

/// Number of bytes expanded from a media key.
pub const KEY_MATERIAL_LEN: usize = 112;

/// Key schedule of a single media attachment.
///
/// Derivation is deterministic, same media key and context info always produce
/// the same keys.
#[derive(Clone, PartialEq, Eq)]
pub struct MediaKeys {
    pub iv: [u8; 16],
    pub cipher_key: [u8; 32],
    pub mac_key: [u8; 32],
    pub ref_key: [u8; 32],
}

impl MediaKeys {
    /// Expand raw media key bytes with HKDF-SHA256 (no salt) using `context_info` as info.
    pub fn derive(media_key: &[u8], context_info: &[u8]) -> Result<Self> {
        let mut material = [0_u8; KEY_MATERIAL_LEN];
        Hkdf::<Sha256>::new(None, media_key)
            .expand(context_info, &mut material)
            .map_err(|x| DecryptError::KeyDerivation(x.to_string()))?;

        let mut keys = Self {
            iv: [0; 16],
            cipher_key: [0; 32],
            mac_key: [0; 32],
            ref_key: [0; 32],
        };

        keys.iv.copy_from_slice(&material[..16]);
        keys.cipher_key.copy_from_slice(&material[16..48]);
        keys.mac_key.copy_from_slice(&material[48..80]);
        keys.ref_key.copy_from_slice(&material[80..]);
        Ok(keys)
    }

    /// Same as [`MediaKeys::derive`] but takes the media key as base64 and the
    /// context info as hex, the way both travel over the wire.
    pub fn from_encoded(media_key: &str, context_info: &str) -> Result<Self> {
        let media_key = base64::engine::general_purpose::STANDARD.decode(media_key.trim())?;
        let context_info = hex::decode(context_info.trim())?;
        Self::derive(&media_key, &context_info)
    }
}

// Key bytes stay out of logs.
impl std::fmt::Debug for MediaKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaKeys").finish_non_exhaustive()
    }
}
