use crate::{
    BLOCK_SIZE, TRAILER_LEN,
    error::{DecryptError, Result},
    keys::MediaKeys,
};
use aes::cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Decrypts media blobs for one set of [`MediaKeys`].
///
/// By default the 10 byte trailer is stripped without being checked. Use
/// [`MediaDecrypter::verify_mac`] to authenticate the blob before decrypting.
#[derive(Clone, Debug)]
pub struct MediaDecrypter {
    keys: MediaKeys,
    verify_mac: bool,
}

impl MediaDecrypter {
    pub fn new(keys: MediaKeys) -> Self {
        Self {
            keys,
            verify_mac: false,
        }
    }

    /// Build from a base64 media key and hex context info.
    pub fn from_encoded(media_key: &str, context_info: &str) -> Result<Self> {
        Ok(Self::new(MediaKeys::from_encoded(media_key, context_info)?))
    }

    /// Check the trailer against `HMAC-SHA256(mac_key, iv || ciphertext)[..10]`.
    pub fn verify_mac(mut self, verify: bool) -> Self {
        self.verify_mac = verify;
        self
    }

    pub fn keys(&self) -> &MediaKeys {
        &self.keys
    }

    /// Decrypt `data` (ciphertext followed by the 10 byte trailer).
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        let (ciphertext, trailer) = split_trailer(data)?;

        if self.verify_mac {
            self.check_mac(ciphertext, trailer)?;
        }

        let mut buffer = ciphertext.to_vec();
        let plain_len = Aes256CbcDec::new((&self.keys.cipher_key).into(), (&self.keys.iv).into())
            .decrypt_padded_mut::<Pkcs7>(&mut buffer)
            .map_err(|_| DecryptError::BadPadding)?
            .len();

        buffer.truncate(plain_len);
        Ok(buffer)
    }

    fn check_mac(&self, ciphertext: &[u8], trailer: &[u8]) -> Result<()> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.keys.mac_key)
            .map_err(|x| DecryptError::KeyDerivation(x.to_string()))?;
        mac.update(&self.keys.iv);
        mac.update(ciphertext);
        mac.verify_truncated_left(trailer)
            .map_err(|_| DecryptError::MacMismatch)
    }
}

/// Decrypt a downloaded media blob.
///
/// # Arguments
///
/// * `data` - Downloaded bytes, i.e. AES-256-CBC ciphertext followed by a 10 byte MAC.
/// * `media_key` - Base64 encoded media key of the attachment.
/// * `context_info` - Hex encoded HKDF info, see [`MediaType::context_info`](crate::MediaType::context_info).
///
/// The trailer is not verified, use [`MediaDecrypter`] for that.
pub fn decrypt(data: &[u8], media_key: &str, context_info: &str) -> Result<Vec<u8>> {
    MediaDecrypter::from_encoded(media_key, context_info)?.decrypt(data)
}

fn split_trailer(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let body_len = data.len().saturating_sub(TRAILER_LEN);

    if data.len() < TRAILER_LEN || body_len == 0 || body_len % BLOCK_SIZE != 0 {
        return Err(DecryptError::InvalidLength(body_len));
    }

    Ok(data.split_at(body_len))
}
