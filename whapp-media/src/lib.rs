#![cfg_attr(docsrs, feature(doc_cfg))]

//! This crate decrypts media attachments (images, videos, audio, documents)
//! which the WhatsApp web client stores encrypted on its media servers.
//!
//! Every attachment carries a base64 encoded 32 byte media key. Together with a
//! context string which depends upon the media class, it is expanded with
//! HKDF-SHA256 into 112 bytes of key material:
//!
//! | Bytes      | Use                        |
//! |------------|----------------------------|
//! | `0..16`    | AES-CBC initialization vector |
//! | `16..48`   | AES-256 cipher key         |
//! | `48..80`   | HMAC-SHA256 key            |
//! | `80..112`  | reference key (unused)     |
//!
//! The downloaded blob is the CBC ciphertext followed by a 10 byte truncated MAC.
//!
//! # Example
//!
//! ```no_run
//! let data = std::fs::read("media.enc")?;
//! let plain = whapp_media::decrypt(
//!     &data,
//!     "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=",
//!     "576861747341707020496d616765204b657973",
//! )?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Optional Features
//!
//! - **serde** (default): Implements `Serialize` / `Deserialize` for
//!   [`MediaDescriptor`] and [`MediaType`].

mod decrypter;
mod descriptor;
mod error;
mod keys;
mod media_type;

pub use decrypter::{MediaDecrypter, decrypt};
pub use descriptor::MediaDescriptor;
pub use error::{DecryptError, Result};
pub use keys::{KEY_MATERIAL_LEN, MediaKeys};
pub use media_type::MediaType;

/// Length of the truncated MAC appended to every encrypted blob.
pub const TRAILER_LEN: usize = 10;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;
