//! Bridge between an automated WhatsApp web session and a controller process.
//!
//! The controller listens on a TCP port. The bridge connects, writes its
//! session id on the first line and then exchanges newline delimited json:
//!
//! ```text
//! -> {"event": "qr", "args": [{"code": "2@..."}]}
//! -> {"event": "ok", "args": [{"id": "qr"}]}
//! -> {"event": "chat", "args": [{"id": "123@c.us", "name": "Alice"}]}
//! <- {"command": "send", "args": ["123@c.us", "hello", null]}
//! -> {"event": "unread-messages", "args": [{"chat": {...}, "messages": [...]}]}
//! <- {"command": "download", "args": ["7", {"sourceUrl": "...", "mediaKey": "...", "type": "image"}]}
//! -> {"event": "download-ready", "args": ["7", "<base64 plaintext>"]}
//! ```
//!
//! Every call into the [`Session`] goes through one [`SessionLock`], shared by
//! the command loop and the unread poll loop. Failures while handling a
//! command or a poll are written back as `error` events.
//!
//! # Example
//!
//! ```no_run
//! use whapp_bridge::{Bridge, BridgeConfig, ChromeOptions, ChromeSession};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let session = ChromeSession::new(ChromeOptions::default())?;
//! let mut bridge = Bridge::new(session, BridgeConfig::new("session-1"));
//! bridge.connect("127.0.0.1:4000").await?;
//! # Ok(())
//! # }
//! ```

mod bridge;
mod commands;
mod error;
mod http;
mod logger;
mod protocol;
mod session;
mod transport;

#[doc(hidden)]
pub use commands::{Args, Commands};
#[doc(hidden)]
pub use logger::Logger;

pub use bridge::{Bridge, BridgeConfig, BridgeState, LoginCodeRequest, SessionLock};
pub use error::BridgeError;
pub use protocol::{Command, ErrorDetail, Event, FormattedMessage, UnreadGroup};
#[cfg(feature = "browser")]
pub use session::{ChromeOptions, ChromeSession};
pub use session::{Chat, Contact, ContactNames, Message, MessageGroup, MessageInfo, Session, SessionError};
pub use transport::{EventSink, LineReader, LineWriter, MAX_LINE_LENGTH, spawn_writer};
pub use whapp_media;
