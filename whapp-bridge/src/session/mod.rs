//! Seam between the bridge and the automated messaging client.
//!
//! A [`Session`] is stateful and not safe for concurrent use; the bridge only
//! ever calls it through [`SessionLock`](crate::SessionLock).

#[cfg(feature = "browser")]
mod chrome;
mod model;

#[cfg(feature = "browser")]
pub use chrome::{ChromeOptions, ChromeSession};
pub use model::{Chat, Contact, ContactNames, Message, MessageGroup, MessageInfo};

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use whapp_media::MediaDescriptor;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is logged out")]
    LoggedOut,

    #[error("session is already logged in")]
    LoggedIn,

    #[error("login code request was cancelled")]
    Cancelled,

    /// Media blob could not be downloaded.
    #[error("{0}")]
    Fetch(String),

    #[error("{0}")]
    Driver(String),
}

#[async_trait]
pub trait Session: Send + 'static {
    /// Open the client and get ready for login.
    async fn connect(&mut self) -> Result<(), SessionError>;

    /// Blocking call returning the code to render as login QR.
    ///
    /// Runs on the blocking thread pool. Implementations must check `cancel`
    /// while waiting and return [`SessionError::Cancelled`] soon after it fires.
    fn request_login_code(&mut self, cancel: &CancellationToken) -> Result<String, SessionError>;

    /// Wait until the QR code has been scanned and the login is complete.
    async fn await_login(&mut self) -> Result<(), SessionError>;

    /// Lazily enumerate all chats.
    fn list_chats(&mut self) -> BoxStream<'_, Result<Chat, SessionError>>;

    async fn list_unread(
        &mut self,
        include_me: bool,
        include_notifications: bool,
    ) -> Result<Vec<MessageGroup>, SessionError>;

    async fn send_message(
        &mut self,
        chat_id: &str,
        content: &str,
        reply_id: Option<&str>,
    ) -> Result<(), SessionError>;

    /// Download the still encrypted blob of an attachment.
    async fn fetch_media_bytes(&mut self, media: &MediaDescriptor)
    -> Result<Vec<u8>, SessionError>;
}
