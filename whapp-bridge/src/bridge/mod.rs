mod dispatch;
mod lock;
mod login;
mod poll;

pub use lock::SessionLock;
pub use login::LoginCodeRequest;

use crate::{
    error::BridgeError,
    protocol::Event,
    session::{Session, SessionError},
    transport::{self, EventSink, LineReader, LineWriter},
};
use futures::StreamExt;
use log::{debug, info};
use std::{fmt, future::Future, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpStream, ToSocketAddrs},
};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// First line written to the controller.
    pub session_id: String,
    pub poll_interval: Duration,
    /// Report messages sent from this account.
    pub include_me: bool,
    pub include_notifications: bool,
    /// Fetch and decrypt attachments of unread messages into their body.
    pub inline_media: bool,
    pub verify_mac: bool,
    /// Capacity of the queue in front of the writer task.
    pub event_buffer: usize,
}

impl BridgeConfig {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            session_id: String::new(),
            poll_interval: Duration::from_millis(500),
            include_me: true,
            include_notifications: false,
            inline_media: true,
            verify_mac: false,
            event_buffer: 64,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BridgeState {
    #[default]
    Disconnected,
    Connecting,
    AwaitingQr,
    AwaitingLogin,
    Ready,
    Terminated,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Disconnected => "disconnected",
                Self::Connecting => "connecting",
                Self::AwaitingQr => "awaiting-qr",
                Self::AwaitingLogin => "awaiting-login",
                Self::Ready => "ready",
                Self::Terminated => "terminated",
            }
        )
    }
}

/// Connects one session to one controller.
///
/// Owns the [`SessionLock`] that every session call goes through, and a
/// shutdown token which ends the run cleanly from any state.
pub struct Bridge<S> {
    config: BridgeConfig,
    session: SessionLock<S>,
    shutdown: CancellationToken,
    state: BridgeState,
}

impl<S: Session> Bridge<S> {
    pub fn new(session: S, config: BridgeConfig) -> Self {
        Self {
            config,
            session: SessionLock::new(session),
            shutdown: CancellationToken::new(),
            state: BridgeState::Disconnected,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn session(&self) -> &SessionLock<S> {
        &self.session
    }

    /// Cancelling this token stops the bridge.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Open a TCP connection to the controller and [`run`](Self::run) over it.
    pub async fn connect(&mut self, addr: impl ToSocketAddrs) -> Result<(), BridgeError> {
        let stream = TcpStream::connect(addr).await?;

        if let Ok(addr) = stream.peer_addr() {
            info!("connected to controller at {}", addr);
        }

        let (reader, writer) = stream.into_split();
        self.run(reader, writer).await
    }

    /// Drive the whole lifecycle over an already open controller connection.
    pub async fn run<R, W>(&mut self, reader: R, writer: W) -> Result<(), BridgeError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.set_state(BridgeState::Connecting);
        let mut writer = LineWriter::new(writer);
        writer.write_line(&self.config.session_id).await?;

        let (events, written) = transport::spawn_writer(writer, self.config.event_buffer);
        let result = self.drive(LineReader::new(reader), events).await;
        // Every sink is gone now, so the writer drains and stops.
        let written = written.await?;
        self.set_state(BridgeState::Terminated);

        match &result {
            Ok(_) => info!("bridge stopped"),
            Err(e) => debug!("bridge failed: {}", e),
        }

        written.and(result)
    }

    async fn drive<R: AsyncRead + Unpin>(
        &mut self,
        mut reader: LineReader<R>,
        events: EventSink,
    ) -> Result<(), BridgeError> {
        self.set_state(BridgeState::AwaitingQr);

        match self.until_shutdown(self.connect_session()).await {
            Some(result) => result?,
            None => return Ok(()),
        }

        match self.request_code().await? {
            Some(code) => events.emit(Event::Qr(code)).await?,
            None if self.shutdown.is_cancelled() => return Ok(()),
            None => info!("session is already logged in, no login code needed"),
        }

        self.set_state(BridgeState::AwaitingLogin);

        match self.until_shutdown(self.login(&events)).await {
            Some(result) => result?,
            None => return Ok(()),
        }

        self.set_state(BridgeState::Ready);
        info!("session is ready");

        tokio::select! {
            result = dispatch::run(&mut reader, &self.session, &events, self.config.verify_mac) => result,
            result = poll::run(&self.session, &events, &self.config) => result,
            _ = events.closed() => Err(BridgeError::closed()),
            _ = self.shutdown.cancelled() => Ok(()),
        }
    }

    async fn connect_session(&self) -> Result<(), BridgeError> {
        self.session.lock().await.connect().await?;
        Ok(())
    }

    /// `None` when shutdown was requested first or the session is already
    /// logged in.
    async fn request_code(&self) -> Result<Option<String>, BridgeError> {
        let mut request = match self.until_shutdown(LoginCodeRequest::spawn(&self.session)).await {
            Some(x) => x,
            None => return Ok(None),
        };

        let outcome = tokio::select! {
            result = request.wait() => Some(result),
            _ = self.shutdown.cancelled() => None,
        };

        match outcome {
            Some(Err(BridgeError::Driver(SessionError::LoggedIn))) => Ok(None),
            Some(code) => code.map(Some),
            None => {
                debug!("cancelling login code request");
                request.cancel().await?;
                Ok(None)
            }
        }
    }

    async fn login(&self, events: &EventSink) -> Result<(), BridgeError> {
        self.session.lock().await.await_login().await?;
        events.emit(Event::LoginOk).await?;

        // Nothing else contends for the lock before the loops start.
        let mut session = self.session.lock().await;
        let mut chats = session.list_chats();
        let mut count = 0;

        while let Some(chat) = chats.next().await {
            events.emit(Event::Chat(chat?)).await?;
            count += 1;
        }

        debug!("sent {} chat snapshots", count);
        Ok(())
    }

    async fn until_shutdown<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            output = future => Some(output),
            _ = self.shutdown.cancelled() => None,
        }
    }

    fn set_state(&mut self, state: BridgeState) {
        debug_assert_ne!(self.state, state, "state set twice");
        debug!("bridge state {} -> {}", self.state, state);
        self.state = state;
    }
}
