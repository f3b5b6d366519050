use crate::{error::BridgeError, protocol::Event};
use log::{debug, trace};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::mpsc,
    task::{self, JoinHandle},
};

/// Longest inbound line accepted, terminator excluded.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Inbound half of the controller connection.
pub struct LineReader<R> {
    reader: BufReader<R>,
    max_length: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_length(reader, MAX_LINE_LENGTH)
    }

    pub fn with_max_length(reader: R, max_length: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            max_length,
        }
    }

    /// Next line without its terminator, `None` once the controller hangs up.
    ///
    /// Lines that are too long or not valid utf-8 are consumed and returned
    /// as format errors, so the caller can keep reading. Read failures are
    /// fatal transport errors.
    pub async fn next_line(&mut self) -> Result<Option<String>, BridgeError> {
        let mut buf = Vec::new();
        let read = (&mut self.reader)
            .take(self.max_length as u64 + 1)
            .read_until(b'\n', &mut buf)
            .await?;

        if read == 0 {
            return Ok(None);
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();

            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        } else if buf.len() > self.max_length {
            self.skip_line().await?;
            return Err(BridgeError::Format(format!(
                "line is longer than {} bytes",
                self.max_length
            )));
        }

        let line = String::from_utf8(buf)
            .map_err(|x| BridgeError::Format(format!("line is not valid utf-8: {}", x)))?;
        trace!("<- {}", line);
        Ok(Some(line))
    }

    /// Discard input up to and including the next newline.
    async fn skip_line(&mut self) -> Result<(), BridgeError> {
        loop {
            let buf = self.reader.fill_buf().await?;

            if buf.is_empty() {
                return Ok(());
            }

            let (amount, done) = match buf.iter().position(|x| *x == b'\n') {
                Some(i) => (i + 1, true),
                None => (buf.len(), false),
            };
            self.reader.consume(amount);

            if done {
                return Ok(());
            }
        }
    }
}

/// Outbound half of the controller connection.
pub struct LineWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_line(&mut self, line: &str) -> Result<(), BridgeError> {
        debug!("-> {}", line);
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn send_event(&mut self, event: &Event) -> Result<(), BridgeError> {
        self.write_line(&event.to_line()?).await
    }
}

/// Cloneable handle feeding the writer task.
#[derive(Clone)]
pub struct EventSink {
    sender: mpsc::Sender<Event>,
}

impl EventSink {
    /// Queue an event, failing once the writer is gone.
    pub async fn emit(&self, event: Event) -> Result<(), BridgeError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| BridgeError::closed())
    }

    /// Resolves when the writer task has stopped.
    pub async fn closed(&self) {
        self.sender.closed().await
    }
}

/// Spawn the single task owning the outbound half.
///
/// The task finishes with `Ok` after every [`EventSink`] is dropped, or with
/// the first write error.
pub fn spawn_writer<W>(
    mut writer: LineWriter<W>,
    capacity: usize,
) -> (EventSink, JoinHandle<Result<(), BridgeError>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (sender, mut receiver) = mpsc::channel::<Event>(capacity.max(1));

    let task = task::spawn(async move {
        while let Some(event) = receiver.recv().await {
            writer.send_event(&event).await?;
        }

        Ok(())
    });

    (EventSink { sender }, task)
}
