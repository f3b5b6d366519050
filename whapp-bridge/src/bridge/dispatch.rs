use super::lock::SessionLock;
use crate::{
    error::BridgeError,
    protocol::{Command, ErrorDetail, Event},
    session::Session,
    transport::{EventSink, LineReader},
};
use base64::{Engine, prelude::BASE64_STANDARD};
use log::{debug, info, warn};
use tokio::io::AsyncRead;

/// Command loop. Each command is fully handled before the next line is read.
///
/// Returns `Ok` when the controller closes its side.
pub(super) async fn run<S, R>(
    reader: &mut LineReader<R>,
    session: &SessionLock<S>,
    events: &EventSink,
    verify_mac: bool,
) -> Result<(), BridgeError>
where
    S: Session,
    R: AsyncRead + Unpin,
{
    loop {
        let line = match reader.next_line().await {
            Ok(Some(x)) => x,
            Ok(None) => break,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("unreadable command line: {}", e);
                events.emit(Event::Error(ErrorDetail::new(&e))).await?;
                continue;
            }
        };
        let line = line.trim();

        if line.is_empty() {
            continue;
        }

        let command = match Command::parse(line) {
            Ok(x) => x,
            Err(e) => {
                warn!("rejected command line: {}", e);
                events.emit(Event::Error(ErrorDetail::new(&e))).await?;
                continue;
            }
        };

        debug!("handling {} command", command.name());

        if let Err(e) = handle(&command, session, events, verify_mac).await {
            if e.is_fatal() {
                return Err(e);
            }

            warn!("{} command failed: {}", command.name(), e);
            events
                .emit(Event::Error(
                    ErrorDetail::new(&e)
                        .command(command.name())
                        .id(command.id()),
                ))
                .await?;
        }
    }

    info!("controller closed the connection");
    Ok(())
}

async fn handle<S: Session>(
    command: &Command,
    session: &SessionLock<S>,
    events: &EventSink,
    verify_mac: bool,
) -> Result<(), BridgeError> {
    match command {
        Command::Send {
            chat_id,
            content,
            reply_id,
        } => {
            session
                .lock()
                .await
                .send_message(chat_id, content, reply_id.as_deref())
                .await?;
        }
        Command::Download { id, media } => {
            let data = session.lock().await.fetch_media_bytes(media).await?;
            let plain = media.decrypter()?.verify_mac(verify_mac).decrypt(&data)?;
            debug!("decrypted {} bytes for download {}", plain.len(), id);

            events
                .emit(Event::DownloadReady {
                    id: id.clone(),
                    payload: BASE64_STANDARD.encode(plain),
                })
                .await?;
        }
    }

    Ok(())
}
