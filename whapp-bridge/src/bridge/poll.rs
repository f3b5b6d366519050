use super::{BridgeConfig, lock::SessionLock};
use crate::{
    error::BridgeError,
    protocol::{ErrorDetail, Event, FormattedMessage, UnreadGroup},
    session::{Message, MessageGroup, Session},
    transport::EventSink,
};
use base64::{Engine, prelude::BASE64_STANDARD};
use log::{trace, warn};
use tokio::time::{self, MissedTickBehavior};
use whapp_media::MediaDescriptor;

/// Unread poll loop. Only fatal errors end it.
pub(super) async fn run<S: Session>(
    session: &SessionLock<S>,
    events: &EventSink,
    config: &BridgeConfig,
) -> Result<(), BridgeError> {
    let mut interval = time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        if let Err(e) = poll_once(session, events, config).await {
            if e.is_fatal() {
                return Err(e);
            }

            warn!("unread poll failed: {}", e);
            events.emit(Event::Error(ErrorDetail::new(&e))).await?;
        }
    }
}

async fn poll_once<S: Session>(
    session: &SessionLock<S>,
    events: &EventSink,
    config: &BridgeConfig,
) -> Result<(), BridgeError> {
    let groups = session
        .lock()
        .await
        .list_unread(config.include_me, config.include_notifications)
        .await?;

    trace!("{} chats with unread messages", groups.len());

    for group in groups {
        let group = format_group(group, session, events, config).await?;
        events.emit(Event::UnreadMessages(group)).await?;
    }

    Ok(())
}

async fn format_group<S: Session>(
    mut group: MessageGroup,
    session: &SessionLock<S>,
    events: &EventSink,
    config: &BridgeConfig,
) -> Result<UnreadGroup, BridgeError> {
    sort_by_timestamp(&mut group.messages);
    let mut messages = Vec::with_capacity(group.messages.len());

    for message in &group.messages {
        let body = match message {
            Message::Media { media, .. } if config.inline_media => {
                match inline_media(media, session, config.verify_mac).await {
                    Ok(x) => Some(x),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!("could not inline media of message {}: {}", message.id(), e);
                        events
                            .emit(Event::Error(
                                ErrorDetail::new(&e).id(Some(message.id())),
                            ))
                            .await?;
                        None
                    }
                }
            }
            _ => None,
        };

        messages.push(FormattedMessage::new(message, body));
    }

    Ok(UnreadGroup {
        chat: group.chat,
        messages,
    })
}

/// Stable, ascending. NaN timestamps sort last.
fn sort_by_timestamp(messages: &mut [Message]) {
    messages.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));
}

async fn inline_media<S: Session>(
    media: &MediaDescriptor,
    session: &SessionLock<S>,
    verify_mac: bool,
) -> Result<String, BridgeError> {
    let data = session.lock().await.fetch_media_bytes(media).await?;
    let plain = media.decrypter()?.verify_mac(verify_mac).decrypt(&data)?;
    Ok(BASE64_STANDARD.encode(plain))
}
