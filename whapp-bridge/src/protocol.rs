//! Line shapes exchanged with the controller.
//!
//! Inbound: `{"command": "send", "args": [chatId, content, replyId]}`.
//! Outbound: `{"event": "qr", "args": [{"code": "..."}]}`.

use crate::{
    error::BridgeError,
    session::{Chat, Contact, Message},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use whapp_media::MediaDescriptor;

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Send {
        chat_id: String,
        content: String,
        reply_id: Option<String>,
    },
    Download {
        id: String,
        media: MediaDescriptor,
    },
}

#[derive(Deserialize)]
struct RawCommand {
    command: String,
    #[serde(default)]
    args: Vec<Value>,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Send { .. } => "send",
            Self::Download { .. } => "download",
        }
    }

    /// Id the controller uses to match replies, if the command has one.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Send { .. } => None,
            Self::Download { id, .. } => Some(id),
        }
    }

    /// Parse one inbound line.
    ///
    /// Invalid json is a format error, anything else that is not a known
    /// command with the right arguments is a protocol error.
    pub fn parse(line: &str) -> Result<Self, BridgeError> {
        let value = serde_json::from_str::<Value>(line)?;
        let raw = serde_json::from_value::<RawCommand>(value)
            .map_err(|x| BridgeError::protocol(format!("malformed command line: {}", x)))?;
        let mut args = raw.args.into_iter();

        match raw.command.as_str() {
            "send" => Ok(Self::Send {
                chat_id: string_arg(args.next(), "send", "chatId")?,
                content: string_arg(args.next(), "send", "content")?,
                reply_id: match args.next() {
                    None | Some(Value::Null) => None,
                    x => Some(string_arg(x, "send", "replyId")?),
                },
            }),
            "download" => {
                let id = string_arg(args.next(), "download", "id")?;
                let media = args
                    .next()
                    .ok_or_else(|| BridgeError::protocol("download: missing mediaDescriptor"))?;
                let media = serde_json::from_value::<MediaDescriptor>(media).map_err(|x| {
                    BridgeError::protocol(format!("download: invalid mediaDescriptor: {}", x))
                })?;
                Ok(Self::Download { id, media })
            }
            "eval" => Err(BridgeError::protocol(
                "eval is not supported by this bridge",
            )),
            x => Err(BridgeError::protocol(format!("unknown command '{}'", x))),
        }
    }
}

/// Ids may arrive as strings or numbers.
fn string_arg(value: Option<Value>, command: &str, name: &str) -> Result<String, BridgeError> {
    match value {
        Some(Value::String(x)) => Ok(x),
        Some(Value::Number(x)) => Ok(x.to_string()),
        Some(x) => Err(BridgeError::protocol(format!(
            "{}: {} must be a string, got {}",
            command, name, x
        ))),
        None => Err(BridgeError::protocol(format!(
            "{}: missing {}",
            command, name
        ))),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Qr(String),
    LoginOk,
    Chat(Chat),
    UnreadMessages(UnreadGroup),
    DownloadReady { id: String, payload: String },
    Error(ErrorDetail),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Qr(_) => "qr",
            Self::LoginOk => "ok",
            Self::Chat(_) => "chat",
            Self::UnreadMessages(_) => "unread-messages",
            Self::DownloadReady { .. } => "download-ready",
            Self::Error(_) => "error",
        }
    }

    fn args(&self) -> Result<Value, serde_json::Error> {
        Ok(match self {
            Self::Qr(code) => json!([{ "code": code }]),
            Self::LoginOk => json!([{ "id": "qr" }]),
            Self::Chat(chat) => json!([serde_json::to_value(chat)?]),
            Self::UnreadMessages(group) => json!([serde_json::to_value(group)?]),
            Self::DownloadReady { id, payload } => json!([id, payload]),
            Self::Error(detail) => json!([serde_json::to_value(detail)?]),
        })
    }

    /// Serialize to one outbound line, without the trailing newline.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&json!({
            "event": self.name(),
            "args": self.args()?,
        }))
    }
}

/// Payload of `unread-messages`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UnreadGroup {
    pub chat: Chat,
    pub messages: Vec<FormattedMessage>,
}

/// Message as the controller sees it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedMessage {
    pub id: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_text: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_media: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_notif: bool,
    pub is_sent_by_me: bool,
    pub is_sent_by_me_from_web: bool,
    pub quoted_msg_obj: Option<Value>,
    pub timestamp: f64,
    pub sender: Option<Contact>,
    /// Text, or base64 plaintext of an inlined attachment. `None` when the
    /// attachment was not inlined.
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaDescriptor>,
}

impl FormattedMessage {
    /// `media_body` is only used for media messages.
    pub fn new(message: &Message, media_body: Option<String>) -> Self {
        let info = message.info();
        let mut formatted = Self {
            id: info.id.clone(),
            is_text: false,
            is_media: false,
            is_notif: false,
            is_sent_by_me: info.is_sent_by_me,
            is_sent_by_me_from_web: info.is_sent_by_me_from_web,
            quoted_msg_obj: info.quoted_msg_obj.clone(),
            timestamp: info.timestamp,
            sender: info.sender.clone(),
            body: None,
            filename: None,
            caption: None,
            media: None,
        };

        match message {
            Message::Text { body, .. } => {
                formatted.is_text = true;
                formatted.body = Some(body.clone());
            }
            Message::Media {
                media,
                filename,
                caption,
                ..
            } => {
                formatted.is_media = true;
                formatted.body = media_body;
                formatted.filename = filename.clone();
                formatted.caption = caption.clone();
                formatted.media = Some(media.clone());
            }
            Message::Notification { body, .. } => {
                formatted.is_notif = true;
                formatted.body = Some(body.clone());
            }
        }

        formatted
    }
}

/// Payload of `error`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ErrorDetail {
    pub fn new(error: &BridgeError) -> Self {
        Self {
            kind: error.kind().to_owned(),
            message: error.to_string(),
            command: None,
            id: None,
        }
    }

    pub fn command(mut self, command: &str) -> Self {
        self.command = Some(command.to_owned());
        self
    }

    pub fn id(mut self, id: Option<&str>) -> Self {
        self.id = id.map(|x| x.to_owned());
        self
    }
}
