use serde::{Deserialize, Serialize};
use serde_json::Value;
use whapp_media::MediaDescriptor;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactNames {
    #[serde(default)]
    pub short: Option<String>,
    #[serde(default)]
    pub push: Option<String>,
    #[serde(default)]
    pub formatted: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    #[serde(default)]
    pub names: ContactNames,
}

/// Chat as known to the session. Serialized without a tag, group chats are
/// recognised by their participant lists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Chat {
    Group {
        id: String,
        name: Option<String>,
        participants: Vec<Contact>,
        admins: Vec<Contact>,
    },
    User {
        id: String,
        name: Option<String>,
    },
}

impl Chat {
    pub fn id(&self) -> &str {
        match self {
            Self::Group { id, .. } | Self::User { id, .. } => id,
        }
    }
}

/// Fields shared by every message kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInfo {
    pub id: String,
    /// Seconds since the unix epoch.
    pub timestamp: f64,
    #[serde(default)]
    pub sender: Option<Contact>,
    #[serde(default)]
    pub is_sent_by_me: bool,
    #[serde(default)]
    pub is_sent_by_me_from_web: bool,
    #[serde(default)]
    pub quoted_msg_obj: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Message {
    Text {
        #[serde(flatten)]
        info: MessageInfo,
        body: String,
    },
    Media {
        #[serde(flatten)]
        info: MessageInfo,
        media: MediaDescriptor,
        #[serde(default)]
        filename: Option<String>,
        #[serde(default)]
        caption: Option<String>,
    },
    Notification {
        #[serde(flatten)]
        info: MessageInfo,
        #[serde(default)]
        body: String,
    },
}

impl Message {
    pub fn info(&self) -> &MessageInfo {
        match self {
            Self::Text { info, .. } | Self::Media { info, .. } | Self::Notification { info, .. } => {
                info
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.info().id
    }

    pub fn timestamp(&self) -> f64 {
        self.info().timestamp
    }
}

/// Unread messages of one chat.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageGroup {
    pub chat: Chat,
    pub messages: Vec<Message>,
}
