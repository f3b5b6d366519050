use std::{convert::Infallible, fmt, str::FromStr};

/// Media classes known to the web client, each with its own HKDF context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MediaType {
    Image,
    Video,
    Audio,
    /// Push-to-talk voice note, shares the audio context.
    Ptt,
    #[default]
    Document,
}

impl MediaType {
    /// Raw HKDF info string.
    pub fn context(&self) -> &'static str {
        match self {
            Self::Image => "WhatsApp Image Keys",
            Self::Video => "WhatsApp Video Keys",
            Self::Audio | Self::Ptt => "WhatsApp Audio Keys",
            Self::Document => "WhatsApp Document Keys",
        }
    }

    /// HKDF info string in hex, as expected by [`crate::decrypt`].
    pub fn context_info(&self) -> String {
        hex::encode(self.context())
    }
}

impl FromStr for MediaType {
    type Err = Infallible;

    /// Unknown types fall back to [`MediaType::Document`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "image" | "sticker" => Self::Image,
            "video" | "gif" => Self::Video,
            "audio" => Self::Audio,
            "ptt" => Self::Ptt,
            _ => Self::Document,
        })
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Ptt => "ptt",
            Self::Document => "document",
        })
    }
}
