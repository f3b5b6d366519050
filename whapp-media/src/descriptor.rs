use crate::{decrypter::MediaDecrypter, error::Result, media_type::MediaType};

/// Everything needed to fetch and decrypt one attachment.
///
/// When deserialized, `contextInfo` may be replaced by the media `type` of the
/// attachment, in which case the context of that [`MediaType`] is used. With
/// neither present, document keys are assumed.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(rename_all = "camelCase", from = "WireDescriptor")
)]
pub struct MediaDescriptor {
    /// Url of the encrypted blob on the media server.
    pub source_url: String,
    /// Base64 encoded media key.
    pub media_key: String,
    /// Hex encoded HKDF info.
    pub context_info: String,
}

impl MediaDescriptor {
    pub fn new(
        source_url: impl Into<String>,
        media_key: impl Into<String>,
        context_info: impl Into<String>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            media_key: media_key.into(),
            context_info: context_info.into(),
        }
    }

    pub fn with_media_type(
        source_url: impl Into<String>,
        media_key: impl Into<String>,
        media_type: MediaType,
    ) -> Self {
        Self::new(source_url, media_key, media_type.context_info())
    }

    pub fn decrypter(&self) -> Result<MediaDecrypter> {
        MediaDecrypter::from_encoded(&self.media_key, &self.context_info)
    }

    /// Decrypt the fetched blob without MAC verification.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.decrypter()?.decrypt(data)
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDescriptor {
    #[serde(alias = "sourceURL", alias = "clientUrl", alias = "url")]
    source_url: String,
    media_key: String,
    #[serde(default, alias = "cryptKey")]
    context_info: Option<String>,
    #[serde(default, rename = "type")]
    media_type: Option<String>,
}

#[cfg(feature = "serde")]
impl From<WireDescriptor> for MediaDescriptor {
    fn from(value: WireDescriptor) -> Self {
        let context_info = value.context_info.unwrap_or_else(|| {
            value
                .media_type
                .as_deref()
                .and_then(|x| x.parse::<MediaType>().ok())
                .unwrap_or_default()
                .context_info()
        });

        Self {
            source_url: value.source_url,
            media_key: value.media_key,
            context_info,
        }
    }
}
