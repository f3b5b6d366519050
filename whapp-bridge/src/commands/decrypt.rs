use crate::http;
use anyhow::{Result, bail};
use clap::{Args, builder::PossibleValuesParser};
use log::{debug, info};
use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
};
use whapp_media::{MediaDecrypter, MediaType};

/// Decrypt a WhatsApp media blob and write the plaintext to stdout.
#[derive(Debug, Clone, Args)]
pub struct Decrypt {
    /// http(s):// url or local path of the encrypted blob.
    #[arg(required = true)]
    input: String,

    /// Base64 encoded media key.
    #[arg(required = true)]
    media_key: String,

    /// Hex encoded context info used as HKDF info.
    #[arg(required_unless_present = "media_type")]
    context_info: Option<String>,

    /// Use the context info of this media type instead.
    #[arg(
        long,
        conflicts_with = "context_info",
        value_parser = PossibleValuesParser::new(["image", "sticker", "video", "gif", "audio", "ptt", "document"])
    )]
    media_type: Option<String>,

    /// Reject the blob if its trailing mac does not match.
    #[arg(long)]
    verify_mac: bool,

    /// Write plaintext to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl Decrypt {
    fn context_info(&self) -> Result<String> {
        match (&self.context_info, &self.media_type) {
            (Some(context_info), _) => Ok(context_info.to_owned()),
            (None, Some(media_type)) => Ok(media_type
                .parse::<MediaType>()
                .unwrap_or_default()
                .context_info()),
            (None, None) => bail!("either CONTEXT_INFO or --media-type is required."),
        }
    }

    pub async fn execute(self) -> Result<()> {
        let decrypter = MediaDecrypter::from_encoded(&self.media_key, &self.context_info()?)?
            .verify_mac(self.verify_mac);

        let data = if self.input.starts_with("http://") || self.input.starts_with("https://") {
            info!("fetching {}", self.input);
            let client = http::client(http::USER_AGENT)?;
            http::fetch(&client, &self.input)
                .await
                .map_err(anyhow::Error::msg)?
        } else {
            fs::read(&self.input)?
        };

        let plaintext = decrypter.decrypt(&data)?;
        debug!("decrypted {} bytes into {} bytes", data.len(), plaintext.len());

        if let Some(output) = &self.output {
            fs::write(output, &plaintext)?;
            info!("saved {}", output.display());
        } else {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&plaintext)?;
            stdout.flush()?;
        }

        Ok(())
    }
}
