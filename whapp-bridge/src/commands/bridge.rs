use crate::{
    bridge::{Bridge, BridgeConfig},
    session::{ChromeOptions, ChromeSession},
};
use anyhow::Result;
use clap::Args;
use log::{error, warn};
use std::{path::PathBuf, time::Duration};

/// Connect a WhatsApp web session to a controller listening on PORT.
#[derive(Args, Clone, Debug)]
#[command(long_about = "Connect a WhatsApp web session to a controller listening on PORT.\n\n\
Requires chrome or chromium to be installed.\n\
The first line sent to the controller is SESSION_ID, after which the bridge \
exchanges newline delimited json: commands are read from the controller and \
events (qr code, login, chats, unread messages, downloads, errors) are written back.")]
pub struct Connect {
    /// Port of the controller.
    #[arg(required = true)]
    port: u16,

    /// Identifier sent to the controller right after connecting.
    #[arg(required = true)]
    session_id: String,

    /// Host of the controller.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Milliseconds between two unread message polls.
    #[arg(
        long,
        default_value_t = 500,
        value_parser = clap::value_parser!(u64).range(10..=60000),
        help_heading = "Poll Options"
    )]
    poll_interval: u64,

    /// Also report notification messages (joins, leaves, etc.).
    #[arg(long, help_heading = "Poll Options")]
    include_notifications: bool,

    /// Do not report messages sent from this account.
    #[arg(long, help_heading = "Poll Options")]
    exclude_self: bool,

    /// Do not download and decrypt attachments of unread messages.
    /// The controller can still request them with the download command.
    #[arg(long, help_heading = "Media Options")]
    no_inline_media: bool,

    /// Reject media whose trailing mac does not match.
    #[arg(long, help_heading = "Media Options")]
    verify_mac: bool,

    /// Launch browser without a window.
    #[arg(long, help_heading = "Browser Options")]
    headless: bool,

    /// Browser profile directory, reusing it keeps the login across runs.
    #[arg(long, help_heading = "Browser Options")]
    user_data_dir: Option<PathBuf>,

    /// Path of chrome or chromium executable.
    #[arg(long, help_heading = "Browser Options")]
    chrome_path: Option<PathBuf>,
}

impl Connect {
    pub fn config(&self) -> BridgeConfig {
        BridgeConfig {
            poll_interval: Duration::from_millis(self.poll_interval),
            include_me: !self.exclude_self,
            include_notifications: self.include_notifications,
            inline_media: !self.no_inline_media,
            verify_mac: self.verify_mac,
            ..BridgeConfig::new(&self.session_id)
        }
    }

    pub async fn execute(self) -> Result<()> {
        let session = ChromeSession::new(ChromeOptions {
            headless: self.headless,
            user_data_dir: self.user_data_dir.clone(),
            chrome_path: self.chrome_path.clone(),
            ..Default::default()
        })?;
        let mut bridge = Bridge::new(session, self.config());
        let shutdown = bridge.shutdown_token();

        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C received, stopping gracefully.");
                shutdown.cancel();
            }

            if tokio::signal::ctrl_c().await.is_ok() {
                error!("Ctrl+C received, force exiting.");
                std::process::exit(1);
            }
        });

        bridge.connect((self.host.as_str(), self.port)).await?;
        Ok(())
    }
}
