#[cfg(feature = "browser")]
mod bridge;
mod decrypt;

#[cfg(feature = "browser")]
pub use bridge::Connect;
pub use decrypt::Decrypt;

use crate::logger;
use anyhow::Result;
use clap::{ArgAction, ColorChoice, Parser, Subcommand};
use log::LevelFilter;

/// Bridge a WhatsApp web session to a controller process and decrypt its media.
#[derive(Debug, Clone, Parser)]
#[command(version, author = "clitic <clitic21@gmail.com>", about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// When to output colored text.
    #[arg(long, global = true, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Increase logging verbosity, repeat for trace output.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    pub fn log_level(&self) -> LevelFilter {
        logger::level(self.verbose, self.quiet)
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    #[cfg(feature = "browser")]
    #[command(name = "bridge", visible_alias = "connect")]
    Bridge(Connect),
    Decrypt(Decrypt),
}

impl Commands {
    pub async fn execute(self) -> Result<()> {
        match self {
            #[cfg(feature = "browser")]
            Self::Bridge(args) => args.execute().await,
            Self::Decrypt(args) => args.execute().await,
        }
    }
}
