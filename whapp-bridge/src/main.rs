use clap::{ColorChoice, Parser};
use colored::Colorize;
use std::{
    io::{IsTerminal, stderr},
    process,
};
use whapp_bridge::{Args, Logger};

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    colored::control::set_override(match args.color {
        ColorChoice::Always => true,
        ColorChoice::Auto => stderr().is_terminal(),
        ColorChoice::Never => false,
    });

    Logger::init(args.log_level()).map_err(|x| anyhow::anyhow!("{}", x))?;
    args.command.execute().await
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {}", "error".bold().red(), e);
        process::exit(1);
    }
}
