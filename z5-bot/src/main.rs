//! z5bot - interactive fiction over chat.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use z5_common::config::Config;
use z5_common::logging::init_logging;
use z5_common::TransportKind;

#[derive(Parser)]
#[command(name = "z5bot")]
#[command(author, version, about = "Play Z-machine stories through a chat bot", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = z5_common::config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Chat transport, overriding the configuration file
    #[arg(short, long)]
    transport: Option<TransportKind>,

    /// Notice file; enables a one-time /broadcast of its contents
    notice_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_from(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    if let Some(transport) = cli.transport {
        config.transport = transport;
    }
    if let Some(notice_file) = cli.notice_file {
        config.enable_broadcast(notice_file);
    }
    config.validate().context("invalid configuration")?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    z5_bot::run(config).await
}
