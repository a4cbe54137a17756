use anyhow::{Context, Result};
use clap::Parser;
use ssc_rendezvous::{config, logger, ClientConfig};
use std::path::PathBuf;

/// Open a direct chat channel to whichever peer the rendezvous server pairs us with.
/// Lines typed on stdin are sent to the peer; the peer's messages go to stdout.
#[derive(Parser, Debug)]
#[command(name = "ssc-rendezvous", version, about, long_about = None)]
struct Cli {
    /// Rendezvous server websocket url (overrides the config file)
    #[arg(short, long, env = "SSC_SERVER")]
    server: Option<String>,

    /// Enable logging to stderr
    #[arg(long)]
    log: bool,

    /// Log level when logging is enabled (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Config file, created with defaults if missing
    #[arg(short, long, default_value = config::CONFIG_FILE)]
    config: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init(cli.log, &cli.log_level);

    let config = ClientConfig::resolve(cli.server, &cli.config)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    let outcome = runtime.block_on(ssc_rendezvous::run(config));
    // stdin reads sit on a blocking thread that cannot be cancelled
    runtime.shutdown_background();

    outcome.context("Session terminated")?;
    Ok(())
}
