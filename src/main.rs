use anyhow::Context;
use clap::Parser;
use log::{error, info};
use std::process;
use std::sync::Arc;
use tokio::sync::Notify;

use topology_sync::cli::{Cli, CliHandler, Commands};
use topology_sync::logging;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config().context("Failed to load configuration")?;
    logging::init(&config.logging).context("Failed to initialise logging")?;

    let handler = CliHandler::new(&config)?;
    match cli.command.unwrap_or(Commands::Watch {
        filter: String::new(),
    }) {
        Commands::Watch { filter } => {
            let shutdown = Arc::new(Notify::new());
            let notify = shutdown.clone();
            ctrlc::set_handler(move || notify.notify_one())
                .context("Failed to install Ctrl-C handler")?;

            handler
                .watch(&filter, async move { shutdown.notified().await })
                .await?;
            info!("Shutdown complete");
        }
        Commands::Once { filter } => {
            println!("{}", handler.once(&filter).await?);
        }
    }

    Ok(())
}
