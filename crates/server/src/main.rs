use anyhow::Result;
use clap::Parser;
use tracing::info;

use loxone_bridge::config::{Cli, Command};
use loxone_bridge::{backup, config, logging, supervisor};
use loxone_data::DieselPool;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load(&cli)?;
    logging::init(&config.log_level);

    if let Some(Command::Backup { archive, destination }) = &cli.command {
        backup::run(archive, destination).await?;
        return Ok(());
    }

    info!(host = %config.host, "starting loxone-bridge");

    let pool = DieselPool::new(&config.database_url)?;
    loxone_data::run_pending_migrations(&pool).await?;

    supervisor::run(config, pool).await?;
    Ok(())
}
