mod cli;
mod telegram;

use std::sync::Arc;

use clap::Parser;
use taskflow_core::Settings;
use tracing::{debug, info};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = cli::GlobalCli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    settings.apply_overrides(
        cli.overrides
            .iter()
            .map(|kv| (kv.key.clone(), kv.value.clone())),
    )?;

    cli::init_tracing(&cli, &settings.log_level)?;
    info!(
        api = %settings.api_base_url,
        backend = ?settings.session.backend,
        timezone = %settings.timezone,
        "starting taskflow bot"
    );
    debug!(files = ?settings.loaded_files, "config files loaded");

    let token = settings.bot_token()?.to_string();
    let app = taskflow_core::build_app(&settings)?;
    telegram::run(token, Arc::new(app)).await;

    info!("shut down");
    Ok(())
}
