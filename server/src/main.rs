mod parse;
mod replay;

use anyhow::Result;
use clap::Parser;
use omega_server::{
    config::{Config, LOG_ENV},
    verifier::VerificationKey,
};
use parse::{Cli, Command};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = std::env::var(LOG_ENV).unwrap_or("info".to_string());

    // stdout carries the report, logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::new(format!(
            "omega_server={log_level},omega_node={log_level}"
        )))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Replay { log } => {
            let report = replay::replay(&config, &log).await?;
            info!(
                admitted = report.admitted,
                refused = report.refused.len(),
                messages = report.tallies.len(),
                "replay finished"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::ConvertKey {
            circuit_version,
            input,
            output,
        } => {
            let key = VerificationKey::load(&circuit_version, &input)?;
            key.write_cache(&output)?;
            info!(%circuit_version, output = %output.display(), "wrote verification key cache");
        }
    }

    Ok(())
}
