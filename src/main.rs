use anyhow::Result;
use clap::Parser;
use std::sync::Arc;

use ca_to_us::cli::commands::check::CheckCommand;
use ca_to_us::cli::commands::convert::{ConvertCommand, EventSource};
use ca_to_us::cli::commands::Command;
use ca_to_us::cli::{Cli, Commands};
use ca_to_us::config::ConverterConfig;
use ca_to_us::telemetry::init_telemetry;

fn main() -> Result<()> {
    let cli = Cli::parse();

    ConverterConfig::load_env_file()?;
    let config = Arc::new(ConverterConfig::load(cli.config.as_deref())?);
    init_telemetry(&config.log_level)?;
    tracing::info!("Stage: {}", config.stage);

    match cli.command {
        Commands::Convert {
            payload,
            payload_file,
            vin,
            incident,
        } => {
            let source = match (payload, payload_file, vin, incident) {
                (Some(payload), _, _, _) => EventSource::Inline(payload),
                (None, Some(path), _, _) => EventSource::File(path),
                (None, None, Some(vin), Some(incident)) => EventSource::Fields { vin, incident },
                _ => anyhow::bail!("Provide --payload, --payload-file or --vin with --incident"),
            };
            tokio::runtime::Runtime::new()?.block_on(async {
                ConvertCommand::new(config, source).execute().await
            })
        }
        Commands::Check { vin } => {
            tokio::runtime::Runtime::new()?.block_on(async {
                CheckCommand::new(config, vin).execute().await
            })
        }
    }
}
