//! eventshub-import entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};

use eventshub_core::{TracingConfig, init_tracing};
use eventshub_import::{
    Cli, EventsHubClient, ImportConfig, ImportCredentials, ImportResult, ImportSummary, Importer,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(TracingConfig::importer(cli.debug)) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(summary) if summary.is_clean() => ExitCode::SUCCESS,
        Ok(summary) => {
            warn!(failed = summary.failed, "Some events were not imported");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "Import failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ImportResult<ImportSummary> {
    let config = ImportConfig::load_from(&cli.config)?;
    let credentials = ImportCredentials::from_env()?;
    let sources = cli.sources(&config.source_files_paths);
    info!(server = %config.base_url(), files = sources.len(), "Starting import");

    let client = EventsHubClient::new(&config, credentials)?;
    let summary = Importer::new(client).import_files(&sources).await?;
    println!("{summary}");
    Ok(summary)
}
