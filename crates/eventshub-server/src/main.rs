//! eventshub server entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use eventshub_core::{TracingConfig, init_tracing};
use eventshub_server::{EventServer, ServerConfig, ServerResult};

/// Event store server. Configuration is read from `EVENTSHUB_*` variables.
#[derive(Debug, Parser)]
#[command(name = "eventshub-server", version, about)]
struct Cli {
    /// Serve plain HTTP instead of HTTPS.
    #[arg(long)]
    insecure: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    debug: bool,

    /// Human readable logs instead of JSON.
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(TracingConfig::server(cli.debug, cli.pretty)) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ServerResult<()> {
    let config = ServerConfig::from_env(cli.insecure)?;
    info!(?config, "Starting eventshub server");

    let mut server = EventServer::new();
    server.configure(config)?;
    if cli.insecure {
        server.start().await?;
    } else {
        server.start_secure().await?;
    }

    let reason = server.run_until_shutdown().await?;
    info!(%reason, "Exiting");
    Ok(())
}
