// Boleto Ledger - Web Server

use anyhow::{Context, Result};
use boleto_ledger::config::{init_logging, load_dotenv, ServerArgs};
use boleto_ledger::server::{create_router, AppState};
use boleto_ledger::BoletoService;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "boleto-server", version, about = "Boleto ledger HTTP API")]
struct Cli {
    #[command(flatten)]
    server: ServerArgs,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = load_dotenv();
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Some(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    let args = cli.server;
    let service = BoletoService::open(&args.store.database, args.store.output_dir.clone())
        .with_context(|| format!("Failed to open database {}", args.store.database.display()))?;
    tracing::info!(database = %args.store.database.display(), "database opened");

    let state = AppState {
        service,
        upload_dir: args.upload_dir.clone(),
    };
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", args.bind))?;

    tracing::info!("server running on http://{}", args.bind);
    tracing::info!("API: http://{}/api/boletos", args.bind);

    axum::serve(listener, app)
        .await
        .context("Server stopped unexpectedly")?;

    Ok(())
}
