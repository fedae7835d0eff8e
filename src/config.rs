// ⚙️ Configuration - CLI flags with environment fallbacks
//
// Precedence: flag > environment (including a local .env) > default.

use clap::Args;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// SQLite database file
    #[arg(long, env = "BOLETO_DATABASE", default_value = "boletos.db")]
    pub database: PathBuf,

    /// Directory where split pages are written as <boleto id>.pdf
    #[arg(long, env = "BOLETO_OUTPUT_DIR", default_value = "pdfs")]
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct ServerArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Address the HTTP server listens on
    #[arg(long, env = "BOLETO_BIND", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    /// Spool directory for uploaded files (removed after processing)
    #[arg(long, env = "BOLETO_UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,
}

/// Load a local `.env` so its values feed the `env` fallbacks above.
/// Call before parsing arguments.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the default.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "boleto_ledger=debug"
    } else {
        "boleto_ledger=info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
