use anyhow::{Context, Result};
use boleto_ledger::config::{init_logging, load_dotenv, StoreArgs};
use boleto_ledger::{parse_name_list, render_table, BoletoService, FilterParams};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "boleto-ledger", version, about = "Import, split and report boletos")]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a batch, or print the id of the existing one
    AddBatch {
        name: String,
        /// Create the batch under this id instead of the next free one
        #[arg(long)]
        id: Option<i64>,
    },
    /// Move an existing batch to a new id (administrative, rarely needed)
    RenumberBatch { from: i64, to: i64 },
    /// Import boletos from a CSV file (unidade,nome,valor,linha_digitavel)
    Import { csv: PathBuf },
    /// Split a PDF into one file per boleto, page i matching name i
    Split {
        pdf: PathBuf,
        /// File with the ordered names: one per line, or a JSON array
        #[arg(long)]
        names: PathBuf,
    },
    /// List boletos, optionally rendering them to a PDF report
    Query {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        value_min: Option<f64>,
        #[arg(long)]
        value_max: Option<f64>,
        #[arg(long)]
        batch_id: Option<i64>,
        /// Write a PDF report here instead of printing JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let dotenv = load_dotenv();
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Some(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    let service = BoletoService::open(&cli.store.database, cli.store.output_dir.clone())
        .with_context(|| format!("Failed to open database {}", cli.store.database.display()))?;

    match cli.command {
        Command::AddBatch { name, id } => {
            let outcome = service.add_batch(&name, id)?;
            if outcome.created {
                println!("✓ Batch created with id {}", outcome.id);
            } else {
                println!("✓ Batch already exists with id {}", outcome.id);
            }
        }
        Command::RenumberBatch { from, to } => {
            service.renumber_batch(from, to)?;
            println!("✓ Batch {} renumbered to {}", from, to);
        }
        Command::Import { csv } => {
            let summary = service
                .import_csv(&csv)
                .with_context(|| format!("Import of {} failed", csv.display()))?;
            println!("✓ Imported {} boletos", summary.imported);
        }
        Command::Split { pdf, names } => {
            let raw = std::fs::read_to_string(&names)
                .with_context(|| format!("Failed to read {}", names.display()))?;
            let names = parse_name_list(&raw)?;

            let outputs = service
                .split_file(&pdf, &names)
                .with_context(|| format!("Split of {} failed", pdf.display()))?;
            for out in &outputs {
                println!("  page {:>3} → {}", out.page_index + 1, out.path.display());
            }
            println!("✓ {} of {} pages written", outputs.len(), names.len());
        }
        Command::Query {
            name,
            value_min,
            value_max,
            batch_id,
            report,
        } => {
            let params = FilterParams {
                name,
                value_min,
                value_max,
                batch_id,
            };
            let boletos = service.query(&params)?;

            match report {
                Some(path) => {
                    let pdf = render_table(&boletos)?;
                    std::fs::write(&path, pdf)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("✓ Report with {} boletos written to {}", boletos.len(), path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&boletos)?),
            }
        }
    }

    Ok(())
}
