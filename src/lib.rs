// Boleto Ledger - Core Library
// Batch resolution, CSV import, PDF splitting and reporting over SQLite.
// Exposes all modules for use in the CLI, the API server, and tests.

pub mod error;
pub mod config;
pub mod db;             // Record Store Gateway
pub mod filter;         // Query Filter Builder
pub mod batches;        // Batch Resolver + Batch Cache
pub mod parser;         // CSV row parser
pub mod import;         // Import Pipeline
pub mod pdf;            // Document byte engine
pub mod splitter;       // Order-based page splitting
pub mod report;         // Report Renderer
pub mod service;

#[cfg(feature = "server")]
pub mod server;

// Re-export commonly used types
pub use error::{ServiceError, ServiceResult};
pub use db::{
    Batch, Boleto, BoletoRef, NewBoleto,
    setup_database, find_batch_id, insert_batch, renumber_batch, get_batch,
    insert_boleto, find_boletos_by_subject_names, query_boletos, verify_count,
};
pub use filter::{build_filter, Filter, FilterParams};
pub use batches::{canonical_batch_name, AddBatchOutcome, BatchCache, BatchResolver};
pub use parser::{load_rows, parse_rows, parse_value, ImportRow};
pub use import::{import_records, ImportSummary, UploadGuard};
pub use pdf::SourceDocument;
pub use splitter::{align_pages, match_pages, parse_name_list, plan_split, split_document, PageMatch, SplitPage};
pub use report::render_table;
pub use service::{BoletoService, SplitOutput};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
