// 🧭 Boleto Service - one instance per process, shared by CLI and server
//
// Owns the store connection and the batch cache. Cloning is cheap and every
// clone shares both, so handlers can move a clone into a blocking task.

use crate::batches::{AddBatchOutcome, BatchCache, BatchResolver};
use crate::db::{self, Boleto};
use crate::error::{ServiceError, ServiceResult};
use crate::filter::{build_filter, FilterParams};
use crate::import::{import_records, ImportSummary, UploadGuard};
use crate::parser::{load_rows, ImportRow};
use crate::pdf::SourceDocument;
use crate::report::render_table;
use crate::splitter::{plan_split, split_document, SplitPage};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

/// A split page written to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitOutput {
    pub record_id: i64,
    pub page_index: usize,
    pub path: PathBuf,
}

#[derive(Clone)]
pub struct BoletoService {
    db: Arc<Mutex<Connection>>,
    cache: Arc<BatchCache>,
    output_dir: PathBuf,
}

impl BoletoService {
    /// Open (or create) the database file and prepare the schema
    pub fn open(database: &Path, output_dir: impl Into<PathBuf>) -> ServiceResult<Self> {
        let conn = Connection::open(database)?;
        Self::from_connection(conn, output_dir)
    }

    pub fn from_connection(conn: Connection, output_dir: impl Into<PathBuf>) -> ServiceResult<Self> {
        db::setup_database(&conn)?;
        Ok(BoletoService {
            db: Arc::new(Mutex::new(conn)),
            cache: Arc::new(BatchCache::new()),
            output_dir: output_dir.into(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn cache(&self) -> &BatchCache {
        &self.cache
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves SQLite consistent; the guard is still usable
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================================================
    // BATCHES
    // ========================================================================

    pub fn add_batch(&self, name: &str, explicit_id: Option<i64>) -> ServiceResult<AddBatchOutcome> {
        let conn = self.conn();
        BatchResolver::new(&conn, &self.cache).add_batch(name, explicit_id)
    }

    pub fn resolve_batch(&self, name: &str) -> ServiceResult<i64> {
        let conn = self.conn();
        BatchResolver::new(&conn, &self.cache).resolve(name)
    }

    pub fn renumber_batch(&self, from: i64, to: i64) -> ServiceResult<()> {
        let conn = self.conn();
        BatchResolver::new(&conn, &self.cache).renumber(from, to)
    }

    // ========================================================================
    // IMPORT
    // ========================================================================

    pub fn import_rows(&self, rows: &[ImportRow]) -> ServiceResult<ImportSummary> {
        let conn = self.conn();
        import_records(&conn, &self.cache, rows)
    }

    /// Import a CSV the caller keeps (CLI)
    pub fn import_csv(&self, path: &Path) -> ServiceResult<ImportSummary> {
        let rows = load_rows(path)?;
        self.import_rows(&rows)
    }

    /// Import an uploaded CSV; the file is removed whatever the outcome
    pub fn import_upload(&self, upload: UploadGuard) -> ServiceResult<ImportSummary> {
        self.import_csv(upload.path())
    }

    // ========================================================================
    // SPLIT
    // ========================================================================

    /// Split a document without touching the filesystem. The store is held
    /// for the bulk lookup only; page extraction runs unlocked.
    pub fn split_pages(&self, source: &SourceDocument, ordered_names: &[String]) -> ServiceResult<Vec<SplitPage>> {
        let matches = {
            let conn = self.conn();
            plan_split(&conn, source.page_count(), ordered_names)?
        };
        split_document(source, &matches)
    }

    /// Split a PDF on disk and write each page to `<output_dir>/<id>.pdf`
    pub fn split_file(&self, path: &Path, ordered_names: &[String]) -> ServiceResult<Vec<SplitOutput>> {
        let source = SourceDocument::open(path)?;
        let pages = self.split_pages(&source, ordered_names)?;
        self.write_pages(pages)
    }

    /// Split an uploaded PDF; the upload is removed whatever the outcome
    pub fn split_upload(&self, upload: UploadGuard, ordered_names: &[String]) -> ServiceResult<Vec<SplitOutput>> {
        self.split_file(upload.path(), ordered_names)
    }

    fn write_pages(&self, pages: Vec<SplitPage>) -> ServiceResult<Vec<SplitOutput>> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            ServiceError::io(format!("failed to create {}: {}", self.output_dir.display(), e))
        })?;

        let mut written = HashSet::new();
        let mut outputs = Vec::with_capacity(pages.len());

        for page in pages {
            let path = self.output_dir.join(format!("{}.pdf", page.record_id));
            if !written.insert(page.record_id) {
                warn!(record_id = page.record_id, page = page.page_index, "overwriting page for repeated boleto");
            }

            std::fs::write(&path, &page.bytes)
                .map_err(|e| ServiceError::io(format!("failed to write {}: {}", path.display(), e)))?;
            info!(path = %path.display(), "page written");

            outputs.push(SplitOutput {
                record_id: page.record_id,
                page_index: page.page_index,
                path,
            });
        }

        Ok(outputs)
    }

    // ========================================================================
    // QUERY & REPORT
    // ========================================================================

    pub fn query(&self, params: &FilterParams) -> ServiceResult<Vec<Boleto>> {
        let filter = build_filter(params);
        let conn = self.conn();
        db::query_boletos(&conn, &filter)
    }

    pub fn report(&self, params: &FilterParams) -> ServiceResult<Vec<u8>> {
        let boletos = self.query(params)?;
        render_table(&boletos)
    }
}
