// 📥 Import Pipeline - CSV rows → boletos, strictly in input order
//
// The first row whose batch cannot be resolved aborts the whole import.
// Rows inserted before that point stay in the store: there is no rollback.

use crate::batches::{BatchCache, BatchResolver};
use crate::db::{self, NewBoleto};
use crate::error::ServiceResult;
use crate::parser::ImportRow;
use rusqlite::Connection;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
}

pub fn import_records(
    conn: &Connection,
    cache: &BatchCache,
    rows: &[ImportRow],
) -> ServiceResult<ImportSummary> {
    let resolver = BatchResolver::new(conn, cache);
    let mut imported = 0;

    for (idx, row) in rows.iter().enumerate() {
        let batch_id = resolver.resolve(&row.batch_key).map_err(|e| {
            warn!(row = idx, batch = %row.batch_key, imported, "import aborted: {}", e);
            e
        })?;

        let id = db::insert_boleto(
            conn,
            &NewBoleto {
                subject_name: &row.subject_name,
                batch_id,
                value: row.value,
                payment_line: &row.payment_line,
            },
        )?;
        debug!(row = idx, id, batch_id, "boleto inserted");

        imported += 1;
    }

    info!(imported, "import finished");
    Ok(ImportSummary { imported })
}

// ============================================================================
// UPLOAD CLEANUP
// ============================================================================

/// Owns an uploaded temp file and deletes it when dropped, whatever the
/// outcome of the operation that used it. Deletion errors are logged only.
#[derive(Debug)]
pub struct UploadGuard {
    path: PathBuf,
}

impl UploadGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        UploadGuard { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "upload removed"),
            Err(e) => warn!(path = %self.path.display(), "failed to remove upload: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_batch, query_boletos, setup_database, verify_count};
    use crate::error::ServiceError;
    use crate::filter::Filter;

    fn row(name: &str, batch: &str, value: f64) -> ImportRow {
        ImportRow {
            subject_name: name.to_string(),
            batch_key: batch.to_string(),
            value,
            payment_line: format!("LINE-{}", name),
        }
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_import_preserves_order() {
        let conn = test_conn();
        let cache = BatchCache::new();
        let b1 = insert_batch(&conn, "0001", None).unwrap();
        let b2 = insert_batch(&conn, "0002", None).unwrap();

        let rows = vec![row("CAROL", "1", 30.0), row("ALICE", "2", 10.0), row("BOB", "0001", 20.0)];
        let summary = import_records(&conn, &cache, &rows).unwrap();
        assert_eq!(summary.imported, 3);

        let stored = query_boletos(&conn, &Filter::default()).unwrap();
        let subjects: Vec<&str> = stored.iter().map(|b| b.subject_name.as_str()).collect();
        assert_eq!(subjects, vec!["CAROL", "ALICE", "BOB"]);
        assert_eq!(stored[0].batch_id, Some(b1));
        assert_eq!(stored[1].batch_id, Some(b2));
        assert_eq!(stored[1].payment_line, "LINE-ALICE");
        assert!(stored.iter().all(|b| b.active));
    }

    #[test]
    fn test_unresolved_batch_aborts_and_keeps_prefix() {
        let conn = test_conn();
        let cache = BatchCache::new();
        insert_batch(&conn, "0001", None).unwrap();

        let rows = vec![row("A", "1", 1.0), row("B", "9", 2.0), row("C", "1", 3.0)];
        let err = import_records(&conn, &cache, &rows).unwrap_err();

        match err {
            ServiceError::NotFound { batch } => assert_eq!(batch, "0009"),
            other => panic!("expected NotFound, got {:?}", other),
        }
        assert_eq!(verify_count(&conn).unwrap(), 1);

        let stored = query_boletos(&conn, &Filter::default()).unwrap();
        assert_eq!(stored[0].subject_name, "A");
    }

    #[test]
    fn test_import_never_creates_batches() {
        let conn = test_conn();
        let cache = BatchCache::new();

        assert!(import_records(&conn, &cache, &[row("A", "77", 1.0)]).is_err());
        assert_eq!(db::find_batch_id(&conn, "0077").unwrap(), None);
    }

    #[test]
    fn test_empty_import() {
        let conn = test_conn();
        let cache = BatchCache::new();
        assert_eq!(import_records(&conn, &cache, &[]).unwrap().imported, 0);
    }

    #[test]
    fn test_upload_guard_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.csv");
        std::fs::write(&path, "x").unwrap();

        {
            let guard = UploadGuard::new(&path);
            assert!(guard.path().exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_upload_guard_swallows_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        drop(UploadGuard::new(dir.path().join("never-written.csv")));
    }
}
