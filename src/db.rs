// 🗄️ Record Store Gateway - parameterized reads/writes over SQLite
//
// No business rules live here: batch canonicalization, caching and matching
// policy belong to the callers. Every statement binds its values; the only
// generated SQL is placeholder lists and filter fragments, never caller text.

use crate::error::ServiceResult;
use crate::filter::Filter;
use chrono::{DateTime, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Batch ("lote") - named grouping records are filed under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: i64,
    /// Canonical (zero-padded) name
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Boleto - one payable item, always filed under exactly one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boleto {
    pub id: i64,
    pub subject_name: String,
    /// Nullable in the schema so legacy rows still render (blank column)
    pub batch_id: Option<i64>,
    pub value: f64,
    pub payment_line: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a boleto whose batch has already been resolved
#[derive(Debug, Clone, PartialEq)]
pub struct NewBoleto<'a> {
    pub subject_name: &'a str,
    pub batch_id: i64,
    pub value: f64,
    pub payment_line: &'a str,
}

/// Minimal projection used by the splitter's bulk lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoletoRef {
    pub id: i64,
    pub subject_name: String,
}

pub fn setup_database(conn: &Connection) -> ServiceResult<()> {
    // In-memory databases silently keep "memory"; that's fine for tests
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    register_functions(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS batches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS boletos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject_name TEXT NOT NULL,
            batch_id INTEGER REFERENCES batches(id) ON UPDATE CASCADE,
            value REAL NOT NULL,
            payment_line TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_boletos_subject_name ON boletos(subject_name)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_boletos_batch_id ON boletos(batch_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// BATCHES
// ============================================================================

pub fn find_batch_id(conn: &Connection, name: &str) -> ServiceResult<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM batches WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Insert a batch; `explicit_id` is written in the same statement when given
pub fn insert_batch(conn: &Connection, name: &str, explicit_id: Option<i64>) -> ServiceResult<i64> {
    let now = Utc::now().to_rfc3339();

    match explicit_id {
        Some(id) => {
            conn.execute(
                "INSERT INTO batches (id, name, active, created_at) VALUES (?1, ?2, 1, ?3)",
                params![id, name, now],
            )?;
            Ok(id)
        }
        None => {
            conn.execute(
                "INSERT INTO batches (name, active, created_at) VALUES (?1, 1, ?2)",
                params![name, now],
            )?;
            Ok(conn.last_insert_rowid())
        }
    }
}

/// Rewrite a batch identifier. Returns the number of rows touched (0 or 1).
pub fn renumber_batch(conn: &Connection, from: i64, to: i64) -> ServiceResult<usize> {
    let changed = conn.execute("UPDATE batches SET id = ?1 WHERE id = ?2", params![to, from])?;
    Ok(changed)
}

pub fn get_batch(conn: &Connection, id: i64) -> ServiceResult<Option<Batch>> {
    let batch = conn
        .query_row(
            "SELECT id, name, active, created_at FROM batches WHERE id = ?1",
            params![id],
            |row| {
                Ok(Batch {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    active: row.get(2)?,
                    created_at: parse_timestamp(row, 3)?,
                })
            },
        )
        .optional()?;
    Ok(batch)
}

// ============================================================================
// BOLETOS
// ============================================================================

pub fn insert_boleto(conn: &Connection, boleto: &NewBoleto<'_>) -> ServiceResult<i64> {
    conn.execute(
        "INSERT INTO boletos (subject_name, batch_id, value, payment_line, active, created_at)
         VALUES (?1, ?2, ?3, ?4, 1, ?5)",
        params![
            boleto.subject_name,
            boleto.batch_id,
            boleto.value,
            boleto.payment_line,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// One bulk lookup of every boleto whose subject name is in `names`,
/// lowest id first so "first stored record" is well defined
pub fn find_boletos_by_subject_names(
    conn: &Connection,
    names: &[String],
) -> ServiceResult<Vec<BoletoRef>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = (1..=names.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT id, subject_name FROM boletos WHERE subject_name IN ({}) ORDER BY id",
        placeholders
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(names.iter()), |row| {
        Ok(BoletoRef {
            id: row.get(0)?,
            subject_name: row.get(1)?,
        })
    })?;

    let mut found = Vec::new();
    for row in rows {
        found.push(row?);
    }
    Ok(found)
}

/// Filtered listing, ordered by id ascending
pub fn query_boletos(conn: &Connection, filter: &Filter) -> ServiceResult<Vec<Boleto>> {
    let sql = format!(
        "SELECT id, subject_name, batch_id, value, payment_line, active, created_at
         FROM boletos {} ORDER BY id",
        filter.where_clause()
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(filter.values.iter()), |row| {
        Ok(Boleto {
            id: row.get(0)?,
            subject_name: row.get(1)?,
            batch_id: row.get(2)?,
            value: row.get(3)?,
            payment_line: row.get(4)?,
            active: row.get(5)?,
            created_at: parse_timestamp(row, 6)?,
        })
    })?;

    let mut boletos = Vec::new();
    for row in rows {
        boletos.push(row?);
    }
    Ok(boletos)
}

pub fn verify_count(conn: &Connection) -> ServiceResult<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM boletos", [], |row| row.get(0))?;
    Ok(count)
}

/// Per-connection SQL functions. `lower_unicode` folds case beyond ASCII,
/// which the built-in `lower()` and `LIKE` do not.
fn register_functions(conn: &Connection) -> ServiceResult<()> {
    conn.create_scalar_function(
        "lower_unicode",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text = ctx.get::<Option<String>>(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )?;
    Ok(())
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{build_filter, FilterParams};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn add(conn: &Connection, name: &str, batch_id: i64, value: f64) -> i64 {
        insert_boleto(
            conn,
            &NewBoleto {
                subject_name: name,
                batch_id,
                value,
                payment_line: "23790.00000 00000.000000 00000.000000 0 00000000000000",
            },
        )
        .unwrap()
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = test_conn();
        setup_database(&conn).unwrap();
        assert_eq!(verify_count(&conn).unwrap(), 0);
    }

    #[test]
    fn test_insert_and_find_batch() {
        let conn = test_conn();
        let id = insert_batch(&conn, "0001", None).unwrap();

        assert_eq!(find_batch_id(&conn, "0001").unwrap(), Some(id));
        assert_eq!(find_batch_id(&conn, "1").unwrap(), None);

        let batch = get_batch(&conn, id).unwrap().unwrap();
        assert_eq!(batch.name, "0001");
        assert!(batch.active);
    }

    #[test]
    fn test_insert_batch_with_explicit_id() {
        let conn = test_conn();
        let id = insert_batch(&conn, "0200", Some(200)).unwrap();
        assert_eq!(id, 200);
        assert_eq!(find_batch_id(&conn, "0200").unwrap(), Some(200));
    }

    #[test]
    fn test_duplicate_batch_name_is_store_failure() {
        let conn = test_conn();
        insert_batch(&conn, "0001", None).unwrap();
        let err = insert_batch(&conn, "0001", None).unwrap_err();
        assert_eq!(err.kind(), "store_failure");
    }

    #[test]
    fn test_boleto_requires_existing_batch() {
        let conn = test_conn();
        let err = insert_boleto(
            &conn,
            &NewBoleto {
                subject_name: "ORPHAN",
                batch_id: 999,
                value: 1.0,
                payment_line: "x",
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), "store_failure");
    }

    #[test]
    fn test_renumber_cascades_to_boletos() {
        let conn = test_conn();
        let batch = insert_batch(&conn, "0001", None).unwrap();
        add(&conn, "ALICE", batch, 10.0);

        assert_eq!(renumber_batch(&conn, batch, 77).unwrap(), 1);
        assert_eq!(renumber_batch(&conn, 12345, 78).unwrap(), 0);

        let all = query_boletos(&conn, &Filter::default()).unwrap();
        assert_eq!(all[0].batch_id, Some(77));
    }

    #[test]
    fn test_bulk_lookup_orders_by_id() {
        let conn = test_conn();
        let batch = insert_batch(&conn, "0001", None).unwrap();
        let carol = add(&conn, "CAROL", batch, 1.0);
        let alice = add(&conn, "ALICE", batch, 2.0);
        add(&conn, "BOB", batch, 3.0);

        let names = vec!["ALICE".to_string(), "CAROL".to_string(), "NOBODY".to_string()];
        let found = find_boletos_by_subject_names(&conn, &names).unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, carol);
        assert_eq!(found[1].id, alice);
        assert!(find_boletos_by_subject_names(&conn, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_query_with_filter() {
        let conn = test_conn();
        let b1 = insert_batch(&conn, "0001", None).unwrap();
        let b2 = insert_batch(&conn, "0002", None).unwrap();
        add(&conn, "JOANA SILVA", b1, 50.0);
        add(&conn, "JOSE COSTA", b2, 150.0);
        add(&conn, "MARIA", b1, 300.0);

        let filter = build_filter(&FilterParams {
            name: Some("jo".to_string()),
            value_min: Some(100.0),
            ..Default::default()
        });
        let rows = query_boletos(&conn, &filter).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].subject_name, "JOSE COSTA");

        let by_batch = build_filter(&FilterParams {
            batch_id: Some(b1),
            ..Default::default()
        });
        let rows = query_boletos(&conn, &by_batch).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].id < rows[1].id);
    }

    #[test]
    fn test_name_filter_folds_accented_case() {
        let conn = test_conn();
        let b1 = insert_batch(&conn, "0001", None).unwrap();
        let joao = add(&conn, "JOÃO CONCEIÇÃO", b1, 80.0);
        add(&conn, "JOANA SILVA", b1, 90.0);

        for needle in ["joão", "Conceição", "ÃO C"] {
            let filter = build_filter(&FilterParams {
                name: Some(needle.to_string()),
                ..Default::default()
            });
            let rows = query_boletos(&conn, &filter).unwrap();
            assert_eq!(rows.len(), 1, "needle {:?}", needle);
            assert_eq!(rows[0].id, joao);
        }
    }
}
