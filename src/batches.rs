// 📦 Batch Resolver - canonical batch names → persisted identifiers
//
// Canonical name: left-padded with '0' to width 4, never truncated.
// "7" → "0007", "12345" → "12345".
//
// Two entry points with deliberately different miss policies:
// - `resolve`   (import path): cache → store → NotFound. Never creates.
// - `add_batch` (explicit):    store → create. Never fails on "exists".

use crate::db;
use crate::error::{ServiceError, ServiceResult};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info};

pub const BATCH_NAME_WIDTH: usize = 4;

pub fn canonical_batch_name(name: &str) -> String {
    format!("{:0>width$}", name, width = BATCH_NAME_WIDTH)
}

// ============================================================================
// BATCH CACHE
// ============================================================================

/// In-memory canonical name → batch id map, owned by one service instance.
///
/// The store stays the source of truth. The lock is only held for the map
/// access itself, never across a store query, so two resolutions of the same
/// unseen name may both hit the store and both write the same id.
#[derive(Debug, Default)]
pub struct BatchCache {
    entries: RwLock<HashMap<String, i64>>,
}

impl BatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, canonical: &str) -> Option<i64> {
        // A poisoned map only ever held complete inserts; keep using it
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(canonical).copied()
    }

    pub fn insert(&self, canonical: String, id: i64) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(canonical, id);
    }

    /// Point every entry holding `from` at `to` (administrative renumbering)
    fn repoint(&self, from: i64, to: i64) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        for id in entries.values_mut().filter(|id| **id == from) {
            *id = to;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AddBatchOutcome {
    pub id: i64,
    pub created: bool,
}

pub struct BatchResolver<'a> {
    conn: &'a Connection,
    cache: &'a BatchCache,
}

impl<'a> BatchResolver<'a> {
    pub fn new(conn: &'a Connection, cache: &'a BatchCache) -> Self {
        BatchResolver { conn, cache }
    }

    /// Resolve an existing batch for import. A store miss is `NotFound`.
    pub fn resolve(&self, name: &str) -> ServiceResult<i64> {
        let canonical = canonical_batch_name(name.trim());

        if let Some(id) = self.cache.get(&canonical) {
            return Ok(id);
        }

        match db::find_batch_id(self.conn, &canonical)? {
            Some(id) => {
                debug!(batch = %canonical, id, "batch cached");
                self.cache.insert(canonical, id);
                Ok(id)
            }
            None => Err(ServiceError::not_found(canonical)),
        }
    }

    /// Create-or-reuse. With `explicit_id` the row is inserted under that id
    /// in a single statement; an id collision surfaces as a store failure.
    pub fn add_batch(&self, name: &str, explicit_id: Option<i64>) -> ServiceResult<AddBatchOutcome> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::validation("batch name is required"));
        }

        let canonical = canonical_batch_name(name);

        if let Some(id) = db::find_batch_id(self.conn, &canonical)? {
            return Ok(AddBatchOutcome { id, created: false });
        }

        let id = db::insert_batch(self.conn, &canonical, explicit_id)?;
        info!(batch = %canonical, id, explicit = explicit_id.is_some(), "batch created");

        Ok(AddBatchOutcome { id, created: true })
    }

    /// Administrative override: move an existing batch to a new identifier.
    ///
    /// Rare and non-idempotent - a second call with the same arguments fails
    /// with `NotFound` because `from` no longer exists.
    pub fn renumber(&self, from: i64, to: i64) -> ServiceResult<()> {
        if db::renumber_batch(self.conn, from, to)? == 0 {
            return Err(ServiceError::not_found(format!("id {}", from)));
        }

        self.cache.repoint(from, to);
        info!(from, to, "batch renumbered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_canonical_batch_name() {
        assert_eq!(canonical_batch_name("7"), "0007");
        assert_eq!(canonical_batch_name("42"), "0042");
        assert_eq!(canonical_batch_name("1234"), "1234");
        assert_eq!(canonical_batch_name("12345"), "12345");
        assert_eq!(canonical_batch_name(""), "0000");
    }

    #[test]
    fn test_canonicalization_is_idempotent() {
        for name in ["7", "A1", "0012", "LOTE9"] {
            let once = canonical_batch_name(name);
            assert_eq!(canonical_batch_name(&once), once);
        }
    }

    #[test]
    fn test_resolve_after_add_returns_same_id() {
        let conn = test_conn();
        let cache = BatchCache::new();
        let resolver = BatchResolver::new(&conn, &cache);

        for name in ["7", "0042", "12345"] {
            let added = resolver.add_batch(name, None).unwrap();
            assert!(added.created);
            assert_eq!(resolver.resolve(name).unwrap(), added.id);
        }
    }

    #[test]
    fn test_add_trims_before_canonicalizing() {
        let conn = test_conn();
        let cache = BatchCache::new();
        let resolver = BatchResolver::new(&conn, &cache);

        let added = resolver.add_batch(" 7 ", None).unwrap();
        assert_eq!(db::find_batch_id(&conn, "0007").unwrap(), Some(added.id));
        assert_eq!(resolver.resolve("7").unwrap(), added.id);
        assert!(!resolver.add_batch("7", None).unwrap().created);
    }

    #[test]
    fn test_add_twice_reuses_existing() {
        let conn = test_conn();
        let cache = BatchCache::new();
        let resolver = BatchResolver::new(&conn, &cache);

        let first = resolver.add_batch("0101", None).unwrap();
        let second = resolver.add_batch("0101", None).unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_add_with_explicit_id() {
        let conn = test_conn();
        let cache = BatchCache::new();
        let resolver = BatchResolver::new(&conn, &cache);

        let added = resolver.add_batch("9", Some(900)).unwrap();
        assert_eq!(added, AddBatchOutcome { id: 900, created: true });
        assert_eq!(resolver.resolve("0009").unwrap(), 900);

        // Existing name ignores the requested id
        let again = resolver.add_batch("9", Some(901)).unwrap();
        assert_eq!(again, AddBatchOutcome { id: 900, created: false });
    }

    #[test]
    fn test_add_requires_name() {
        let conn = test_conn();
        let cache = BatchCache::new();
        let resolver = BatchResolver::new(&conn, &cache);

        let err = resolver.add_batch("  ", None).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_resolve_missing_is_not_found_and_never_creates() {
        let conn = test_conn();
        let cache = BatchCache::new();
        let resolver = BatchResolver::new(&conn, &cache);

        let err = resolver.resolve("5").unwrap_err();
        match err {
            ServiceError::NotFound { batch } => assert_eq!(batch, "0005"),
            other => panic!("expected NotFound, got {:?}", other),
        }
        assert_eq!(db::find_batch_id(&conn, "0005").unwrap(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_resolve_populates_cache() {
        let conn = test_conn();
        let cache = BatchCache::new();
        let id = db::insert_batch(&conn, "0003", None).unwrap();

        let resolver = BatchResolver::new(&conn, &cache);
        assert_eq!(resolver.resolve("3").unwrap(), id);
        assert_eq!(cache.get("0003"), Some(id));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_hit_skips_store() {
        let conn = test_conn();
        let cache = BatchCache::new();
        cache.insert("0008".to_string(), 808);

        // No such row in the store, but the cache answers first
        let resolver = BatchResolver::new(&conn, &cache);
        assert_eq!(resolver.resolve("8").unwrap(), 808);
    }

    #[test]
    fn test_fresh_cache_per_instance() {
        let conn = test_conn();
        let warm = BatchCache::new();
        let cold = BatchCache::new();
        db::insert_batch(&conn, "0001", None).unwrap();

        BatchResolver::new(&conn, &warm).resolve("1").unwrap();
        assert_eq!(warm.len(), 1);
        assert!(cold.is_empty());
    }

    #[test]
    fn test_renumber_repoints_cache() {
        let conn = test_conn();
        let cache = BatchCache::new();
        let resolver = BatchResolver::new(&conn, &cache);

        let added = resolver.add_batch("0050", None).unwrap();
        resolver.resolve("50").unwrap();

        resolver.renumber(added.id, 5000).unwrap();
        assert_eq!(cache.get("0050"), Some(5000));
        assert_eq!(db::find_batch_id(&conn, "0050").unwrap(), Some(5000));

        let err = resolver.renumber(added.id, 6000).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
