use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use famreg_core::{DocPath, FieldValue};

use crate::error::StorageError;
use crate::traits::{Cache, DocumentStore};

fn decode_value(bytes: &[u8]) -> Result<FieldValue, StorageError> {
    FieldValue::from_msgpack(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn encode_value(value: &FieldValue) -> Result<Vec<u8>, StorageError> {
    value
        .to_msgpack()
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Range `[lo, hi)` covering every path strictly below `path`.
/// `'0'` is the byte after `'/'`, so the range is exactly the `path/` prefix.
fn descendant_bounds(path: &str) -> (String, String) {
    (format!("{path}/"), format!("{path}0"))
}

/// `SQLite`-backed [`Cache`]: one row per key.
pub struct SqliteCache {
    conn: Connection,
}

impl SqliteCache {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl Cache for SqliteCache {
    fn get_item(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM cache_items WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_item(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO cache_items (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                 updated_at = CAST(unixepoch('now','subsec') * 1000 AS INTEGER)",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "DELETE FROM cache_items WHERE key = ?1",
            rusqlite::params![key],
        )?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut stmt = self.conn.prepare("SELECT key FROM cache_items ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

/// `SQLite`-backed [`DocumentStore`]. Only leaves are stored; interior
/// nodes exist implicitly through their descendants' paths.
pub struct SqliteDocumentStore {
    conn: Connection,
}

impl SqliteDocumentStore {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Number of stored leaves.
    pub fn leaf_count(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn clear_subtree(tx: &rusqlite::Transaction, path: &DocPath) -> Result<(), StorageError> {
    let (lo, hi) = descendant_bounds(path.as_str());
    tx.execute(
        "DELETE FROM documents WHERE path = ?1 OR (path >= ?2 AND path < ?3)",
        rusqlite::params![path.as_str(), lo, hi],
    )?;
    Ok(())
}

/// A write below an existing leaf turns that leaf into an interior node.
fn clear_leaf_ancestors(tx: &rusqlite::Transaction, path: &DocPath) -> Result<(), StorageError> {
    let full = path.as_str();
    for (idx, _) in full.match_indices('/') {
        tx.execute(
            "DELETE FROM documents WHERE path = ?1",
            rusqlite::params![&full[..idx]],
        )?;
    }
    Ok(())
}

fn write_value(
    tx: &rusqlite::Transaction,
    path: &DocPath,
    value: &FieldValue,
) -> Result<(), StorageError> {
    match value {
        FieldValue::Null => Ok(()),
        FieldValue::Map(entries) => {
            for (key, child) in entries {
                write_value(tx, &path.child(key)?, child)?;
            }
            Ok(())
        }
        leaf => {
            tx.execute(
                "INSERT INTO documents (path, value) VALUES (?1, ?2)
                 ON CONFLICT(path) DO UPDATE SET value = excluded.value",
                rusqlite::params![path.as_str(), encode_value(leaf)?],
            )?;
            Ok(())
        }
    }
}

fn insert_at(map: &mut BTreeMap<String, FieldValue>, relative: &str, value: FieldValue) {
    match relative.split_once('/') {
        None => {
            map.insert(relative.to_string(), value);
        }
        Some((head, rest)) => {
            let child = map
                .entry(head.to_string())
                .or_insert_with(|| FieldValue::Map(BTreeMap::new()));
            if !matches!(child, FieldValue::Map(_)) {
                *child = FieldValue::Map(BTreeMap::new());
            }
            if let FieldValue::Map(inner) = child {
                insert_at(inner, rest, value);
            }
        }
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn get(&self, path: &DocPath) -> Result<Option<FieldValue>, StorageError> {
        let leaf = self
            .conn
            .query_row(
                "SELECT value FROM documents WHERE path = ?1",
                rusqlite::params![path.as_str()],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        if let Some(bytes) = leaf {
            return Ok(Some(decode_value(&bytes)?));
        }

        let (lo, hi) = descendant_bounds(path.as_str());
        let mut stmt = self.conn.prepare(
            "SELECT path, value FROM documents WHERE path >= ?1 AND path < ?2 ORDER BY path",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![lo, hi], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        if rows.is_empty() {
            return Ok(None);
        }

        let mut tree = BTreeMap::new();
        for (leaf_path, bytes) in rows {
            insert_at(&mut tree, &leaf_path[lo.len()..], decode_value(&bytes)?);
        }
        Ok(Some(FieldValue::Map(tree)))
    }

    fn update(
        &mut self,
        root: &DocPath,
        writes: &BTreeMap<DocPath, FieldValue>,
    ) -> Result<(), StorageError> {
        if let Some(stray) = writes.keys().find(|p| !p.is_within(root)) {
            return Err(StorageError::PathOutsideRoot {
                path: stray.to_string(),
                root: root.to_string(),
            });
        }

        let tx = self.conn.transaction()?;
        for (path, value) in writes {
            clear_leaf_ancestors(&tx, path)?;
            clear_subtree(&tx, path)?;
            write_value(&tx, path, value)?;
        }
        tx.commit()?;

        debug!(root = %root, paths = writes.len(), "applied multi-path update");
        Ok(())
    }

    fn push(&mut self, parent: &DocPath) -> Result<String, StorageError> {
        let key = Uuid::now_v7().simple().to_string();
        debug!(parent = %parent, key = %key, "generated child key");
        Ok(key)
    }
}
