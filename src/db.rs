//! Local JSON-backed record store.
//!
//! This module provides [`LocalDatabase`], a file holding every table of the
//! console as arrays of rows, and [`LocalRecordStore`], which serves it through
//! the same [`RecordStore`] interface as the hosted service. It is used for
//! offline work, demos, and tests. Rows are stored in the `user_field_names`
//! shape the hosted API returns, so entity decoding is identical for both.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::fields::RowId;
use crate::rows::{field, Fields, Row};
use crate::store::{Filter, RecordStore, TableId};

/// In-memory tables, keyed by table id.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct LocalDatabase {
    pub tables: BTreeMap<TableId, Vec<Row>>,
}

impl LocalDatabase {
    /// Load database from JSON file, creating a new empty database if the file doesn't exist.
    pub fn load(path: &Path) -> StoreResult<Self> {
        if !path.exists() {
            return Ok(LocalDatabase::default());
        }
        let mut buf = String::new();
        File::open(path)?.read_to_string(&mut buf)?;
        Ok(serde_json::from_str(&buf)?)
    }

    /// Save database to JSON file using atomic write (temp file + rename).
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        let tmp = path.with_extension("json.tmp");
        let mut f = File::create(&tmp)?;
        let data = serde_json::to_string_pretty(self)?;
        f.write_all(data.as_bytes())?;
        f.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }

    /// Generate the next available row id for a table.
    pub fn next_id(&self, table: TableId) -> RowId {
        self.tables
            .get(&table)
            .into_iter()
            .flatten()
            .filter_map(|r| r.get(field::ID).and_then(Value::as_u64))
            .max()
            .unwrap_or(0)
            + 1
    }

    pub fn get(&self, table: TableId, id: RowId) -> Option<&Row> {
        self.tables.get(&table)?.iter().find(|r| r.get(field::ID).and_then(Value::as_u64) == Some(id))
    }

    pub fn get_mut(&mut self, table: TableId, id: RowId) -> Option<&mut Row> {
        self.tables
            .get_mut(&table)?
            .iter_mut()
            .find(|r| r.get(field::ID).and_then(Value::as_u64) == Some(id))
    }

    /// Append a row, assigning it the next id.
    pub fn insert(&mut self, table: TableId, mut fields: Fields) -> Row {
        let id = self.next_id(table);
        fields.insert(field::ID.into(), Value::from(id));
        self.tables.entry(table).or_default().push(fields.clone());
        fields
    }
}

/// [`RecordStore`] over a [`LocalDatabase`], optionally persisted to a file after
/// every write.
pub struct LocalRecordStore {
    db: Mutex<LocalDatabase>,
    path: Option<PathBuf>,
}

impl LocalRecordStore {
    /// Store that lives only in memory.
    pub fn in_memory(db: LocalDatabase) -> Self {
        LocalRecordStore { db: Mutex::new(db), path: None }
    }

    /// Store backed by `path`; a missing file starts empty.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = LocalDatabase::load(path)?;
        tracing::info!(path = %path.display(), tables = db.tables.len(), "opened local record store");
        Ok(LocalRecordStore { db: Mutex::new(db), path: Some(path.to_path_buf()) })
    }

    /// Copy of the current tables.
    pub async fn dump(&self) -> LocalDatabase {
        self.db.lock().await.clone()
    }

    fn persist(&self, db: &LocalDatabase) -> StoreResult<()> {
        match &self.path {
            Some(path) => db.save(path),
            None => Ok(()),
        }
    }
}

/// Link fields are written as bare ids; expand them to `{id, value}` like the
/// hosted service does, keeping labels that are already known.
fn normalise_links(existing: Option<&Value>, incoming: Value) -> Value {
    let Value::Array(items) = incoming else { return incoming };
    let known: Vec<&Value> = match existing {
        Some(Value::Array(old)) => old.iter().collect(),
        _ => Vec::new(),
    };
    Value::Array(
        items
            .into_iter()
            .map(|item| match item.as_u64() {
                Some(id) => known
                    .iter()
                    .find(|k| k.get("id").and_then(Value::as_u64) == Some(id))
                    .map(|k| (*k).clone())
                    .unwrap_or_else(|| serde_json::json!({ "id": id, "value": "" })),
                None => item,
            })
            .collect(),
    )
}

#[async_trait]
impl RecordStore for LocalRecordStore {
    async fn list_rows(&self, table: TableId, filters: &[Filter]) -> StoreResult<Vec<Row>> {
        let db = self.db.lock().await;
        Ok(db
            .tables
            .get(&table)
            .map(|rows| rows.iter().filter(|r| filters.iter().all(|f| f.matches(r))).cloned().collect())
            .unwrap_or_default())
    }

    async fn update_row(&self, table: TableId, row_id: RowId, fields: Fields) -> StoreResult<Row> {
        let mut db = self.db.lock().await;
        let row = db.get_mut(table, row_id).ok_or(StoreError::NotFound { table, row: row_id })?;
        for (k, v) in fields {
            let v = normalise_links(row.get(&k), v);
            row.insert(k, v);
        }
        let updated = row.clone();
        self.persist(&db)?;
        Ok(updated)
    }

    async fn create_row(&self, table: TableId, fields: Fields) -> StoreResult<Row> {
        let mut db = self.db.lock().await;
        let fields = fields.into_iter().map(|(k, v)| (k, normalise_links(None, v))).collect();
        let row = db.insert(table, fields);
        self.persist(&db)?;
        Ok(row)
    }
}
