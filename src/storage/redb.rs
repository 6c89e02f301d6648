//! redb-backed document storage.
//!
//! One table, `documents: key → JSON bytes`. A write batch maps to a single
//! redb write transaction, so multi-document commits (completion clears the
//! pending queue and appends to the catalog) land together or not at all.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ::redb::backends::InMemoryBackend;
use ::redb::{Database, TableDefinition};

use super::KvBackend;

const DOCUMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");

pub struct RedbBackend {
    db: Database,
}

impl RedbBackend {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let db = Database::create(path)
            .with_context(|| format!("failed to open redb at {}", path.display()))?;
        Self::with_documents_table(db)
    }

    /// Database that lives only as long as this backend.
    pub fn in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .context("failed to create in-memory redb")?;
        Self::with_documents_table(db)
    }

    fn with_documents_table(db: Database) -> Result<Self> {
        // Ensure table exists
        let txn = db.begin_write()?;
        { let _ = txn.open_table(DOCUMENTS)?; }
        txn.commit()?;
        Ok(Self { db })
    }

    /// Default path: <data_dir>/offsync/offsync.redb
    pub fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .context("Failed to get data directory")?
            .join("offsync");
        Ok(data_dir.join("offsync.redb"))
    }
}

impl KvBackend for RedbBackend {
    fn backend_name(&self) -> &str {
        "redb"
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let rtxn = self.db.begin_read()?;
        let table = rtxn.open_table(DOCUMENTS)?;
        Ok(table.get(key)?.map(|data| data.value().to_vec()))
    }

    fn write_batch(&self, batch: Vec<(String, Option<Vec<u8>>)>) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(DOCUMENTS)?;
            for (key, value) in &batch {
                match value {
                    Some(bytes) => {
                        table.insert(key.as_str(), bytes.as_slice())?;
                    }
                    None => {
                        table.remove(key.as_str())?;
                    }
                }
            }
        }
        txn.commit().context("failed to commit document batch")?;
        Ok(())
    }
}
