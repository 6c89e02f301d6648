//! Key-value persistence for per-profile documents.
//!
//! - [`RedbBackend`]: embedded redb, either a file (survives restarts) or
//!   redb's in-memory backend (tests, ephemeral hosts)
//!
//! Every piece of engine state is a whole JSON document stored under
//! `offsync:{profile}:{namespace}`. The [`Store`] never surfaces errors:
//! backend failures and undecodable documents are logged and treated as
//! absent, so callers always get their default back.

pub mod redb;

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use self::redb::RedbBackend;

/// Raw byte storage behind a [`Store`].
pub trait KvBackend: Send + Sync {
    /// Human-readable backend name (e.g., "redb", "memory").
    fn backend_name(&self) -> &str;

    /// Read the bytes stored under `key`, if any.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Apply all writes as one atomic unit. A `None` value deletes the key.
    fn write_batch(&self, batch: Vec<(String, Option<Vec<u8>>)>) -> Result<()>;
}

/// The per-profile documents the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    PlayCounts,
    PendingDownloads,
    Downloads,
    Favorites,
    History,
}

impl Namespace {
    pub const ALL: [Namespace; 5] = [
        Namespace::PlayCounts,
        Namespace::PendingDownloads,
        Namespace::Downloads,
        Namespace::Favorites,
        Namespace::History,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlayCounts => "play_counts",
            Self::PendingDownloads => "pending_downloads",
            Self::Downloads => "downloads",
            Self::Favorites => "favorites",
            Self::History => "history",
        }
    }
}

/// A typed document living in one namespace.
pub trait Document: Serialize + DeserializeOwned + Default {
    const NAMESPACE: Namespace;
}

pub fn document_key(namespace: Namespace, profile_id: &str) -> String {
    format!("offsync:{}:{}", profile_id, namespace.as_str())
}

pub struct Store {
    backend: Box<dyn KvBackend>,
    /// Serializes read-modify-write cycles.
    mutation: Mutex<()>,
}

impl Store {
    pub fn new(backend: impl KvBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            mutation: Mutex::new(()),
        }
    }

    /// Store backed by a fresh in-memory redb database.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(RedbBackend::in_memory()?))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.backend_name()
    }

    /// Read a document, falling back to `default` when absent or malformed.
    pub fn get<T: DeserializeOwned>(&self, namespace: Namespace, profile_id: &str, default: T) -> T {
        Txn::new(self.backend.as_ref()).get(namespace, profile_id, default)
    }

    pub fn set<T: Serialize>(&self, namespace: Namespace, profile_id: &str, value: &T) {
        self.atomically(|txn| txn.set(namespace, profile_id, value));
    }

    pub fn load<D: Document>(&self, profile_id: &str) -> D {
        self.get(D::NAMESPACE, profile_id, D::default())
    }

    /// Run a read-modify-write cycle. Writes are buffered and flushed as a
    /// single batch once `f` returns; no other mutation can interleave.
    pub fn atomically<R>(&self, f: impl FnOnce(&mut Txn<'_>) -> R) -> R {
        let _guard = self.mutation.lock().unwrap_or_else(PoisonError::into_inner);
        let mut txn = Txn::new(self.backend.as_ref());
        let result = f(&mut txn);
        txn.commit();
        result
    }
}

/// Buffered view over the backend used inside [`Store::atomically`].
pub struct Txn<'a> {
    backend: &'a dyn KvBackend,
    writes: BTreeMap<String, Option<Vec<u8>>>,
}

impl<'a> Txn<'a> {
    fn new(backend: &'a dyn KvBackend) -> Self {
        Self {
            backend,
            writes: BTreeMap::new(),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, namespace: Namespace, profile_id: &str, default: T) -> T {
        let key = document_key(namespace, profile_id);
        let bytes = match self.writes.get(&key) {
            Some(pending) => pending.clone(),
            None => match self.backend.read(&key) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("Could not read {}: {:#}", key, e);
                    None
                }
            },
        };

        match bytes {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!("Discarding malformed document {}: {}", key, e);
                    default
                }
            },
            None => default,
        }
    }

    pub fn set<T: Serialize>(&mut self, namespace: Namespace, profile_id: &str, value: &T) {
        let key = document_key(namespace, profile_id);
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                self.writes.insert(key, Some(bytes));
            }
            Err(e) => tracing::warn!("Could not serialize {}: {}", key, e),
        }
    }

    pub fn delete(&mut self, namespace: Namespace, profile_id: &str) {
        self.writes.insert(document_key(namespace, profile_id), None);
    }

    pub fn load<D: Document>(&self, profile_id: &str) -> D {
        self.get(D::NAMESPACE, profile_id, D::default())
    }

    pub fn save<D: Document>(&mut self, profile_id: &str, doc: &D) {
        self.set(D::NAMESPACE, profile_id, doc);
    }

    fn commit(self) {
        if self.writes.is_empty() {
            return;
        }
        let keys: Vec<String> = self.writes.keys().cloned().collect();
        if let Err(e) = self.backend.write_batch(self.writes.into_iter().collect()) {
            tracing::warn!("Dropped write of {:?}: {:#}", keys, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Backend whose writes always fail.
    struct FailingBackend;

    impl KvBackend for FailingBackend {
        fn backend_name(&self) -> &str {
            "failing"
        }

        fn read(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            anyhow::bail!("disk on fire")
        }

        fn write_batch(&self, _batch: Vec<(String, Option<Vec<u8>>)>) -> Result<()> {
            anyhow::bail!("disk on fire")
        }
    }

    #[test]
    fn test_document_key_layout() {
        assert_eq!(
            document_key(Namespace::PendingDownloads, "p1"),
            "offsync:p1:pending_downloads"
        );
        assert_eq!(document_key(Namespace::PlayCounts, "kids"), "offsync:kids:play_counts");
    }

    #[test]
    fn test_get_missing_returns_default() {
        let store = Store::in_memory().unwrap();
        let value: Vec<String> = store.get(Namespace::History, "p1", vec!["fallback".to_string()]);
        assert_eq!(value, vec!["fallback".to_string()]);
    }

    #[test]
    fn test_set_then_get() {
        let store = Store::in_memory().unwrap();
        let mut counts = HashMap::new();
        counts.insert("song-1".to_string(), 3u32);
        store.set(Namespace::PlayCounts, "p1", &counts);

        let loaded: HashMap<String, u32> = store.get(Namespace::PlayCounts, "p1", HashMap::new());
        assert_eq!(loaded.get("song-1"), Some(&3));
    }

    #[test]
    fn test_profiles_are_isolated() {
        let store = Store::in_memory().unwrap();
        store.set(Namespace::Favorites, "adult", &vec!["a".to_string()]);

        let kids: Vec<String> = store.get(Namespace::Favorites, "kids", Vec::new());
        assert!(kids.is_empty());
    }

    #[test]
    fn test_malformed_document_falls_back_to_default() {
        let backend = RedbBackend::in_memory().unwrap();
        backend
            .write_batch(vec![(
                document_key(Namespace::PendingDownloads, "p1"),
                Some(b"{not json".to_vec()),
            )])
            .unwrap();
        let store = Store::new(backend);

        let loaded: Vec<u32> = store.get(Namespace::PendingDownloads, "p1", vec![7]);
        assert_eq!(loaded, vec![7]);
    }

    #[test]
    fn test_wrong_shape_falls_back_to_default() {
        let store = Store::in_memory().unwrap();
        store.set(Namespace::PlayCounts, "p1", &"just a string");

        let loaded: HashMap<String, u32> = store.get(Namespace::PlayCounts, "p1", HashMap::new());
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_atomically_flushes_every_document_together() {
        let store = Store::in_memory().unwrap();
        store.atomically(|txn| {
            txn.set(Namespace::PendingDownloads, "p1", &Vec::<i32>::new());
            txn.set(Namespace::Downloads, "p1", &vec![1]);
            // Nothing reaches the backend until the closure returns.
            assert!(store.backend.read(&document_key(Namespace::Downloads, "p1")).unwrap().is_none());
        });

        let pending: Vec<i32> = store.get(Namespace::PendingDownloads, "p1", vec![9]);
        let done: Vec<i32> = store.get(Namespace::Downloads, "p1", Vec::new());
        assert!(pending.is_empty());
        assert_eq!(done, vec![1]);
    }

    #[test]
    fn test_txn_delete() {
        let store = Store::in_memory().unwrap();
        store.set(Namespace::History, "p1", &vec![1, 2, 3]);
        store.atomically(|txn| {
            txn.delete(Namespace::History, "p1");
            // Reads inside the txn already see the delete.
            assert!(txn.get::<Vec<i32>>(Namespace::History, "p1", Vec::new()).is_empty());
        });

        let loaded: Vec<i32> = store.get(Namespace::History, "p1", vec![9]);
        assert_eq!(loaded, vec![9]);
    }

    #[test]
    fn test_in_memory_store_is_redb() {
        assert_eq!(Store::in_memory().unwrap().backend_name(), "redb");
    }

    #[test]
    fn test_txn_reads_its_own_writes() {
        let store = Store::in_memory().unwrap();
        let seen = store.atomically(|txn| {
            txn.set(Namespace::History, "p1", &vec![42]);
            txn.get::<Vec<i32>>(Namespace::History, "p1", Vec::new())
        });
        assert_eq!(seen, vec![42]);
    }

    #[test]
    fn test_failing_backend_never_panics() {
        let store = Store::new(FailingBackend);
        store.set(Namespace::History, "p1", &vec![1]);
        let loaded: Vec<i32> = store.get(Namespace::History, "p1", vec![9]);
        assert_eq!(loaded, vec![9]);
    }
}
