//! Persistent managed-path state
//!
//! The deletion sweep needs to know what earlier runs deployed. After every run
//! the set of applied paths is stored as a [`ManagedManifest`], one per sync root,
//! in the `managedPaths` bucket of a [`PersistentState`].

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use settle_core::path::RelPath;
use settle_core::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::RwLock;

pub const MANAGED_PATHS_BUCKET: &str = "managedPaths";

/// File name of the state database inside the state directory
pub const STATE_DB_NAME: &str = "state.db";

/// Trait for persistent state storage
pub trait PersistentState: Send + Sync {
    /// Get a value from a bucket
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Set a value in a bucket
    fn set(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key from a bucket
    fn delete(&self, bucket: &str, key: &[u8]) -> Result<()>;

    /// Close the database
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Persistent state implementation using redb
pub struct RedbPersistentState {
    db: Database,
}

const _: () = {
    const fn assert_send<T: Send>() {}
    const fn assert_sync<T: Sync>() {}

    let _ = assert_send::<RedbPersistentState>;
    let _ = assert_sync::<RedbPersistentState>;
};

impl RedbPersistentState {
    /// Create or open a persistent state database
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::directory_create(parent, e))?;
        }
        let db = Database::create(path)
            .map_err(|e| Error::State(format!("Failed to create database: {e}")))?;
        Ok(Self { db })
    }

    fn table(bucket: &str) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
        TableDefinition::new(bucket)
    }
}

impl PersistentState for RedbPersistentState {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| Error::State(format!("Failed to begin read transaction: {e}")))?;

        let Ok(table) = read_txn.open_table(Self::table(bucket)) else {
            // Table doesn't exist yet
            return Ok(None);
        };

        match table.get(key) {
            Ok(Some(value)) => Ok(Some(value.value().to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(Error::State(format!("Failed to get value: {e}"))),
        }
    }

    fn set(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| Error::State(format!("Failed to begin write transaction: {e}")))?;
        {
            let mut table = write_txn
                .open_table(Self::table(bucket))
                .map_err(|e| Error::State(format!("Failed to open table: {e}")))?;
            table
                .insert(key, value)
                .map_err(|e| Error::State(format!("Failed to insert value: {e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| Error::State(format!("Failed to commit transaction: {e}")))
    }

    fn delete(&self, bucket: &str, key: &[u8]) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| Error::State(format!("Failed to begin write transaction: {e}")))?;
        {
            let mut table = write_txn
                .open_table(Self::table(bucket))
                .map_err(|e| Error::State(format!("Failed to open table: {e}")))?;
            table
                .remove(key)
                .map_err(|e| Error::State(format!("Failed to remove value: {e}")))?;
        }
        write_txn
            .commit()
            .map_err(|e| Error::State(format!("Failed to commit transaction: {e}")))
    }

    fn close(self) -> Result<()> {
        drop(self.db);
        Ok(())
    }
}

/// Compute SHA256 hash of data
pub fn hash_data(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub enum ManagedKind {
    Directory,
    File,
}

/// What was deployed at one managed path
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct ManagedEntry {
    pub kind: ManagedKind,
    pub content_hash: Option<Vec<u8>>,
    /// Permission bits written from the source
    pub mode: Option<u32>,
    /// Permission bits the target had once its node finished, post hook included
    pub deployed_mode: Option<u32>,
}

impl ManagedEntry {
    pub fn directory() -> Self {
        Self {
            kind: ManagedKind::Directory,
            content_hash: None,
            mode: None,
            deployed_mode: None,
        }
    }

    pub fn file(content: &[u8], mode: Option<u32>) -> Self {
        Self {
            kind: ManagedKind::File,
            content_hash: Some(hash_data(content)),
            mode,
            deployed_mode: mode,
        }
    }

    /// Whether `self`, left by an earlier run, explains a target that holds
    /// `entry`'s content with permission bits `current_mode`
    ///
    /// A post hook that changes the mode of its file leaves the target differing
    /// from the source on every later run; the recorded deployed mode accounts
    /// for that.
    pub fn explains(&self, entry: &ManagedEntry, current_mode: Option<u32>) -> bool {
        self.kind == entry.kind
            && self.content_hash == entry.content_hash
            && self.mode == entry.mode
            && self.deployed_mode == current_mode
    }
}

/// Managed paths of one sync root, keyed by `/`-separated relative path
#[derive(Debug, Clone, Default, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct ManagedManifest {
    entries: BTreeMap<String, ManagedEntry>,
}

impl ManagedManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &RelPath, entry: ManagedEntry) {
        self.entries.insert(path.to_key(), entry);
    }

    pub fn get(&self, path: &RelPath) -> Option<&ManagedEntry> {
        self.entries.get(&path.to_key())
    }

    pub fn contains(&self, path: &RelPath) -> bool {
        self.entries.contains_key(&path.to_key())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose key is a contained relative path
    ///
    /// Keys that would escape the sync root are skipped.
    pub fn paths(&self) -> impl Iterator<Item = (RelPath, &ManagedEntry)> {
        self.entries.iter().filter_map(|(key, entry)| match RelPath::from_key(key) {
            Ok(rel) if !rel.is_root() && !key.starts_with('/') => Some((rel, entry)),
            _ => {
                tracing::warn!(path = %key, "Ignoring managed path outside the sync root");
                None
            }
        })
    }

    /// Serialize to bytes using bincode
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| Error::State(format!("Failed to encode manifest: {e}")))
    }

    /// Deserialize from bytes using bincode
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::decode_from_slice(bytes, bincode::config::standard())
            .map(|(manifest, _len)| manifest)
            .map_err(|e| Error::State(format!("Failed to decode manifest: {e}")))
    }
}

/// Load and save the manifest of one sync root
pub struct ManifestStore<'a, T: PersistentState + ?Sized> {
    db: &'a T,
    key: Vec<u8>,
}

impl<'a, T: PersistentState + ?Sized> ManifestStore<'a, T> {
    pub fn new(db: &'a T, sync_root: &Path) -> Self {
        Self {
            db,
            key: sync_root.to_string_lossy().as_bytes().to_vec(),
        }
    }

    /// Load the manifest; a missing or unreadable manifest is empty
    pub fn load(&self) -> Result<ManagedManifest> {
        match self.db.get(MANAGED_PATHS_BUCKET, &self.key)? {
            Some(bytes) => Ok(ManagedManifest::from_bytes(&bytes).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Discarding unreadable managed-path manifest");
                ManagedManifest::new()
            })),
            None => Ok(ManagedManifest::new()),
        }
    }

    pub fn save(&self, manifest: &ManagedManifest) -> Result<()> {
        if manifest.is_empty() {
            return self.db.delete(MANAGED_PATHS_BUCKET, &self.key);
        }
        self.db
            .set(MANAGED_PATHS_BUCKET, &self.key, &manifest.to_bytes()?)
    }
}

type BucketData = HashMap<Vec<u8>, Vec<u8>>;
type StateData = HashMap<String, BucketData>;

/// Mock persistent state for testing
#[derive(Default)]
pub struct MockPersistentState {
    data: RwLock<StateData>,
}

impl MockPersistentState {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> Error {
        Error::State("MockPersistentState lock poisoned".to_string())
    }
}

impl PersistentState for MockPersistentState {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let data = self.data.read().map_err(|_| Self::poisoned())?;
        Ok(data.get(bucket).and_then(|b| b.get(key).cloned()))
    }

    fn set(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let mut data = self.data.write().map_err(|_| Self::poisoned())?;
        data.entry(bucket.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, bucket: &str, key: &[u8]) -> Result<()> {
        let mut data = self.data.write().map_err(|_| Self::poisoned())?;
        if let Some(bucket_data) = data.get_mut(bucket) {
            bucket_data.remove(key);
        }
        Ok(())
    }

    fn close(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use tempfile::TempDir;

    fn manifest() -> ManagedManifest {
        let mut manifest = ManagedManifest::new();
        manifest.insert(&RelPath::from_key("dir1").unwrap(), ManagedEntry::directory());
        manifest.insert(
            &RelPath::from_key("dir1/f1.txt").unwrap(),
            ManagedEntry::file(b"hello", Some(0o644)),
        );
        manifest
    }

    #[test]
    fn test_redb_roundtrip() {
        let temp = TempDir::new().unwrap();
        let db = RedbPersistentState::new(temp.path().join("nested/state.db")).unwrap();

        db.set("bucket", b"k", b"v").unwrap();
        assert_eq!(db.get("bucket", b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(db.get("missing", b"k").unwrap(), None);

        db.delete("bucket", b"k").unwrap();
        assert_eq!(db.get("bucket", b"k").unwrap(), None);
        db.close().unwrap();
    }

    #[test]
    fn test_manifest_store_per_sync_root() {
        let db = MockPersistentState::new();
        let a = ManifestStore::new(&db, Path::new("/srv/a"));
        let b = ManifestStore::new(&db, Path::new("/srv/b"));

        a.save(&manifest()).unwrap();
        assert_eq!(a.load().unwrap(), manifest());
        assert!(b.load().unwrap().is_empty());
    }

    #[test]
    fn test_empty_manifest_deletes_key() {
        let db = MockPersistentState::new();
        let store = ManifestStore::new(&db, Path::new("/srv/a"));
        store.save(&manifest()).unwrap();
        store.save(&ManagedManifest::new()).unwrap();
        assert_eq!(db.get(MANAGED_PATHS_BUCKET, b"/srv/a").unwrap(), None);
    }

    #[test]
    fn test_corrupt_manifest_loads_empty() {
        let db = MockPersistentState::new();
        db.set(MANAGED_PATHS_BUCKET, b"/srv/a", &[0xff, 0xff, 0xff])
            .unwrap();
        let store = ManifestStore::new(&db, Path::new("/srv/a"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_paths_skip_escaping_keys() {
        let mut manifest = manifest();
        manifest
            .entries
            .insert("../etc/passwd".to_string(), ManagedEntry::directory());
        manifest
            .entries
            .insert("/etc/shadow".to_string(), ManagedEntry::directory());

        let keys: Vec<String> = manifest.paths().map(|(p, _)| p.to_key()).collect();
        assert_eq!(keys, vec!["dir1", "dir1/f1.txt"]);
    }

    #[test]
    fn test_entry_explains_mode_left_by_hook() {
        let mut previous = ManagedEntry::file(b"hello", Some(0o644));
        previous.deployed_mode = Some(0o600);
        let current = ManagedEntry::file(b"hello", Some(0o644));

        assert!(previous.explains(&current, Some(0o600)));
        assert!(!previous.explains(&current, Some(0o640)));
        assert!(!previous.explains(&ManagedEntry::file(b"other", Some(0o644)), Some(0o600)));
        assert!(!previous.explains(&ManagedEntry::file(b"hello", Some(0o755)), Some(0o600)));
    }

    #[test]
    fn test_manifest_get() {
        let manifest = manifest();
        let rel = RelPath::from_key("dir1/f1.txt").unwrap();
        assert_eq!(manifest.get(&rel).unwrap().mode, Some(0o644));
        assert!(manifest.get(&RelPath::from_key("nope").unwrap()).is_none());
    }

    #[test]
    fn test_hash_data() {
        assert_eq!(hash_data(b"abc"), hash_data(b"abc"));
        assert_ne!(hash_data(b"abc"), hash_data(b"abd"));
        assert_eq!(hash_data(b"").len(), 32);
    }
}
