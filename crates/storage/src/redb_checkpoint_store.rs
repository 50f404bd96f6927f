// Path: crates/storage/src/redb_checkpoint_store.rs

use std::path::Path;
use std::sync::Arc;

use meridian_api::checkpoint::CheckpointStore;
use meridian_types::chain::{RuntimeId, WatcherState};
use meridian_types::codec;
use meridian_types::error::StorageError;
use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};

/// ---- Table definitions ----
/// One entry per runtime; key is the 32-byte runtime id, value is the
/// canonical encoding of [`WatcherState`].
const WATCHER_STATE: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("WATCHER_STATE");

/// A `redb`-backed [`CheckpointStore`].
///
/// Writes go through a single write transaction per `put`, so the recorded
/// state is always either the previous or the new value, never torn.
#[derive(Clone)]
pub struct RedbCheckpointStore {
    db: Arc<Database>,
}

impl RedbCheckpointStore {
    /// Opens (or creates) the checkpoint database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = Database::create(path).map_err(|e| StorageError::Backend(e.to_string()))?;
        // Ensure tables exist
        {
            let w = db
                .begin_write()
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            {
                w.open_table(WATCHER_STATE)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
            }
            w.commit()
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        Ok(Self { db: Arc::new(db) })
    }

    fn read_txn(&self) -> Result<ReadTransaction<'_>, StorageError> {
        self.db
            .begin_read()
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    fn write_txn(&self) -> Result<WriteTransaction<'_>, StorageError> {
        self.db
            .begin_write()
            .map_err(|e| StorageError::Backend(e.to_string()))
    }
}

impl CheckpointStore for RedbCheckpointStore {
    fn get(&self, runtime_id: RuntimeId) -> Result<Option<WatcherState>, StorageError> {
        let r = self.read_txn()?;
        let t = r
            .open_table(WATCHER_STATE)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let Some(guard) = t
            .get(&runtime_id.0)
            .map_err(|e| StorageError::Backend(e.to_string()))?
        else {
            return Ok(None);
        };
        let state = codec::from_bytes_canonical(guard.value()).map_err(StorageError::Decode)?;
        Ok(Some(state))
    }

    fn put(&self, runtime_id: RuntimeId, state: &WatcherState) -> Result<(), StorageError> {
        let bytes = codec::to_bytes_canonical(state).map_err(StorageError::Encode)?;
        let w = self.write_txn()?;
        {
            let mut t = w
                .open_table(WATCHER_STATE)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            t.insert(&runtime_id.0, bytes.as_slice())
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        w.commit()
            .map_err(|e| StorageError::Backend(e.to_string()))
    }
}
