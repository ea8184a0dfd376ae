//! Persistence Module - respawn schedule storage
//!
//! The respawn schedule is mirrored into a `RespawnStore` keyed by
//! (instance id, spawn category, spawn id). In-memory state stays
//! authoritative for the running instance; the store exists so the schedule
//! survives a restart.

pub mod async_store;
pub mod file_store;
pub mod memory_store;

pub use async_store::AsyncRespawnStore;
pub use file_store::FileRespawnStore;
pub use memory_store::MemoryRespawnStore;

use crate::config::{PersistenceBackend, PersistenceConfig};
use crate::entity::{SpawnCategory, SpawnKey};
use crate::respawn::RespawnRecord;

pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Save failed: {0}")]
    SaveFailed(String),
    #[error("Delete failed: {0}")]
    DeleteFailed(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("Corrupted data: {0}")]
    CorruptedData(String),
    #[error("Writer unavailable: {0}")]
    WriterUnavailable(String),
}

/// One store write, kept for retry when it fails
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOp {
    Save(RespawnRecord),
    Delete { category: SpawnCategory, spawn_id: u64 },
    /// Clear every row of the instance
    DeleteAll,
}

impl PersistOp {
    /// The spawn this write is about; `None` for a full clear
    pub fn key(&self) -> Option<SpawnKey> {
        match self {
            PersistOp::Save(record) => Some(record.key()),
            PersistOp::Delete { category, spawn_id } => Some(SpawnKey::new(*category, *spawn_id)),
            PersistOp::DeleteAll => None,
        }
    }

    /// Apply this operation to `store` for `instance_id`
    pub fn apply(&self, store: &mut dyn RespawnStore, instance_id: u32) -> PersistenceResult<()> {
        match self {
            PersistOp::Save(record) => store.save_respawn(instance_id, record),
            PersistOp::Delete { category, spawn_id } => {
                store.delete_respawn(instance_id, *category, *spawn_id)
            }
            PersistOp::DeleteAll => store.delete_all_respawns(instance_id),
        }
    }
}

impl std::fmt::Display for PersistOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistOp::Save(record) => write!(f, "save of {}", record.key()),
            PersistOp::Delete { category, spawn_id } => {
                write!(f, "delete of {}", SpawnKey::new(*category, *spawn_id))
            }
            PersistOp::DeleteAll => write!(f, "delete of all rows"),
        }
    }
}

/// Durable backing of the respawn schedule
pub trait RespawnStore: Send {
    /// Insert or replace the row for the record's spawn identity
    fn save_respawn(&mut self, instance_id: u32, record: &RespawnRecord) -> PersistenceResult<()>;

    fn delete_respawn(
        &mut self,
        instance_id: u32,
        category: SpawnCategory,
        spawn_id: u64,
    ) -> PersistenceResult<()>;

    fn load_all_respawns(&mut self, instance_id: u32) -> PersistenceResult<Vec<RespawnRecord>>;

    fn delete_all_respawns(&mut self, instance_id: u32) -> PersistenceResult<()>;

    /// Block until every accepted write has reached the backing medium
    fn flush(&mut self) -> PersistenceResult<()> {
        Ok(())
    }

    /// Writes that failed after being accepted, for stores that report
    /// failures asynchronously
    fn take_failed_writes(&mut self) -> Vec<PersistOp> {
        Vec::new()
    }
}

/// Build the store described by `config`
pub fn open_store(config: &PersistenceConfig) -> PersistenceResult<Box<dyn RespawnStore>> {
    match (config.backend, config.asynchronous) {
        (PersistenceBackend::Memory, false) => Ok(Box::new(MemoryRespawnStore::new())),
        (PersistenceBackend::Memory, true) => {
            Ok(Box::new(AsyncRespawnStore::spawn(MemoryRespawnStore::new())?))
        }
        (PersistenceBackend::File, false) => {
            Ok(Box::new(FileRespawnStore::open(&config.directory)?))
        }
        (PersistenceBackend::File, true) => Ok(Box::new(AsyncRespawnStore::spawn(
            FileRespawnStore::open(&config.directory)?,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(spawn_id: u64) -> RespawnRecord {
        RespawnRecord {
            category: SpawnCategory::Creature,
            spawn_id,
            template_id: 1,
            due_time: 100,
            cell_id: 0,
        }
    }

    #[test]
    fn test_persist_op_apply() {
        let mut store = MemoryRespawnStore::new();
        PersistOp::Save(record(3)).apply(&mut store, 1).expect("save");
        assert_eq!(store.row_count(1), 1);

        let delete = PersistOp::Delete {
            category: SpawnCategory::Creature,
            spawn_id: 3,
        };
        assert_eq!(delete.key(), Some(SpawnKey::creature(3)));
        delete.apply(&mut store, 1).expect("delete");
        assert_eq!(store.row_count(1), 0);

        PersistOp::Save(record(4)).apply(&mut store, 2).expect("save");
        assert_eq!(PersistOp::DeleteAll.key(), None);
        PersistOp::DeleteAll.apply(&mut store, 2).expect("delete all");
        assert_eq!(store.row_count(2), 0);
    }

    #[test]
    fn test_open_store_for_each_backend() {
        let dir = TempDir::new().expect("temp dir");
        for (backend, asynchronous) in [
            (PersistenceBackend::Memory, false),
            (PersistenceBackend::Memory, true),
            (PersistenceBackend::File, false),
            (PersistenceBackend::File, true),
        ] {
            let config = PersistenceConfig {
                backend,
                directory: dir.path().join(format!("{:?}-{}", backend, asynchronous)),
                asynchronous,
            };
            let mut store = open_store(&config).expect("open store");
            store.save_respawn(9, &record(1)).expect("save");
            store.flush().expect("flush");
            assert_eq!(store.load_all_respawns(9).expect("load").len(), 1);
        }
    }
}
