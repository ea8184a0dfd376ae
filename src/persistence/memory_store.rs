//! In-memory respawn store
//!
//! Clones share one table, so a test can hand a clone to an instance, drop
//! the instance and build a new one from the same rows to simulate a
//! restart. Writes can be made to fail on demand.

use super::{PersistenceError, PersistenceResult, RespawnStore};
use crate::entity::SpawnCategory;
use crate::respawn::RespawnRecord;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

type RowKey = (u32, SpawnCategory, u64);

#[derive(Debug, Default)]
struct MemoryTable {
    rows: BTreeMap<RowKey, RespawnRecord>,
    failing_writes: u32,
    writes: u64,
}

impl MemoryTable {
    fn begin_write(&mut self) -> PersistenceResult<()> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(PersistenceError::SaveFailed(
                "injected write failure".to_string(),
            ));
        }
        self.writes += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRespawnStore {
    table: Arc<Mutex<MemoryTable>>,
}

impl MemoryRespawnStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail
    pub fn fail_next_writes(&self, count: u32) {
        self.table.lock().failing_writes = count;
    }

    pub fn row_count(&self, instance_id: u32) -> usize {
        self.table
            .lock()
            .rows
            .keys()
            .filter(|(id, _, _)| *id == instance_id)
            .count()
    }

    pub fn row(&self, instance_id: u32, category: SpawnCategory, spawn_id: u64) -> Option<RespawnRecord> {
        self.table
            .lock()
            .rows
            .get(&(instance_id, category, spawn_id))
            .cloned()
    }

    /// Successful writes so far
    pub fn write_count(&self) -> u64 {
        self.table.lock().writes
    }
}

impl RespawnStore for MemoryRespawnStore {
    fn save_respawn(&mut self, instance_id: u32, record: &RespawnRecord) -> PersistenceResult<()> {
        let mut table = self.table.lock();
        table.begin_write()?;
        table
            .rows
            .insert((instance_id, record.category, record.spawn_id), record.clone());
        Ok(())
    }

    fn delete_respawn(
        &mut self,
        instance_id: u32,
        category: SpawnCategory,
        spawn_id: u64,
    ) -> PersistenceResult<()> {
        let mut table = self.table.lock();
        table.begin_write()?;
        table.rows.remove(&(instance_id, category, spawn_id));
        Ok(())
    }

    fn load_all_respawns(&mut self, instance_id: u32) -> PersistenceResult<Vec<RespawnRecord>> {
        Ok(self
            .table
            .lock()
            .rows
            .iter()
            .filter(|((id, _, _), _)| *id == instance_id)
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn delete_all_respawns(&mut self, instance_id: u32) -> PersistenceResult<()> {
        let mut table = self.table.lock();
        table.begin_write()?;
        table.rows.retain(|(id, _, _), _| *id != instance_id);
        Ok(())
    }
}
