//! Respawn scheduler
//!
//! Keeps every pending respawn of an instance in a keyed table plus a due
//! queue ordered by (due time, spawn id, category), and mirrors each change
//! into the instance's `RespawnStore`. Store failures never roll back the
//! in-memory schedule: the affected spawn is remembered and its current state
//! is written again at the start of the next respawn phase. A failed full
//! clear is retried the same way, ahead of any per-spawn write.
//!
//! Records whose home cell is unloaded when they come due are parked per cell
//! and go back into the due queue, with their original due time, when the
//! cell loads.

use super::respawn_data::{RespawnDecision, RespawnOrderKey, RespawnRecord};
use crate::constants::respawn::DEFAULT_SPAWN_GROUP;
use crate::entity::{SpawnCategory, SpawnKey};
use crate::instance::WorldContext;
use crate::persistence::{PersistOp, PersistenceError, PersistenceResult, RespawnStore};
use crate::types::CellId;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub struct RespawnScheduler {
    instance_id: u32,
    context: Arc<WorldContext>,
    store: Box<dyn RespawnStore>,
    records: BTreeMap<SpawnKey, RespawnRecord>,
    due: BTreeSet<RespawnOrderKey>,
    parked: FxHashMap<CellId, BTreeSet<SpawnKey>>,
    attempts: FxHashMap<SpawnKey, u32>,
    /// Groups whose active state differs from their template default
    toggled_groups: FxHashSet<u32>,
    /// Spawns whose last store write failed
    pending_writes: BTreeSet<SpawnKey>,
    /// A full clear of the instance's rows has not reached the store yet
    pending_delete_all: bool,
}

impl RespawnScheduler {
    pub fn new(instance_id: u32, context: Arc<WorldContext>, store: Box<dyn RespawnStore>) -> Self {
        Self {
            instance_id,
            context,
            store,
            records: BTreeMap::new(),
            due: BTreeSet::new(),
            parked: FxHashMap::default(),
            attempts: FxHashMap::default(),
            toggled_groups: FxHashSet::default(),
            pending_writes: BTreeSet::new(),
            pending_delete_all: false,
        }
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    /// Rebuild the in-memory schedule from the store. Rows are not written back.
    pub fn load_from_store(&mut self) -> PersistenceResult<usize> {
        let rows = self.store.load_all_respawns(self.instance_id)?;
        let count = rows.len();
        for record in rows {
            let key = record.key();
            if self.records.contains_key(&key) {
                log::warn!(
                    "[RespawnScheduler] Instance {}: stored row for {} already loaded, skipping",
                    self.instance_id,
                    key
                );
                continue;
            }
            self.index(record);
        }
        log::info!(
            "[RespawnScheduler] Instance {}: loaded {} respawn records",
            self.instance_id,
            count
        );
        Ok(count)
    }

    fn index(&mut self, record: RespawnRecord) {
        self.due.insert(record.order_key());
        self.records.insert(record.key(), record);
    }

    /// Remove a record's queue entries, keeping the record itself
    fn unindex(&mut self, key: SpawnKey) {
        let Some(record) = self.records.get(&key) else {
            return;
        };
        self.due.remove(&record.order_key());
        let cell = CellId(record.cell_id);
        if let Some(parked) = self.parked.get_mut(&cell) {
            parked.remove(&key);
            if parked.is_empty() {
                self.parked.remove(&cell);
            }
        }
    }

    /// Insert a new record and persist it. A second record for the same
    /// spawn identity is a broken invariant and aborts the instance.
    pub fn add_respawn_info(&mut self, record: RespawnRecord) {
        let key = record.key();
        if let Some(existing) = self.records.get(&key) {
            log::error!(
                "[RespawnScheduler] Instance {}: duplicate respawn record for {} (existing due {}, new due {})",
                self.instance_id,
                key,
                existing.due_time,
                record.due_time
            );
            panic!("Duplicate respawn record for {}", key);
        }
        let op = PersistOp::Save(record.clone());
        self.index(record);
        self.persist(op);
    }

    /// Schedule the respawn of a spawn point that just left the world.
    ///
    /// `zone_players` feeds dynamic respawn scaling. If a record already
    /// exists the earlier due time is kept. Returns the effective due time.
    pub fn save_respawn_time(
        &mut self,
        key: SpawnKey,
        template_id: u32,
        delay_secs: u32,
        cell_id: CellId,
        zone_players: u32,
        now: i64,
    ) -> i64 {
        let delay = self.scaled_delay(key, delay_secs, zone_players);
        let due_time = now + delay as i64;

        if let Some(existing) = self.records.get(&key).map(|r| r.due_time) {
            if due_time < existing {
                self.reschedule(key, due_time);
                return due_time;
            }
            return existing;
        }

        self.add_respawn_info(RespawnRecord {
            category: key.category,
            spawn_id: key.spawn_id,
            template_id,
            due_time,
            cell_id: cell_id.0,
        });
        due_time
    }

    /// Respawn delay after dynamic scaling
    pub fn scaled_delay(&self, key: SpawnKey, delay_secs: u32, zone_players: u32) -> u32 {
        let catalog = self.context.catalog();
        let dynamic = catalog
            .spawn_point(key)
            .and_then(|p| catalog.spawn_group(p.group_id))
            .map_or(false, |g| g.flags.dynamic_spawn_rate);
        if !dynamic || zone_players == 0 {
            return delay_secs;
        }

        let respawn = &self.context.config().respawn;
        let (rate, minimum) = match key.category {
            SpawnCategory::Creature => (
                respawn.creature_dynamic_rate,
                respawn.creature_dynamic_minimum_secs,
            ),
            SpawnCategory::GameObject => (
                respawn.gameobject_dynamic_rate,
                respawn.gameobject_dynamic_minimum_secs,
            ),
            SpawnCategory::AreaTrigger => return delay_secs,
        };

        let factor = rate / zone_players as f32;
        if factor >= 1.0 || delay_secs <= minimum {
            return delay_secs;
        }
        let scaled = (delay_secs as f32 * factor).ceil() as u32;
        scaled.max(minimum)
    }

    pub fn get_respawn_time(&self, key: SpawnKey) -> Option<i64> {
        self.records.get(&key).map(|r| r.due_time)
    }

    pub fn record(&self, key: SpawnKey) -> Option<&RespawnRecord> {
        self.records.get(&key)
    }

    /// All records, ordered by spawn identity
    pub fn records(&self) -> impl Iterator<Item = &RespawnRecord> {
        self.records.values()
    }

    /// Records waiting in the due queue, earliest first (parked records excluded)
    pub fn due_order(&self) -> Vec<SpawnKey> {
        self.due.iter().map(RespawnOrderKey::key).collect()
    }

    pub fn next_due_time(&self) -> Option<i64> {
        self.due.iter().next().map(|k| k.due_time)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Take the earliest record due at or before `now` off the queue. The
    /// record stays in the table until it is completed, cancelled or requeued.
    pub fn pop_due(&mut self, now: i64) -> Option<RespawnRecord> {
        let first = *self.due.iter().next()?;
        if first.due_time > now {
            return None;
        }
        self.due.remove(&first);
        self.records.get(&first.key()).cloned()
    }

    /// Decide what to do with a due record
    pub fn check_respawn(
        &self,
        record: &RespawnRecord,
        now: i64,
        live_instance_exists: bool,
    ) -> RespawnDecision {
        let key = record.key();
        let Some(point) = self.context.catalog().spawn_point(key) else {
            log::warn!(
                "[RespawnScheduler] Instance {}: {} has no spawn point, dropping record",
                self.instance_id,
                key
            );
            return RespawnDecision::Cancel;
        };

        if !self.is_spawn_group_active(point.group_id) {
            let recheck = self.context.config().respawn.group_recheck_secs as i64;
            return RespawnDecision::Reschedule(now + recheck);
        }

        if live_instance_exists {
            log::debug!(
                "[RespawnScheduler] Instance {}: {} is already live, cancelling respawn",
                self.instance_id,
                key
            );
            return RespawnDecision::Cancel;
        }

        RespawnDecision::FireNow
    }

    /// Move a record to a new due time, keeping it in the table
    pub fn reschedule(&mut self, key: SpawnKey, due_time: i64) -> bool {
        if !self.records.contains_key(&key) {
            return false;
        }
        self.unindex(key);
        let op = match self.records.get_mut(&key) {
            Some(record) => {
                record.due_time = due_time;
                self.due.insert(record.order_key());
                PersistOp::Save(record.clone())
            }
            None => return false,
        };
        self.persist(op);
        true
    }

    /// Make a pending respawn due immediately
    pub fn respawn_now(&mut self, key: SpawnKey, now: i64) -> bool {
        self.reschedule(key, now)
    }

    /// Drop a record. The stored row is deleted when a record existed, or
    /// unconditionally with `always_delete_from_store`.
    pub fn remove_respawn_time(
        &mut self,
        key: SpawnKey,
        always_delete_from_store: bool,
    ) -> Option<RespawnRecord> {
        self.unindex(key);
        let removed = self.records.remove(&key);
        self.attempts.remove(&key);
        if removed.is_some() || always_delete_from_store {
            self.persist(PersistOp::Delete {
                category: key.category,
                spawn_id: key.spawn_id,
            });
        }
        removed
    }

    /// Hold a popped record until its home cell loads
    pub fn park(&mut self, key: SpawnKey) -> bool {
        let Some(cell) = self.records.get(&key).map(|r| CellId(r.cell_id)) else {
            return false;
        };
        self.unindex(key);
        self.parked.entry(cell).or_default().insert(key);
        log::debug!(
            "[RespawnScheduler] Instance {}: parked {} until {} loads",
            self.instance_id,
            key,
            cell
        );
        true
    }

    pub fn is_parked(&self, key: SpawnKey) -> bool {
        self.records
            .get(&key)
            .and_then(|r| self.parked.get(&CellId(r.cell_id)))
            .map_or(false, |set| set.contains(&key))
    }

    /// Return the records parked on `cell` to the due queue
    pub fn on_cell_loaded(&mut self, cell: CellId) -> usize {
        let Some(keys) = self.parked.remove(&cell) else {
            return 0;
        };
        let mut requeued = 0;
        for key in keys {
            if let Some(record) = self.records.get(&key) {
                self.due.insert(record.order_key());
                requeued += 1;
            }
        }
        requeued
    }

    /// Push a failed materialization back with exponential backoff.
    /// Returns the new due time.
    pub fn record_failure(&mut self, key: SpawnKey, now: i64) -> Option<i64> {
        if !self.records.contains_key(&key) {
            return None;
        }
        let attempts = {
            let counter = self.attempts.entry(key).or_insert(0);
            *counter += 1;
            *counter
        };

        let respawn = &self.context.config().respawn;
        let shift = (attempts - 1).min(16);
        let delay = (respawn.retry_base_secs as u64)
            .saturating_mul(1u64 << shift)
            .min(respawn.retry_max_secs as u64);
        let due_time = now + delay as i64;

        log::warn!(
            "[RespawnScheduler] Instance {}: respawn of {} failed (attempt {}), retrying at {}",
            self.instance_id,
            key,
            attempts,
            due_time
        );
        self.reschedule(key, due_time);
        Some(due_time)
    }

    pub fn attempts(&self, key: SpawnKey) -> u32 {
        self.attempts.get(&key).copied().unwrap_or(0)
    }

    /// Group 0 is always active; other groups follow their template default
    /// unless toggled. Unknown groups count as inactive.
    pub fn is_spawn_group_active(&self, group_id: u32) -> bool {
        if group_id == DEFAULT_SPAWN_GROUP {
            return true;
        }
        match self.context.catalog().spawn_group(group_id) {
            Some(group) => group.active_by_default() != self.toggled_groups.contains(&group_id),
            None => false,
        }
    }

    pub fn set_spawn_group_active(&mut self, group_id: u32, active: bool) -> bool {
        if group_id == DEFAULT_SPAWN_GROUP {
            return active;
        }
        let Some(group) = self.context.catalog().spawn_group(group_id) else {
            log::warn!(
                "[RespawnScheduler] Instance {}: cannot toggle unknown spawn group {}",
                self.instance_id,
                group_id
            );
            return false;
        };
        if active == group.active_by_default() {
            self.toggled_groups.remove(&group_id);
        } else {
            self.toggled_groups.insert(group_id);
        }
        true
    }

    fn persist(&mut self, op: PersistOp) {
        match op.apply(self.store.as_mut(), self.instance_id) {
            Ok(()) => {
                if let Some(key) = op.key() {
                    self.pending_writes.remove(&key);
                }
            }
            Err(e) => {
                log::warn!(
                    "[RespawnScheduler] Instance {}: {} failed, will retry: {}",
                    self.instance_id,
                    op,
                    e
                );
                self.mark_pending(&op);
            }
        }
    }

    fn mark_pending(&mut self, op: &PersistOp) {
        match op.key() {
            Some(key) => {
                self.pending_writes.insert(key);
            }
            None => self.pending_delete_all = true,
        }
    }

    /// The write that brings the store in line with memory for `key`
    fn current_op(&self, key: SpawnKey) -> PersistOp {
        match self.records.get(&key) {
            Some(record) => PersistOp::Save(record.clone()),
            None => PersistOp::Delete {
                category: key.category,
                spawn_id: key.spawn_id,
            },
        }
    }

    /// Collect asynchronously failed writes and retry everything pending.
    /// Returns how many spawns are still waiting for a successful write.
    pub fn retry_failed_writes(&mut self) -> usize {
        for op in self.store.take_failed_writes() {
            self.mark_pending(&op);
        }
        if self.pending_delete_all {
            if let Err(e) = self.store.delete_all_respawns(self.instance_id) {
                log::warn!(
                    "[RespawnScheduler] Instance {}: clearing stored respawns failed again: {}",
                    self.instance_id,
                    e
                );
                return self.pending_write_count();
            }
            self.pending_delete_all = false;
            // Rows written since the failed clear may have been wiped with it
            let live: Vec<SpawnKey> = self.records.keys().copied().collect();
            self.pending_writes.extend(live);
        }
        if self.pending_writes.is_empty() {
            return 0;
        }

        let keys: Vec<SpawnKey> = self.pending_writes.iter().copied().collect();
        for key in keys {
            let op = self.current_op(key);
            if op.apply(self.store.as_mut(), self.instance_id).is_ok() {
                self.pending_writes.remove(&key);
            }
        }
        if !self.pending_writes.is_empty() {
            log::warn!(
                "[RespawnScheduler] Instance {}: {} respawn writes still pending",
                self.instance_id,
                self.pending_writes.len()
            );
        }
        self.pending_write_count()
    }

    /// Spawns waiting for a successful write, plus one for a pending clear
    pub fn pending_write_count(&self) -> usize {
        self.pending_writes.len() + usize::from(self.pending_delete_all)
    }

    /// Retry pending writes and flush the store. Fails when some write
    /// still has not reached the store afterwards.
    pub fn flush(&mut self) -> PersistenceResult<()> {
        self.retry_failed_writes();
        self.store.flush()?;
        // Async stores report failures only once the flush has drained them,
        // and the retries they get are themselves queued
        self.retry_failed_writes();
        self.store.flush()?;
        for op in self.store.take_failed_writes() {
            self.mark_pending(&op);
        }

        let pending = self.pending_write_count();
        if pending > 0 {
            log::error!(
                "[RespawnScheduler] Instance {}: {} respawn writes not persisted",
                self.instance_id,
                pending
            );
            return Err(PersistenceError::SaveFailed(format!(
                "{} respawn writes for instance {} not persisted",
                pending, self.instance_id
            )));
        }
        Ok(())
    }

    /// Forget every record and clear the instance's rows in the store. A
    /// failed clear stays pending until a retry or flush gets it through.
    pub fn delete_all(&mut self) {
        self.records.clear();
        self.due.clear();
        self.parked.clear();
        self.attempts.clear();
        // The clear supersedes every per-spawn write
        self.pending_writes.clear();
        self.persist(PersistOp::DeleteAll);
    }
}

impl std::fmt::Debug for RespawnScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RespawnScheduler")
            .field("instance_id", &self.instance_id)
            .field("records", &self.records.len())
            .field("parked_cells", &self.parked.len())
            .field("pending_writes", &self.pending_write_count())
            .finish()
    }
}
