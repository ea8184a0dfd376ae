//! Spawn points, respawn records and spawn groups on a world instance

use super::world_instance::WorldInstance;
use crate::content::{MaterializeError, SpawnPoint};
use crate::entity::SpawnKey;
use crate::error::{OptionExt, RealmError, RealmResult};
use crate::grid::ops;
use crate::guid::ObjectGuid;
use crate::respawn::{RespawnDecision, RespawnRecord, RespawnStats};
use crate::types::CellId;
use std::sync::Arc;

/// Result of a respawn attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespawnOutcome {
    Spawned(ObjectGuid),
    /// Home cell unloaded, the record waits for it to load
    Parked,
    /// Materialization failed, retried at `retry_at`
    Failed { retry_at: i64 },
    /// No record for the spawn identity
    NoRecord,
}

impl WorldInstance {
    /// Materialize the spawn points homed in a freshly loaded cell
    pub(crate) fn populate_cell(&mut self, cell_id: CellId) -> usize {
        let context = Arc::clone(&self.context);
        let mut spawned = 0;
        for key in context.spawns_in_cell(cell_id) {
            let key = *key;
            if self.respawns.record(key).is_some()
                || self.store.has_spawn(key)
                || self.queues.has_pending_spawn(key)
            {
                continue;
            }
            let Some(point) = context.catalog().spawn_point(key) else {
                continue;
            };
            if !self.respawns.is_spawn_group_active(point.group_id) {
                continue;
            }
            match self.materialize_spawn(point, point.template_id) {
                Ok(_) => spawned += 1,
                Err(e) => log::warn!(
                    "[WorldInstance] Instance {}: failed to spawn {} in {}: {}",
                    self.instance_id,
                    key,
                    cell_id,
                    e
                ),
            }
        }
        spawned
    }

    pub(crate) fn materialize_spawn(
        &mut self,
        point: &SpawnPoint,
        template_id: u32,
    ) -> Result<ObjectGuid, MaterializeError> {
        let entity = self
            .materialize(
                template_id,
                point.key.category.guid_category(),
                point.position,
                Some(point.key),
            )?
            .with_spawn(point.key, point.respawn_delay_secs);
        let guid = entity.guid;
        if !self.add_to_map(entity) {
            return Err(MaterializeError::InvalidPosition {
                x: point.position.x,
                y: point.position.y,
            });
        }
        Ok(guid)
    }

    // Respawn records

    /// Insert a respawn record. A second record for the same spawn identity
    /// is fatal.
    pub fn add_respawn_info(&mut self, record: RespawnRecord) {
        self.respawns.add_respawn_info(record);
    }

    pub fn get_respawn_time(&self, key: SpawnKey) -> Option<i64> {
        self.respawns.get_respawn_time(key)
    }

    pub fn respawn_records(&self) -> impl Iterator<Item = &RespawnRecord> {
        self.respawns.records()
    }

    pub fn remove_respawn_time(
        &mut self,
        key: SpawnKey,
        always_delete_from_store: bool,
    ) -> Option<RespawnRecord> {
        self.respawns.remove_respawn_time(key, always_delete_from_store)
    }

    /// Make a pending respawn due on the next respawn check
    pub fn respawn_now(&mut self, key: SpawnKey) -> bool {
        let now = self.game_time();
        self.respawns.respawn_now(key, now)
    }

    /// Materialize the entity for a respawn record. The record is deleted on
    /// success, parked when its home cell is unloaded and pushed back with
    /// backoff when materialization fails.
    pub fn do_respawn(&mut self, key: SpawnKey) -> RespawnOutcome {
        let Some(record) = self.respawns.record(key).cloned() else {
            return RespawnOutcome::NoRecord;
        };
        let now = self.game_time();

        let home_loaded = ops::coord_of_id(&self.grid.geometry, CellId(record.cell_id))
            .map_or(false, |coord| ops::is_loaded(&self.grid, coord));
        if !home_loaded {
            self.respawns.park(key);
            return RespawnOutcome::Parked;
        }

        let context = Arc::clone(&self.context);
        let result = match context.catalog().spawn_point(key) {
            Some(point) => self.materialize_spawn(point, record.template_id),
            None => Err(MaterializeError::SpawnPointMissing { spawn: key }),
        };

        match result {
            Ok(guid) => {
                self.respawns.remove_respawn_time(key, true);
                log::debug!(
                    "[WorldInstance] Instance {}: {} respawned as {}",
                    self.instance_id,
                    key,
                    guid
                );
                RespawnOutcome::Spawned(guid)
            }
            Err(e) => {
                log::warn!(
                    "[WorldInstance] Instance {}: respawn of {} failed: {}",
                    self.instance_id,
                    key,
                    e
                );
                let retry_at = self.respawns.record_failure(key, now).unwrap_or(now);
                RespawnOutcome::Failed { retry_at }
            }
        }
    }

    /// Retry failed persistence writes, then fire every respawn due by now
    /// in due order
    pub(crate) fn process_respawns(&mut self) -> RespawnStats {
        let mut stats = RespawnStats::default();
        let retried = self.respawns.retry_failed_writes();
        if retried > 0 {
            log::debug!(
                "[WorldInstance] Instance {}: retried {} respawn writes",
                self.instance_id,
                retried
            );
        }

        let now = self.game_time();
        while let Some(record) = self.respawns.pop_due(now) {
            let key = record.key();
            let live = self.store.has_spawn(key) || self.queues.has_pending_spawn(key);
            match self.respawns.check_respawn(&record, now, live) {
                RespawnDecision::FireNow => match self.do_respawn(key) {
                    RespawnOutcome::Spawned(_) => stats.fired += 1,
                    RespawnOutcome::Parked => stats.parked += 1,
                    RespawnOutcome::Failed { .. } => stats.failed += 1,
                    RespawnOutcome::NoRecord => {}
                },
                RespawnDecision::Reschedule(due_time) => {
                    self.respawns.reschedule(key, due_time.max(now + 1));
                    stats.rescheduled += 1;
                }
                RespawnDecision::Cancel => {
                    self.respawns.remove_respawn_time(key, true);
                    stats.cancelled += 1;
                }
            }
        }
        stats
    }

    // Spawn groups

    pub fn is_spawn_group_active(&self, group_id: u32) -> bool {
        self.respawns.is_spawn_group_active(group_id)
    }

    pub fn set_spawn_group_active(&mut self, group_id: u32, active: bool) -> bool {
        self.respawns.set_spawn_group_active(group_id, active)
    }

    /// Enable a spawn group and materialize its members right away.
    ///
    /// `force` or `ignore_respawn` clear pending respawn timers first; members
    /// still holding a timer are skipped. Live members are skipped unless
    /// `force`. Members homed in unloaded cells spawn when the cell loads.
    pub fn spawn_group_spawn(
        &mut self,
        group_id: u32,
        ignore_respawn: bool,
        force: bool,
    ) -> RealmResult<Vec<ObjectGuid>> {
        let context = Arc::clone(&self.context);
        let group = context
            .catalog()
            .spawn_group(group_id)
            .ok_or_realm(|| RealmError::UnknownSpawnGroup { id: group_id })?;
        if group.flags.system {
            log::warn!(
                "[WorldInstance] Instance {}: refusing to spawn engine-managed group {}",
                self.instance_id,
                group_id
            );
            return Err(RealmError::SystemSpawnGroup { id: group_id });
        }

        self.respawns.set_spawn_group_active(group_id, true);

        let mut spawned = Vec::new();
        for key in &group.members {
            let key = *key;
            if force || ignore_respawn {
                self.respawns.remove_respawn_time(key, false);
            }
            if self.respawns.get_respawn_time(key).is_some() {
                continue;
            }
            if !force && (self.store.has_spawn(key) || self.queues.has_pending_spawn(key)) {
                continue;
            }
            let Some(point) = context.catalog().spawn_point(key) else {
                continue;
            };
            let loaded = ops::coord_for(&self.grid.geometry, &point.position)
                .map_or(false, |coord| ops::is_loaded(&self.grid, coord));
            if !loaded {
                continue;
            }
            match self.materialize_spawn(point, point.template_id) {
                Ok(guid) => spawned.push(guid),
                Err(e) => log::warn!(
                    "[WorldInstance] Instance {}: spawn group {} member {} failed: {}",
                    self.instance_id,
                    group_id,
                    key,
                    e
                ),
            }
        }

        log::info!(
            "[WorldInstance] Instance {}: spawn group {} ({}) spawned {} entities",
            self.instance_id,
            group_id,
            group.name,
            spawned.len()
        );
        Ok(spawned)
    }

    /// Despawn the live members of a spawn group and disable it. Respawn
    /// timers of members survive unless `delete_respawn_times`.
    pub fn spawn_group_despawn(
        &mut self,
        group_id: u32,
        delete_respawn_times: bool,
    ) -> RealmResult<usize> {
        let context = Arc::clone(&self.context);
        let group = context
            .catalog()
            .spawn_group(group_id)
            .ok_or_realm(|| RealmError::UnknownSpawnGroup { id: group_id })?;
        if group.flags.system {
            return Err(RealmError::SystemSpawnGroup { id: group_id });
        }

        let mut despawned = 0;
        for key in &group.members {
            if delete_respawn_times {
                self.respawns.remove_respawn_time(*key, false);
            }
            despawned += self.despawn_all(*key);
        }
        self.respawns.set_spawn_group_active(group_id, false);

        log::info!(
            "[WorldInstance] Instance {}: spawn group {} ({}) despawned {} entities",
            self.instance_id,
            group_id,
            group.name,
            despawned
        );
        Ok(despawned)
    }
}
