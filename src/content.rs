//! Static content and the collaborators that turn it into entities
//!
//! `ContentCatalog` holds spawn points and spawn group templates. It is
//! immutable once an instance runs. `Materializer` builds a concrete entity
//! from a template; `TerrainInfo` maps positions to zones.

use crate::constants::respawn::DEFAULT_SPAWN_GROUP;
use crate::constants::zone::INVALID_ZONE;
use crate::entity::{EntityKind, SpawnKey, WorldEntity};
use crate::guid::ObjectGuid;
use crate::types::Position;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// A static spawn point
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnPoint {
    pub key: SpawnKey,
    pub template_id: u32,
    pub position: Position,
    /// Spawn group the point belongs to, 0 for the default group
    pub group_id: u32,
    pub respawn_delay_secs: u32,
}

impl SpawnPoint {
    pub fn new(key: SpawnKey, template_id: u32, position: Position, respawn_delay_secs: u32) -> Self {
        Self {
            key,
            template_id,
            position,
            group_id: DEFAULT_SPAWN_GROUP,
            respawn_delay_secs,
        }
    }

    pub fn in_group(mut self, group_id: u32) -> Self {
        self.group_id = group_id;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpawnGroupFlags {
    /// Engine-owned group, not spawned or despawned on request
    pub system: bool,
    /// Not spawned on cell load; starts inactive until explicitly spawned
    pub manual_spawn: bool,
    /// Respawn delays shrink with the number of players in the zone
    pub dynamic_spawn_rate: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpawnGroupTemplate {
    pub id: u32,
    pub name: String,
    pub flags: SpawnGroupFlags,
    pub members: Vec<SpawnKey>,
}

impl SpawnGroupTemplate {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            flags: SpawnGroupFlags::default(),
            members: Vec::new(),
        }
    }

    pub fn with_flags(mut self, flags: SpawnGroupFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn active_by_default(&self) -> bool {
        !self.flags.manual_spawn
    }
}

/// Spawn points and spawn groups of one map
#[derive(Debug, Clone, Default)]
pub struct ContentCatalog {
    spawn_points: BTreeMap<SpawnKey, SpawnPoint>,
    spawn_groups: BTreeMap<u32, SpawnGroupTemplate>,
}

impl ContentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a spawn point. Points in a declared group are added to its
    /// member list.
    pub fn add_spawn_point(&mut self, point: SpawnPoint) {
        if let Some(group) = self.spawn_groups.get_mut(&point.group_id) {
            if !group.members.contains(&point.key) {
                group.members.push(point.key);
            }
        }
        self.spawn_points.insert(point.key, point);
    }

    /// Add a spawn group. Already known points naming the group become members.
    pub fn add_spawn_group(&mut self, mut group: SpawnGroupTemplate) {
        for point in self.spawn_points.values().filter(|p| p.group_id == group.id) {
            if !group.members.contains(&point.key) {
                group.members.push(point.key);
            }
        }
        self.spawn_groups.insert(group.id, group);
    }

    pub fn spawn_point(&self, key: SpawnKey) -> Option<&SpawnPoint> {
        self.spawn_points.get(&key)
    }

    pub fn spawn_points(&self) -> impl Iterator<Item = &SpawnPoint> {
        self.spawn_points.values()
    }

    pub fn spawn_group(&self, id: u32) -> Option<&SpawnGroupTemplate> {
        self.spawn_groups.get(&id)
    }

    pub fn spawn_groups(&self) -> impl Iterator<Item = &SpawnGroupTemplate> {
        self.spawn_groups.values()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MaterializeError {
    #[error("Unknown template {template_id}")]
    TemplateMissing { template_id: u32 },
    #[error("Spawn point {spawn} has no content entry")]
    SpawnPointMissing { spawn: SpawnKey },
    #[error("Position ({x}, {y}) is outside the grid")]
    InvalidPosition { x: f32, y: f32 },
    #[error("Materializer returned {found}, expected {expected}")]
    GuidMismatch { expected: ObjectGuid, found: ObjectGuid },
    #[error("Materialization rejected: {0}")]
    Rejected(String),
}

/// What the instance asks a materializer to build
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializeRequest {
    pub template_id: u32,
    pub position: Position,
    pub guid: ObjectGuid,
    pub spawn: Option<SpawnKey>,
    pub instance_id: u32,
    /// Game time (seconds) of the request
    pub now: i64,
}

/// Builds a concrete entity from a template
pub trait Materializer: Send + Sync {
    fn materialize(&self, request: &MaterializeRequest) -> Result<WorldEntity, MaterializeError>;
}

/// Materializer backed by a template id to kind table
#[derive(Debug, Clone, Default)]
pub struct TemplateMaterializer {
    templates: FxHashMap<u32, EntityKind>,
}

impl TemplateMaterializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, template_id: u32, kind: EntityKind) -> Self {
        self.templates.insert(template_id, kind);
        self
    }
}

impl Materializer for TemplateMaterializer {
    fn materialize(&self, request: &MaterializeRequest) -> Result<WorldEntity, MaterializeError> {
        let kind = self
            .templates
            .get(&request.template_id)
            .copied()
            .ok_or(MaterializeError::TemplateMissing {
                template_id: request.template_id,
            })?;
        Ok(WorldEntity::new(request.guid, kind, request.position)
            .with_template(request.template_id)
            .created_at(request.now))
    }
}

/// Zone lookup for positions
pub trait TerrainInfo: Send + Sync {
    fn zone_id(&self, position: &Position) -> u32;
}

impl<F> TerrainInfo for F
where
    F: Fn(&Position) -> u32 + Send + Sync,
{
    fn zone_id(&self, position: &Position) -> u32 {
        self(position)
    }
}

/// Terrain where every position lies in one zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatTerrain {
    pub zone_id: u32,
}

impl Default for FlatTerrain {
    fn default() -> Self {
        Self {
            zone_id: INVALID_ZONE,
        }
    }
}

impl TerrainInfo for FlatTerrain {
    fn zone_id(&self, _position: &Position) -> u32 {
        self.zone_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guid::GuidCategory;

    #[test]
    fn test_group_membership_either_order() {
        let mut catalog = ContentCatalog::new();
        catalog.add_spawn_point(
            SpawnPoint::new(SpawnKey::creature(1), 10, Position::default(), 60).in_group(5),
        );
        catalog.add_spawn_group(SpawnGroupTemplate::new(5, "camp"));
        catalog.add_spawn_point(
            SpawnPoint::new(SpawnKey::creature(2), 10, Position::default(), 60).in_group(5),
        );

        let group = catalog.spawn_group(5).expect("group present");
        assert_eq!(group.members, vec![SpawnKey::creature(1), SpawnKey::creature(2)]);
    }

    #[test]
    fn test_template_materializer() {
        let materializer = TemplateMaterializer::new().with_template(42, EntityKind::StaticObject);
        let request = MaterializeRequest {
            template_id: 42,
            position: Position::new(1.0, 2.0, 3.0),
            guid: ObjectGuid::new(GuidCategory::GameObject, 1),
            spawn: None,
            instance_id: 1,
            now: 77,
        };

        let entity = materializer.materialize(&request).expect("known template");
        assert_eq!(entity.kind, EntityKind::StaticObject);
        assert_eq!(entity.created_at, 77);

        let missing = MaterializeRequest {
            template_id: 43,
            ..request
        };
        assert_eq!(
            materializer.materialize(&missing),
            Err(MaterializeError::TemplateMissing { template_id: 43 })
        );
    }

    #[test]
    fn test_closure_terrain() {
        let terrain = |p: &Position| if p.x < 0.0 { 1 } else { 2 };
        assert_eq!(terrain.zone_id(&Position::new(-5.0, 0.0, 0.0)), 1);
        assert_eq!(FlatTerrain { zone_id: 12 }.zone_id(&Position::default()), 12);
    }
}
