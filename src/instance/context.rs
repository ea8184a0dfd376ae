//! Shared, immutable world context
//!
//! Everything an instance reads but never writes: configuration, static
//! content and the external collaborators. One context is shared by every
//! instance of the same map through an `Arc`.

use crate::config::RealmConfig;
use crate::content::{ContentCatalog, Materializer, TerrainInfo};
use crate::entity::SpawnKey;
use crate::error::RealmResult;
use crate::grid::{ops, GridGeometry};
use crate::types::{CellId, Position};
use rustc_hash::FxHashMap;
use std::sync::Arc;

pub struct WorldContext {
    config: RealmConfig,
    catalog: ContentCatalog,
    materializer: Arc<dyn Materializer>,
    terrain: Arc<dyn TerrainInfo>,
    geometry: GridGeometry,
    spawns_by_cell: FxHashMap<CellId, Vec<SpawnKey>>,
}

impl WorldContext {
    /// Validate the config and index the catalog's spawn points by home cell
    pub fn new(
        config: RealmConfig,
        catalog: ContentCatalog,
        materializer: Arc<dyn Materializer>,
        terrain: Arc<dyn TerrainInfo>,
    ) -> RealmResult<Arc<Self>> {
        config.validate()?;
        let geometry = ops::create_geometry(&config.grid);

        let mut spawns_by_cell: FxHashMap<CellId, Vec<SpawnKey>> = FxHashMap::default();
        let mut outside = 0usize;
        for point in catalog.spawn_points() {
            match ops::coord_for(&geometry, &point.position) {
                Some(coord) => spawns_by_cell
                    .entry(ops::cell_id(&geometry, coord))
                    .or_default()
                    .push(point.key),
                None => {
                    outside += 1;
                    log::warn!(
                        "[WorldContext] Spawn point {} lies outside the grid and is ignored",
                        point.key
                    );
                }
            }
        }

        log::info!(
            "[WorldContext] Indexed {} spawn points in {} cells ({} outside the grid)",
            catalog.spawn_points().count() - outside,
            spawns_by_cell.len(),
            outside
        );

        Ok(Arc::new(Self {
            config,
            catalog,
            materializer,
            terrain,
            geometry,
            spawns_by_cell,
        }))
    }

    pub fn config(&self) -> &RealmConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ContentCatalog {
        &self.catalog
    }

    pub fn materializer(&self) -> &dyn Materializer {
        self.materializer.as_ref()
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn zone_id(&self, position: &Position) -> u32 {
        self.terrain.zone_id(position)
    }

    /// Spawn points whose home is `cell`, in catalog order
    pub fn spawns_in_cell(&self, cell: CellId) -> &[SpawnKey] {
        self.spawns_by_cell
            .get(&cell)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Home cell id of a spawn point
    pub fn home_cell(&self, key: SpawnKey) -> Option<CellId> {
        let point = self.catalog.spawn_point(key)?;
        let coord = ops::coord_for(&self.geometry, &point.position)?;
        Some(ops::cell_id(&self.geometry, coord))
    }
}

impl std::fmt::Debug for WorldContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldContext")
            .field("config", &self.config)
            .field("spawn_points", &self.catalog.spawn_points().count())
            .field("indexed_cells", &self.spawns_by_cell.len())
            .finish()
    }
}
