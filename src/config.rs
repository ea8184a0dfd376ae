//! Realm configuration
//!
//! Loaded from TOML. Every section has defaults, so an empty document is a
//! valid configuration. Call `validate` (done by `WorldContext::new`) before
//! building instances from a hand-constructed config.

use crate::constants::{corpses, grid, queues, respawn};
use crate::error::{RealmError, RealmResult};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration shared by every instance of a realm
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RealmConfig {
    pub grid: GridConfig,
    pub respawn: RespawnConfig,
    pub corpses: CorpseConfig,
    pub queues: QueueConfig,
    pub persistence: PersistenceConfig,
}

/// Grid geometry and cell retention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub width: u32,
    pub height: u32,
    pub cell_size: f32,
    /// Time a cell without interest stays loaded before it unloads
    pub unload_delay_ms: u32,
    /// Cells around each player's cell that are loaded and observed
    pub load_radius_cells: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: grid::DEFAULT_GRID_SIZE,
            height: grid::DEFAULT_GRID_SIZE,
            cell_size: grid::DEFAULT_CELL_SIZE,
            unload_delay_ms: grid::DEFAULT_UNLOAD_DELAY_MS,
            load_radius_cells: grid::DEFAULT_LOAD_RADIUS_CELLS,
        }
    }
}

/// Respawn retry and dynamic scaling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RespawnConfig {
    pub retry_base_secs: u32,
    pub retry_max_secs: u32,
    /// Delay before a record blocked by an inactive spawn group is checked again
    pub group_recheck_secs: u32,
    pub creature_dynamic_rate: f32,
    pub creature_dynamic_minimum_secs: u32,
    pub gameobject_dynamic_rate: f32,
    pub gameobject_dynamic_minimum_secs: u32,
}

impl Default for RespawnConfig {
    fn default() -> Self {
        Self {
            retry_base_secs: respawn::DEFAULT_RETRY_BASE_SECS,
            retry_max_secs: respawn::DEFAULT_RETRY_MAX_SECS,
            group_recheck_secs: respawn::DEFAULT_GROUP_RECHECK_SECS,
            creature_dynamic_rate: respawn::DEFAULT_DYNAMIC_RATE,
            creature_dynamic_minimum_secs: respawn::DEFAULT_DYNAMIC_MINIMUM_SECS,
            gameobject_dynamic_rate: respawn::DEFAULT_DYNAMIC_RATE,
            gameobject_dynamic_minimum_secs: respawn::DEFAULT_DYNAMIC_MINIMUM_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpseConfig {
    pub corpse_expiry_secs: u32,
    pub bones_expiry_secs: u32,
    pub decay_check_interval_ms: u32,
}

impl Default for CorpseConfig {
    fn default() -> Self {
        Self {
            corpse_expiry_secs: corpses::DEFAULT_CORPSE_EXPIRY_SECS,
            bones_expiry_secs: corpses::DEFAULT_BONES_EXPIRY_SECS,
            decay_check_interval_ms: corpses::DEFAULT_DECAY_CHECK_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Drain passes allowed per phase before the instance is considered livelocked
    pub drain_pass_limit: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            drain_pass_limit: queues::DEFAULT_DRAIN_PASS_LIMIT,
        }
    }
}

/// Which respawn store backs an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub backend: PersistenceBackend,
    pub directory: PathBuf,
    /// Move store writes to a background writer thread
    pub asynchronous: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::Memory,
            directory: PathBuf::from("data/respawns"),
            asynchronous: false,
        }
    }
}

impl RealmConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> RealmResult<Self> {
        let config: RealmConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        let config = Self::from_toml_str(&text)
            .with_context(|| format!("parse realm config {}", path.display()))?;
        log::info!("[RealmConfig] Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> RealmResult<()> {
        fn invalid(field: &str, value: impl ToString, reason: &str) -> RealmError {
            RealmError::InvalidConfig {
                field: field.to_string(),
                value: value.to_string(),
                reason: reason.to_string(),
            }
        }

        if self.grid.width == 0 {
            return Err(invalid("grid.width", self.grid.width, "must be positive"));
        }
        if self.grid.height == 0 {
            return Err(invalid("grid.height", self.grid.height, "must be positive"));
        }
        if !(self.grid.cell_size.is_finite() && self.grid.cell_size > 0.0) {
            return Err(invalid(
                "grid.cell_size",
                self.grid.cell_size,
                "must be a positive finite number",
            ));
        }
        if self.grid.unload_delay_ms < grid::MIN_UNLOAD_DELAY_MS {
            return Err(invalid(
                "grid.unload_delay_ms",
                self.grid.unload_delay_ms,
                "must be at least 1",
            ));
        }
        if self.respawn.retry_base_secs == 0 {
            return Err(invalid(
                "respawn.retry_base_secs",
                self.respawn.retry_base_secs,
                "must be positive",
            ));
        }
        if self.respawn.retry_max_secs < self.respawn.retry_base_secs {
            return Err(invalid(
                "respawn.retry_max_secs",
                self.respawn.retry_max_secs,
                "must not be below retry_base_secs",
            ));
        }
        if self.respawn.group_recheck_secs == 0 {
            return Err(invalid(
                "respawn.group_recheck_secs",
                self.respawn.group_recheck_secs,
                "must be positive",
            ));
        }
        for (field, rate) in [
            ("respawn.creature_dynamic_rate", self.respawn.creature_dynamic_rate),
            ("respawn.gameobject_dynamic_rate", self.respawn.gameobject_dynamic_rate),
        ] {
            if !(rate.is_finite() && rate >= 0.0) {
                return Err(invalid(field, rate, "must be a non-negative finite number"));
            }
        }
        if self.queues.drain_pass_limit == 0 {
            return Err(invalid(
                "queues.drain_pass_limit",
                self.queues.drain_pass_limit,
                "must be positive",
            ));
        }
        Ok(())
    }
}
