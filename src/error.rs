//! Error handling for Hearth Realm
//!
//! Recoverable failures (persistence, materialization, configuration, worker
//! plumbing) are reported through `RealmError`. Broken internal invariants
//! such as a duplicate identity or a duplicate respawn record are not errors:
//! they panic, because the instance state is no longer trustworthy.

use crate::content::MaterializeError;
use crate::persistence::PersistenceError;
use std::error::Error as StdError;
use std::fmt;

/// Main error type for Hearth Realm
#[derive(Debug)]
pub enum RealmError {
    // Configuration Errors
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },
    ConfigParse {
        error: String,
    },

    // Persistence Errors
    Persistence(PersistenceError),

    // Content Errors
    Materialize(MaterializeError),
    UnknownSpawnGroup {
        id: u32,
    },
    SystemSpawnGroup {
        id: u32,
    },

    // Threading Errors
    ChannelClosed {
        name: String,
    },
    WorkerPanicked {
        instance_id: u32,
    },
    WorkerSpawnFailed {
        instance_id: u32,
        error: String,
    },

    // System Errors
    IoError {
        path: String,
        error: String,
    },
}

impl fmt::Display for RealmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RealmError::InvalidConfig {
                field,
                value,
                reason,
            } => write!(f, "Invalid config: {} = {} ({})", field, value, reason),
            RealmError::ConfigParse { error } => write!(f, "Config parse error: {}", error),

            RealmError::Persistence(err) => write!(f, "Persistence error: {}", err),

            RealmError::Materialize(err) => write!(f, "Materialization failed: {}", err),
            RealmError::UnknownSpawnGroup { id } => write!(f, "Unknown spawn group: {}", id),
            RealmError::SystemSpawnGroup { id } => {
                write!(f, "Spawn group {} is engine-managed", id)
            }

            RealmError::ChannelClosed { name } => write!(f, "Channel closed: {}", name),
            RealmError::WorkerPanicked { instance_id } => {
                write!(f, "Worker for instance {} panicked", instance_id)
            }
            RealmError::WorkerSpawnFailed { instance_id, error } => write!(
                f,
                "Failed to spawn worker for instance {}: {}",
                instance_id, error
            ),

            RealmError::IoError { path, error } => write!(f, "IO error for {}: {}", path, error),
        }
    }
}

impl StdError for RealmError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            RealmError::Persistence(err) => Some(err),
            RealmError::Materialize(err) => Some(err),
            _ => None,
        }
    }
}

/// Type alias for Results in Hearth Realm
pub type RealmResult<T> = Result<T, RealmError>;

impl From<PersistenceError> for RealmError {
    fn from(error: PersistenceError) -> Self {
        RealmError::Persistence(error)
    }
}

impl From<MaterializeError> for RealmError {
    fn from(error: MaterializeError) -> Self {
        RealmError::Materialize(error)
    }
}

impl From<std::io::Error> for RealmError {
    fn from(error: std::io::Error) -> Self {
        RealmError::IoError {
            path: String::new(),
            error: error.to_string(),
        }
    }
}

impl From<toml::de::Error> for RealmError {
    fn from(error: toml::de::Error) -> Self {
        RealmError::ConfigParse {
            error: error.to_string(),
        }
    }
}

/// Convert Option to Result with context
pub trait OptionExt<T> {
    fn ok_or_realm<F>(self, f: F) -> RealmResult<T>
    where
        F: FnOnce() -> RealmError;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_realm<F>(self, f: F) -> RealmResult<T>
    where
        F: FnOnce() -> RealmError,
    {
        self.ok_or_else(f)
    }
}
