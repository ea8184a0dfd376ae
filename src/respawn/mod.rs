//! Respawn scheduling

pub mod respawn_data;
pub mod scheduler;

pub use respawn_data::{RespawnDecision, RespawnRecord, RespawnStats};
pub use scheduler::RespawnScheduler;
