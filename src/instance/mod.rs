//! World instances
//!
//! A `WorldInstance` composes the grid, object store, deferred queues,
//! respawn scheduler, active set and zone state of one map copy. Instance
//! variants differ only by `InstancePolicy`; shared read-only data comes in
//! through `WorldContext`.

pub mod callbacks;
pub mod context;
mod corpses;
pub mod policy;
mod spawning;
pub mod tick;
pub mod worker;
pub mod world_instance;

pub use callbacks::{CallbackQueue, CallbackSender, InstanceCallback};
pub use context::WorldContext;
pub use policy::{EnterRules, EnterState, InstanceKind, InstancePolicy, TeardownRules, VisibilityRules};
pub use spawning::RespawnOutcome;
pub use tick::{EntityUpdater, TickPhase, TickReport, UpdateContext, UpdateError};
pub use worker::InstanceWorker;
pub use world_instance::WorldInstance;
