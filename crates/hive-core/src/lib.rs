// Hive Core - Foundation types for the Hive workforce runtime
//
// This crate provides the shared vocabulary of the workspace: the error
// taxonomy, model descriptors and registry, agent profiles, runtime
// configuration, and an injectable clock.

pub mod agent;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod model;

// Re-export core types
pub use agent::{AgentProfile, AgentRole, AgentStats, AgentStatus};
pub use clock::{system_clock, Clock, ClockRef, ManualClock, SystemClock};
pub use config::{ModelDefaults, Settings, PROVIDERS};
pub use error::{ErrorKind, HiveError, HiveResult};
pub use model::{ModelCapability, ModelDescriptor, ModelFilter, ModelRegistry};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
