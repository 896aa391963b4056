//! Lookout Core - Observed-value registry
//!
//! Discovers monitored members of host types, compiles one profile per
//! member, binds profiles to live targets as units and keeps their formatted
//! state up to date from the host's frame loop.
//!
//! # Architecture
//!
//! - [`ReflectionCache`] - Member discovery and accessor compilation, optionally on a background thread
//! - [`Profile`] - Compiled accessor plus formatting policy for one (type, member) pair
//! - [`Unit`] - One profile bound to one target, holding the rendered state
//! - [`UpdateScheduler`] - Rate-limited update and validation ticks over the active units
//! - [`FilterEngine`] - Filter expressions deciding which units are enabled
//! - [`ObjectPool`] - Reusable instances for per-tick scratch buffers
//! - [`Monitor`] - Session context tying the components together

pub mod error;
pub mod event;
pub mod filter;
pub mod format;
#[cfg(test)]
mod integration;
pub mod logging;
pub mod monitor;
pub mod pool;
pub mod profile;
pub mod reflection;
pub mod scheduler;
pub mod settings;
#[cfg(test)]
pub mod test_utils;
pub mod unit;
pub mod value;

// Re-export the session API
pub use monitor::{Monitor, ProfilingStatus};

pub use error::{ErrorCategory, MonitorError};
pub use event::{EventSource, HandlerId, MulticastEvent};
pub use filter::{Filter, FilterEngine};
pub use logging::{Disposition, LoggingLevel, MonitoringLogger};
pub use pool::{ObjectPool, PoolError, PooledObject};
pub use profile::{MemberDescriptor, Profile, ProfileRegistry};
pub use scheduler::{ActiveUnitSet, UpdateScheduler, Validator};
pub use settings::MonitoringSettings;
pub use unit::{Unit, UnitId, UnitStore, UnitView};
pub use value::{MonitorValue, Monitorable, Rgba, ValueType};

// Re-export declaration types
pub use reflection::{
    Assembly, DiscoveryRules, Instantiation, MarkerKind, MemberKind, ParamSig, ProfilingTask,
    ReflectionCache, ScanStats, TypeBuilder, TypeDecl,
};
