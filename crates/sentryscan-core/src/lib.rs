//! SentryScan core — shared types, error taxonomy, configuration, and
//! the data model driving every other crate in the workspace.

pub mod config;
pub mod error;
pub mod events;
pub mod keyed_lock;
pub mod port_priority;
pub mod port_range;
pub mod store;
pub mod types;
pub mod validator;

pub use config::Config;
pub use error::{Error, Result, StatusClass};
pub use events::ScanEventBus;
pub use store::ScanStore;
pub use types::{
    AuditRecord, ClientBudget, CveCacheEntry, CveRecord, CveStatus, EnrichedPort, PortResult,
    PortSet, PortState, Protocol, ScanEvent, ScanTask, Severity, Target, Tier, TierKind, TaskState,
};
