//! Admission control, result caching, adaptive concurrency tuning, CVE
//! enrichment, and the per-scan orchestrator that drives them together.

pub mod adaptive;
pub mod cache;
pub mod coordinator;
pub mod cve;
pub mod orchestrator;
pub mod registry;

pub use adaptive::AdaptiveController;
pub use cache::ScanCache;
pub use coordinator::{Coordinator, CoordinatorLimits};
pub use cve::{CveEnricher, EnrichmentOutcome};
pub use orchestrator::{run_scan, OrchestratorDeps};
pub use registry::TaskRegistry;
