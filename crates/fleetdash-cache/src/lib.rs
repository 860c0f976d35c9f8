//! In-memory fleet caches and the pipeline that fills them.
//!
//! [`FleetCacheStore`] holds the published snapshot and the detail cache;
//! [`RefreshOrchestrator`] is its only writer. Request handlers read the
//! store and trigger refreshes through the orchestrator.

pub mod config;
pub mod parallel;
pub mod refresh;
pub mod store;

pub use config::RefreshConfig;
pub use parallel::run_bounded;
pub use refresh::{DetailReport, RefreshOrchestrator, RefreshOutcome};
pub use store::{DashboardView, FleetCacheStore};
