//! The catalog: incremental store plus the orchestrator that fills it.

pub mod loader;
pub mod refresh_timer;
pub mod store;

pub use loader::{
    CatalogLoader, LoadFailure, LoadOutcome, LoadPhase, LoaderSettings, LoaderStatus,
};
pub use refresh_timer::RefreshTimer;
pub use store::{
    CatalogPersistence, CatalogSnapshot, IncrementalStore, MergeReport, CATALOG_SCHEMA_VERSION,
};
