//! ViewSync Engine
//!
//! Background reconciliation engine that keeps the catalog of data views
//! synchronized with an external registry of scanned data-source
//! metadata. One cycle aligns builtin view groups with the live
//! data-source list, then reconciles each source: views whose backing
//! table disappeared upstream are soft-deleted, and changed or new
//! tables are re-materialized in bounded batches.
//!
//! The engine owns no wire surface. Its collaborators — the data-source
//! directory, the metadata catalog, and the view/group stores — are
//! consumed through the traits in [`traits`]; its only observable
//! effects are the eventual store state and log/metric emissions.

pub mod batch;
pub mod config;
pub mod coordinator;
pub mod groups;
pub mod materialize;
pub mod names;
pub mod scheduler;
pub mod source;
pub mod state;
pub mod traits;

#[cfg(feature = "metrics")]
pub mod metrics;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use config::SyncConfig;
pub use coordinator::{CycleReport, SourceReport, SyncCoordinator};
pub use names::NameAllocator;
pub use scheduler::{Scheduler, SchedulerHandle};
pub use source::SourceOutcome;
pub use state::SyncStateStore;
pub use traits::{DataSourceDirectory, GroupStore, MetadataCatalog, ViewStore};
