//! Incremental granule synchronization.
//!
//! Walks a paginated granule catalog, compares each entry with the harvest
//! state recorded in the metadata index, fetches what is new or stale
//! (splitting aggregated files into daily granules), and publishes granule,
//! lineage, dataset and field documents back to the index.

pub mod catalog;
pub mod decision;
pub mod documents;
pub mod engine;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod pager;
pub mod reconcile;
pub mod report;
pub mod split;
pub mod state;

pub use catalog::CatalogEntry;
pub use decision::{classify, Decision, DownloadReason, SkipReason};
pub use documents::{build_records, HarvestRecord, LineageRecord, RunDelta, UploadOutcome};
pub use engine::{Collaborators, Synchronizer};
pub use error::{SyncError, SyncResult};
pub use feed::{parse_feed, FeedEntry, FeedPage};
pub use fetch::{GranuleFetcher, HttpFetcher};
pub use pager::{CatalogPager, CatalogSource, HttpCatalogSource};
pub use reconcile::{Coverage, DatasetStatus, Transition};
pub use report::{GranuleOutcome, RunReport, EXIT_CLEAN, EXIT_DEGRADED, EXIT_FATAL};
pub use split::{NetCdfSlicer, TimeSlicer};
pub use state::PriorState;
