//! Per-entry download decision.

use chrono::{DateTime, Utc};

use harvest_common::TimeWindow;

use crate::catalog::CatalogEntry;
use crate::state::PriorState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Interval starts before the configured window
    OutsideWindow,
    /// A successful harvest newer than the remote modification time exists
    UpToDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadReason {
    /// No record for this file name
    New,
    /// The recorded harvest did not succeed
    PreviousFailure,
    /// Recorded download time is not after the remote modification time
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Skip(SkipReason),
    Download(DownloadReason),
}

/// Classify one entry against the prior state.
///
/// Aggregated datasets are never window filtered here; the aggregate is
/// fetched whole and split by day later. Equal download and modification
/// times count as stale.
pub fn classify(
    entry: &CatalogEntry,
    prior: &PriorState,
    window: &TimeWindow,
    aggregated: bool,
    now: DateTime<Utc>,
) -> Decision {
    if !aggregated && window.starts_after(&entry.interval_start) {
        return Decision::Skip(SkipReason::OutsideWindow);
    }

    let record = match prior.harvest_record(&entry.file_name) {
        Some(record) => record,
        None => return Decision::Download(DownloadReason::New),
    };

    if !record.harvest_success {
        return Decision::Download(DownloadReason::PreviousFailure);
    }

    match record.download_time {
        Some(downloaded) if downloaded > entry.resolved_modified(now) => {
            Decision::Skip(SkipReason::UpToDate)
        }
        _ => Decision::Download(DownloadReason::Stale),
    }
}
