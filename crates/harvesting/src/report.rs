//! Per-entry outcomes and the run summary.

use crate::decision::SkipReason;
use crate::documents::{HarvestRecord, LineageRecord};
use crate::error::SyncError;
use crate::reconcile::Transition;

/// Exit status of a clean run.
pub const EXIT_CLEAN: i32 = 0;
/// Exit status of a run that aborted.
pub const EXIT_FATAL: i32 = 1;
/// Exit status of a run that finished but absorbed failures.
pub const EXIT_DEGRADED: i32 = 2;

/// Records produced for one granule.
#[derive(Debug, Clone, PartialEq)]
pub struct GranuleRecords {
    /// Key the harvest record is tracked under (its catalog file name)
    pub harvest_key: String,
    pub harvest: HarvestRecord,
    pub lineage: LineageRecord,
}

/// What processing one catalog entry produced.
#[derive(Debug)]
pub enum GranuleOutcome {
    /// Downloaded; one record pair per produced granule
    Harvested(Vec<GranuleRecords>),
    Skipped(SkipReason),
    /// File name without a granule extension
    Ignored,
    /// Isolated failure; the run continues
    Failed(SyncError),
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub pages: usize,
    pub entries_seen: usize,
    pub ignored: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Granules whose upload failed
    pub transfer_failures: usize,
    /// Index reads or writes after the snapshot that did not succeed
    pub index_failures: usize,
    /// Granule and lineage documents emitted
    pub documents: usize,
    pub transition: Option<Transition>,
}

impl RunReport {
    pub fn record(&mut self, outcome: &GranuleOutcome) {
        match outcome {
            GranuleOutcome::Harvested(granules) => {
                self.downloaded += 1;
                self.transfer_failures += granules.iter().filter(|g| !g.harvest.harvest_success).count();
            }
            GranuleOutcome::Skipped(_) => self.skipped += 1,
            GranuleOutcome::Ignored => self.ignored += 1,
            GranuleOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.failed > 0 || self.transfer_failures > 0 || self.index_failures > 0
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_degraded() {
            EXIT_DEGRADED
        } else {
            EXIT_CLEAN
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_run_exits_zero() {
        let mut report = RunReport::default();
        report.record(&GranuleOutcome::Skipped(SkipReason::UpToDate));
        report.record(&GranuleOutcome::Ignored);
        assert_eq!(report.exit_code(), EXIT_CLEAN);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.ignored, 1);
    }

    #[test]
    fn test_isolated_failure_is_degraded() {
        let mut report = RunReport::default();
        report.record(&GranuleOutcome::Failed(SyncError::Download("timeout".to_string())));
        assert_eq!(report.exit_code(), EXIT_DEGRADED);
    }

    #[test]
    fn test_index_failure_is_degraded() {
        let report = RunReport {
            index_failures: 1,
            ..Default::default()
        };
        assert!(report.is_degraded());
    }
}
