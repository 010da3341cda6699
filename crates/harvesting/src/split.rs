//! Splitting an aggregated download into per-day granules.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, info, warn};

use harvest_common::time::day_stamp;
use harvest_common::TimeWindow;
use netcdf_parser::{read_time_steps, write_time_slice, SliceSummary, TimeStep};

use crate::error::SyncResult;

/// Time-axis access to an aggregate file.
///
/// Implementations are blocking; callers run them off the async executor.
pub trait TimeSlicer: Send + Sync {
    fn time_steps(&self, path: &Path) -> SyncResult<Vec<TimeStep>>;

    fn write_slice(&self, source: &Path, index: usize, dest: &Path) -> SyncResult<SliceSummary>;
}

/// [`TimeSlicer`] backed by the native NetCDF library.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetCdfSlicer;

impl TimeSlicer for NetCdfSlicer {
    fn time_steps(&self, path: &Path) -> SyncResult<Vec<TimeStep>> {
        Ok(read_time_steps(path)?)
    }

    fn write_slice(&self, source: &Path, index: usize, dest: &Path) -> SyncResult<SliceSummary> {
        Ok(write_time_slice(source, index, dest)?)
    }
}

/// One granule produced from an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitGranule {
    /// Slice time truncated to whole seconds
    pub time: DateTime<Utc>,
    /// `{short_name}_{YYYYMMDD}.nc`
    pub file_name: String,
    pub path: PathBuf,
    /// Aggregate variables the slice does not carry
    pub skipped_variables: Vec<String>,
}

pub fn split_file_name(short_name: &str, time: &DateTime<Utc>) -> String {
    format!("{}_{}.nc", short_name, day_stamp(time))
}

/// Time steps to emit: those whose day falls inside the window, first step
/// per day only so each derived file name is produced once.
pub fn select_steps(steps: &[TimeStep], window: &TimeWindow) -> Vec<TimeStep> {
    let mut seen_days = HashSet::new();
    steps
        .iter()
        .filter(|step| window.contains_day(&step.time))
        .filter(|step| seen_days.insert(step.time.date_naive()))
        .copied()
        .collect()
}

/// Write one file per selected time step of `source` into `out_dir`.
pub async fn split_aggregate(
    slicer: Arc<dyn TimeSlicer>,
    source: &Path,
    window: TimeWindow,
    short_name: &str,
    out_dir: &Path,
) -> SyncResult<Vec<SplitGranule>> {
    let source = source.to_path_buf();
    let short_name = short_name.to_string();
    let out_dir = out_dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let steps = slicer.time_steps(&source)?;
        let selected = select_steps(&steps, &window);
        info!(
            source = %source.display(),
            steps = steps.len(),
            selected = selected.len(),
            "Splitting aggregate"
        );

        let mut granules = Vec::with_capacity(selected.len());
        for step in selected {
            let file_name = split_file_name(&short_name, &step.time);
            let path = out_dir.join(&file_name);
            let summary = slicer.write_slice(&source, step.index, &path)?;
            if summary.skipped.is_empty() {
                debug!(file = %file_name, index = step.index, "Wrote slice");
            } else {
                warn!(
                    file = %file_name,
                    index = step.index,
                    skipped = ?summary.skipped,
                    "Slice written without some aggregate variables"
                );
            }

            granules.push(SplitGranule {
                time: step.time.trunc_subsecs(0),
                file_name,
                path,
                skipped_variables: summary.skipped,
            });
        }
        Ok(granules)
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn step(index: usize, day: u32, hour: u32) -> TimeStep {
        TimeStep {
            index,
            time: Utc.with_ymd_and_hms(2020, 1, day, hour, 0, 0).unwrap(),
        }
    }

    fn window() -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 1).unwrap(),
            Utc.with_ymd_and_hms(2020, 1, 4, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_select_inside_window_by_day() {
        let steps: Vec<TimeStep> = (1..=5).map(|d| step(d as usize - 1, d, 12)).collect();
        let selected = select_steps(&steps, &window());
        let days: Vec<usize> = selected.iter().map(|s| s.index).collect();
        assert_eq!(days, vec![1, 2, 3]);
    }

    #[test]
    fn test_select_keeps_first_step_per_day() {
        let steps = vec![step(0, 2, 0), step(1, 2, 12), step(2, 3, 0)];
        let selected = select_steps(&steps, &window());
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].index, 0);
    }

    struct LossySlicer;

    impl TimeSlicer for LossySlicer {
        fn time_steps(&self, _path: &Path) -> SyncResult<Vec<TimeStep>> {
            Ok(vec![step(0, 2, 0), step(1, 9, 0)])
        }

        fn write_slice(&self, _source: &Path, index: usize, dest: &Path) -> SyncResult<SliceSummary> {
            std::fs::write(dest, format!("slice {}", index))?;
            Ok(SliceSummary {
                copied: 2,
                skipped: vec!["crs_wkt".to_string()],
            })
        }
    }

    #[tokio::test]
    async fn test_split_reports_skipped_variables() {
        let dir = tempfile::tempdir().unwrap();
        let granules = split_aggregate(
            Arc::new(LossySlicer),
            &dir.path().join("aggregate.nc"),
            window(),
            "SMAP_L3",
            dir.path(),
        )
        .await
        .unwrap();

        assert_eq!(granules.len(), 1);
        assert_eq!(granules[0].file_name, "SMAP_L3_20200102.nc");
        assert_eq!(granules[0].skipped_variables, vec!["crs_wkt".to_string()]);
        assert!(granules[0].path.exists());
    }

    #[test]
    fn test_split_file_name() {
        let time = Utc.with_ymd_and_hms(2020, 1, 3, 12, 0, 0).unwrap();
        assert_eq!(split_file_name("SMAP_L3", &time), "SMAP_L3_20200103.nc");
    }
}
