//! Run driver: walks the catalog, processes each entry, publishes the delta
//! and reconciles the dataset document.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

use harvest_common::time::format_wire;
use harvest_common::{DatasetConfig, TimeWindow};
use storage::{IndexDocument, MetadataIndex, ObjectUploader};

use crate::catalog::CatalogEntry;
use crate::decision::{classify, Decision, SkipReason};
use crate::documents::{build_records, inspect_file, GranuleArtifact, RunDelta, UploadOutcome};
use crate::error::SyncResult;
use crate::feed::FeedEntry;
use crate::fetch::{ensure_local, GranuleFetcher};
use crate::pager::{CatalogPager, CatalogSource};
use crate::reconcile::{self, Coverage, DatasetRecord, RunSummary, DATASET_TYPE};
use crate::report::{GranuleOutcome, GranuleRecords, RunReport};
use crate::split::{split_aggregate, TimeSlicer};
use crate::state::{type_filters, PriorState};

/// Key prefix of the uploaded run artifact.
const META_PREFIX: &str = "meta";

/// External services a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn CatalogSource>,
    pub index: Arc<dyn MetadataIndex>,
    pub fetcher: Arc<dyn GranuleFetcher>,
    pub slicer: Arc<dyn TimeSlicer>,
    /// `None` keeps harvested files in the target directory
    pub uploader: Option<Arc<dyn ObjectUploader>>,
}

/// Synchronizes one dataset against the remote catalog.
pub struct Synchronizer {
    config: DatasetConfig,
    window: TimeWindow,
    collaborators: Collaborators,
}

impl Synchronizer {
    pub fn new(config: DatasetConfig, collaborators: Collaborators) -> SyncResult<Self> {
        config.validate()?;
        let window = config.window()?;
        Ok(Self {
            config,
            window,
            collaborators,
        })
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// Run once, using the current time as the check time.
    pub async fn run(&self) -> SyncResult<RunReport> {
        self.run_at(Utc::now()).await
    }

    /// Run once with an explicit check time.
    ///
    /// Returns `Err` only for fatal failures: configuration, catalog
    /// transport or decoding, and the initial index snapshot. Everything
    /// else is absorbed and counted in the report.
    #[instrument(skip(self), fields(dataset = %self.config.ds_name))]
    pub async fn run_at(&self, now: DateTime<Utc>) -> SyncResult<RunReport> {
        let now = now.trunc_subsecs(0);

        fs::create_dir_all(self.config.scratch_dir()).await?;
        fs::create_dir_all(&self.config.target_dir).await?;

        if self.collaborators.uploader.is_some() {
            info!(dir = %self.config.scratch_dir().display(), "Staging granules for upload");
        } else {
            info!(dir = %self.config.target_dir.display(), "Writing granules locally");
        }

        let prior = PriorState::load(self.collaborators.index.as_ref(), &self.config.ds_name).await?;

        let mut report = RunReport::default();
        let mut delta = RunDelta::new();
        let mut coverage = Coverage::default();
        let mut last_download = None;

        let mut pager = CatalogPager::new(self.collaborators.catalog.as_ref(), self.config.catalog_url());
        while let Some(page) = pager.next_page().await? {
            for feed_entry in &page.entries {
                report.entries_seen += 1;
                let outcome = self.process_entry(feed_entry, &prior, now, &mut coverage).await;
                report.record(&outcome);

                if let GranuleOutcome::Harvested(granules) = &outcome {
                    for granule in granules {
                        if granule.harvest.harvest_success {
                            last_download = granule.harvest.download_time;
                        }
                        delta.push(&granule.harvest_key, &granule.harvest, &granule.lineage);
                    }
                }
            }
        }
        report.pages = pager.pages_read();
        report.documents = delta.len();

        self.publish_delta(&delta, &mut report).await;
        self.write_run_artifact(&delta).await;

        let summary = RunSummary {
            checked_at: now,
            coverage,
            any_download: !delta.is_empty(),
            last_download,
        };
        self.reconcile_dataset(&summary, &mut report).await;

        info!(
            pages = report.pages,
            entries = report.entries_seen,
            downloaded = report.downloaded,
            skipped = report.skipped,
            ignored = report.ignored,
            failed = report.failed,
            transfer_failures = report.transfer_failures,
            index_failures = report.index_failures,
            documents = report.documents,
            "Harvest run complete"
        );

        Ok(report)
    }

    /// Directory downloaded and split granules are written to.
    fn staging_dir(&self) -> PathBuf {
        if self.collaborators.uploader.is_some() {
            self.config.scratch_dir()
        } else {
            self.config.target_dir.clone()
        }
    }

    async fn process_entry(
        &self,
        feed_entry: &FeedEntry,
        prior: &PriorState,
        now: DateTime<Utc>,
        coverage: &mut Coverage,
    ) -> GranuleOutcome {
        match self.try_process_entry(feed_entry, prior, now, coverage).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Catalog entry unsuccessful, continuing");
                GranuleOutcome::Failed(e)
            }
        }
    }

    async fn try_process_entry(
        &self,
        feed_entry: &FeedEntry,
        prior: &PriorState,
        now: DateTime<Utc>,
        coverage: &mut Coverage,
    ) -> SyncResult<GranuleOutcome> {
        let entry = match CatalogEntry::from_feed(feed_entry, &self.config.date_regex)? {
            Some(entry) => entry,
            None => return Ok(GranuleOutcome::Ignored),
        };

        let decision = classify(&entry, prior, &self.window, self.config.aggregated, now);
        if decision == Decision::Skip(SkipReason::OutsideWindow) {
            debug!(file = %entry.file_name, "Entry starts before the window");
            return Ok(GranuleOutcome::Skipped(SkipReason::OutsideWindow));
        }

        if !self.config.aggregated {
            coverage.observe(entry.interval_start, entry.interval_end);
        }

        let reason = match decision {
            Decision::Skip(reason) => {
                debug!(file = %entry.file_name, ?reason, "Skipping entry");
                return Ok(GranuleOutcome::Skipped(reason));
            }
            Decision::Download(reason) => reason,
        };

        let modified = entry.resolved_modified(now);
        let staging = self.staging_dir();
        info!(file = %entry.file_name, ?reason, "Harvesting entry");

        let local = ensure_local(
            self.collaborators.fetcher.as_ref(),
            &entry.download_link,
            &staging.join(&entry.file_name),
            modified,
        )
        .await?;

        let mut granules = Vec::new();
        if self.config.aggregated {
            let slices = split_aggregate(
                self.collaborators.slicer.clone(),
                &local,
                self.window,
                &self.config.short_name,
                &staging,
            )
            .await?;

            for slice in &slices {
                coverage.observe(slice.time, slice.time);
                let stamp = format_wire(&slice.time);
                let artifact = GranuleArtifact {
                    dataset: &self.config.ds_name,
                    date: stamp.clone(),
                    source: &entry.download_link,
                    modified_time: stamp,
                    download_time: now,
                    local_path: &slice.path,
                    file_name: &slice.file_name,
                };
                granules.push(self.publish_granule(&artifact, prior).await);
            }
        } else {
            let artifact = GranuleArtifact {
                dataset: &self.config.ds_name,
                date: format_wire(&entry.interval_start),
                source: &entry.download_link,
                modified_time: format_wire(&modified),
                download_time: now,
                local_path: &local,
                file_name: &entry.file_name,
            };
            granules.push(self.publish_granule(&artifact, prior).await);
        }

        Ok(GranuleOutcome::Harvested(granules))
    }

    /// Checksum, upload when enabled, and build the record pair.
    async fn publish_granule(
        &self,
        artifact: &GranuleArtifact<'_>,
        prior: &PriorState,
    ) -> GranuleRecords {
        let stats = inspect_file(artifact.local_path, artifact.file_name).await;

        let upload = match &self.collaborators.uploader {
            None => UploadOutcome::NotRequested,
            Some(uploader) => {
                let key = object_key(&self.config.ds_name, artifact.local_path, artifact.file_name);
                match uploader.upload(artifact.local_path, &key).await {
                    Ok(uri) => {
                        debug!(uri = %uri, "Uploaded granule");
                        discard_staged(artifact.local_path).await;
                        UploadOutcome::Uploaded(uri)
                    }
                    Err(e) => {
                        warn!(file = %artifact.file_name, error = %e, "Granule upload unsuccessful");
                        UploadOutcome::Failed(e.to_string())
                    }
                }
            }
        };

        let (harvest, lineage) = build_records(
            artifact,
            stats,
            &upload,
            prior.harvest_id(artifact.file_name),
            prior.lineage_id(&artifact.date),
        );

        GranuleRecords {
            harvest_key: artifact.file_name.to_string(),
            harvest,
            lineage,
        }
    }

    async fn publish_delta(&self, delta: &RunDelta, report: &mut RunReport) {
        if delta.is_empty() {
            info!("No new downloads");
            return;
        }

        match self.collaborators.index.update(delta.documents()).await {
            Ok(()) => info!(documents = delta.len(), "Granule metadata posted"),
            Err(e) => {
                error!(error = %e, "Granule metadata post failed");
                report.index_failures += 1;
            }
        }
    }

    /// Write every document of the run to `{target_dir}/{ds_name}.json`,
    /// uploading it when object storage is enabled. Failures are logged only.
    async fn write_run_artifact(&self, delta: &RunDelta) {
        let file_name = self.config.metadata_file_name();
        let path = self.config.target_dir.join(&file_name);

        let wire: Vec<Value> = delta.documents().iter().map(IndexDocument::to_wire).collect();
        let body = match serde_json::to_vec(&wire) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to encode run metadata");
                return;
            }
        };

        if let Err(e) = fs::write(&path, body).await {
            warn!(path = %path.display(), error = %e, "Failed to write run metadata");
            return;
        }
        debug!(path = %path.display(), "Wrote run metadata");

        if let Some(uploader) = &self.collaborators.uploader {
            let key = format!("{}/{}", META_PREFIX, file_name);
            if let Err(e) = uploader.upload(&path, &key).await {
                warn!(key = %key, error = %e, "Failed to upload run metadata");
            }
        }
    }

    async fn reconcile_dataset(&self, summary: &RunSummary, report: &mut RunReport) {
        let index = self.collaborators.index.as_ref();

        let rows = match index
            .query(&type_filters(DATASET_TYPE, &self.config.ds_name))
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "Dataset document query failed, leaving dataset untouched");
                report.index_failures += 1;
                return;
            }
        };

        if rows.len() > 1 {
            warn!(count = rows.len(), "Multiple dataset documents found, updating the first");
        }

        let existing = match rows.into_iter().next() {
            None => None,
            Some(row) => match serde_json::from_value::<DatasetRecord>(Value::Object(row)) {
                Ok(record) => Some(record),
                Err(e) => {
                    error!(error = %e, "Unreadable dataset document, leaving dataset untouched");
                    report.index_failures += 1;
                    return;
                }
            },
        };

        let plan = reconcile::plan(&self.config, existing.as_ref(), summary);
        report.transition = Some(plan.transition);

        match index.update(std::slice::from_ref(&plan.dataset)).await {
            Ok(()) => info!(transition = ?plan.transition, status = %summary.status(), "Dataset document updated"),
            Err(e) => {
                error!(error = %e, "Dataset document update failed");
                report.index_failures += 1;
            }
        }

        if !plan.fields.is_empty() {
            match index.update(&plan.fields).await {
                Ok(()) => info!(fields = plan.fields.len(), "Field documents created"),
                Err(e) => {
                    error!(error = %e, "Field document creation failed");
                    report.index_failures += 1;
                }
            }
        }
    }
}

/// Remove a staged file once its upload succeeded. Failed uploads keep
/// theirs for inspection.
async fn discard_staged(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove staged granule");
    }
}

/// Object key for a granule: `{dataset}/{local file name}`.
fn object_key(dataset: &str, local_path: &Path, fallback: &str) -> String {
    let name = local_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| fallback.to_string());
    format!("{}/{}", dataset, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_uses_local_name() {
        assert_eq!(
            object_key("SMAP", Path::new("/tmp/SMAP/a.nc"), "a.nc.gz"),
            "SMAP/a.nc"
        );
    }
}
