//! Granule and lineage documents.
//!
//! The same record types are used for the prior state read back from the
//! index and for the documents emitted by a run. Emitted records become
//! [`IndexDocument`]s: a partial update when the index already holds a
//! document for the same file (or date, for lineage), a full insert otherwise.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use harvest_common::time::{format_wire, wire_time};
use storage::{FieldChange, IndexDocument};

/// `type_s` of granule documents.
pub const HARVESTED_TYPE: &str = "harvested";
/// `type_s` of lineage documents.
pub const LINEAGE_TYPE: &str = "lineage";
/// `message_s` recorded when the object-storage upload fails.
pub const UPLOAD_FAILED_MESSAGE: &str = "aws upload unsuccessful";

const CHECKSUM_CHUNK: usize = 4096;

/// Per-file harvest state.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HarvestRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "dataset_s", default)]
    pub dataset: String,
    #[serde(rename = "date_s", default)]
    pub date: String,
    #[serde(rename = "source_s", default)]
    pub source: String,
    #[serde(rename = "modified_time_s", default)]
    pub modified_time: String,
    #[serde(rename = "download_time_dt", default, deserialize_with = "wire_time::lenient")]
    pub download_time: Option<DateTime<Utc>>,
    #[serde(rename = "harvest_success_b", default)]
    pub harvest_success: bool,
    #[serde(rename = "pre_transformation_file_path_s", default)]
    pub file_path: String,
    #[serde(rename = "filename_s")]
    pub file_name: String,
    #[serde(rename = "file_size_l", default)]
    pub file_size: Option<u64>,
    #[serde(rename = "checksum_s", default)]
    pub checksum: Option<String>,
    #[serde(rename = "message_s", default)]
    pub message: Option<String>,
}

impl HarvestRecord {
    pub fn to_document(&self) -> IndexDocument {
        let mut changes = vec![
            FieldChange::new("type_s", HARVESTED_TYPE),
            FieldChange::new("date_s", self.date.as_str()),
            FieldChange::new("dataset_s", self.dataset.as_str()),
            FieldChange::new("source_s", self.source.as_str()),
            FieldChange::new("modified_time_s", self.modified_time.as_str()),
        ];
        if let Some(download_time) = &self.download_time {
            changes.push(FieldChange::new("download_time_dt", format_wire(download_time)));
        }
        changes.push(FieldChange::new("harvest_success_b", self.harvest_success));
        changes.push(FieldChange::new(
            "pre_transformation_file_path_s",
            self.file_path.as_str(),
        ));
        changes.push(FieldChange::new("filename_s", self.file_name.as_str()));
        if let Some(size) = self.file_size {
            changes.push(FieldChange::new("file_size_l", size));
        }
        if let Some(checksum) = &self.checksum {
            changes.push(FieldChange::new("checksum_s", checksum.as_str()));
        }
        if let Some(message) = &self.message {
            changes.push(FieldChange::new("message_s", message.as_str()));
        }
        IndexDocument::upsert(self.id.clone(), changes)
    }
}

/// Most recent harvest attempt for one date.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LineageRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "dataset_s", default)]
    pub dataset: String,
    #[serde(rename = "date_s")]
    pub date: String,
    #[serde(rename = "source_s", default)]
    pub source: String,
    #[serde(rename = "harvest_success_b", default)]
    pub harvest_success: bool,
    #[serde(rename = "pre_transformation_file_path_s", default)]
    pub file_path: String,
}

impl LineageRecord {
    pub fn to_document(&self) -> IndexDocument {
        IndexDocument::upsert(
            self.id.clone(),
            vec![
                FieldChange::new("type_s", LINEAGE_TYPE),
                FieldChange::new("dataset_s", self.dataset.as_str()),
                FieldChange::new("date_s", self.date.as_str()),
                FieldChange::new("source_s", self.source.as_str()),
                FieldChange::new("harvest_success_b", self.harvest_success),
                FieldChange::new("pre_transformation_file_path_s", self.file_path.as_str()),
            ],
        )
    }
}

/// Size and MD5 of a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStats {
    pub size: u64,
    pub checksum: String,
}

/// Compute [`FileStats`] by streaming the file in fixed-size chunks.
pub async fn file_stats(path: &Path) -> std::io::Result<FileStats> {
    let mut file = tokio::fs::File::open(path).await?;
    let size = file.metadata().await?.len();

    let mut hasher = Md5::new();
    let mut buf = vec![0u8; CHECKSUM_CHUNK];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(FileStats {
        size,
        checksum: hex::encode(hasher.finalize()),
    })
}

/// Like [`file_stats`] but logs and swallows failures.
pub async fn inspect_file(path: &Path, file_name: &str) -> Option<FileStats> {
    match file_stats(path).await {
        Ok(stats) => Some(stats),
        Err(e) => {
            warn!(file = %file_name, error = %e, "Failed computing file size and checksum");
            None
        }
    }
}

/// Result of handing a granule to object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Local mode: the file stays where it was written.
    NotRequested,
    /// Uploaded, with the resulting `scheme://bucket/key` URI.
    Uploaded(String),
    Failed(String),
}

/// Everything the builder needs to know about one produced granule.
#[derive(Debug, Clone)]
pub struct GranuleArtifact<'a> {
    pub dataset: &'a str,
    /// `date_s` value, already in the wire format
    pub date: String,
    pub source: &'a str,
    pub modified_time: String,
    pub download_time: DateTime<Utc>,
    pub local_path: &'a Path,
    pub file_name: &'a str,
}

/// Build the harvest and lineage records for one granule.
///
/// `stats` is `None` when the size/checksum could not be computed; those
/// fields are then left out without affecting harvest success. A failed
/// upload demotes the record: success is cleared, path and name become empty
/// and the size drops to zero.
pub fn build_records(
    artifact: &GranuleArtifact<'_>,
    stats: Option<FileStats>,
    upload: &UploadOutcome,
    prior_id: Option<String>,
    prior_lineage_id: Option<String>,
) -> (HarvestRecord, LineageRecord) {
    let mut record = HarvestRecord {
        id: prior_id,
        dataset: artifact.dataset.to_string(),
        date: artifact.date.clone(),
        source: artifact.source.to_string(),
        modified_time: artifact.modified_time.clone(),
        download_time: Some(artifact.download_time),
        harvest_success: true,
        file_path: artifact.local_path.display().to_string(),
        file_name: artifact.file_name.to_string(),
        file_size: stats.as_ref().map(|s| s.size),
        checksum: stats.map(|s| s.checksum),
        message: None,
    };

    match upload {
        UploadOutcome::NotRequested => {}
        UploadOutcome::Uploaded(uri) => record.file_path = uri.clone(),
        UploadOutcome::Failed(reason) => {
            debug!(file = %artifact.file_name, reason = %reason, "Demoting record after failed upload");
            record.harvest_success = false;
            record.file_path = String::new();
            record.file_name = String::new();
            record.file_size = Some(0);
            record.message = Some(UPLOAD_FAILED_MESSAGE.to_string());
        }
    }

    let lineage = LineageRecord {
        id: prior_lineage_id,
        dataset: record.dataset.clone(),
        date: record.date.clone(),
        source: record.source.clone(),
        harvest_success: record.harvest_success,
        file_path: record.file_path.clone(),
    };

    (record, lineage)
}

/// Documents accumulated over one run.
///
/// Holds at most one harvest document per file name and one lineage
/// document per date; a later granule for the same key replaces the earlier
/// one in place, so the batch never inserts duplicates.
#[derive(Debug, Default)]
pub struct RunDelta {
    documents: Vec<IndexDocument>,
    harvest_slots: HashMap<String, usize>,
    lineage_slots: HashMap<String, usize>,
}

impl RunDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, harvest_key: &str, record: &HarvestRecord, lineage: &LineageRecord) {
        Self::place(
            &mut self.documents,
            &mut self.harvest_slots,
            harvest_key,
            record.to_document(),
        );
        Self::place(
            &mut self.documents,
            &mut self.lineage_slots,
            &lineage.date,
            lineage.to_document(),
        );
    }

    fn place(
        documents: &mut Vec<IndexDocument>,
        slots: &mut HashMap<String, usize>,
        key: &str,
        document: IndexDocument,
    ) {
        match slots.get(key) {
            Some(&slot) => documents[slot] = document,
            None => {
                slots.insert(key.to_string(), documents.len());
                documents.push(document);
            }
        }
    }

    pub fn documents(&self) -> &[IndexDocument] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn artifact<'a>(path: &'a Path) -> GranuleArtifact<'a> {
        GranuleArtifact {
            dataset: "SMAP_SSS",
            date: "2020-01-01T00:00:00Z".to_string(),
            source: "https://example.org/sst_20200101.nc",
            modified_time: "2020-01-05T10:00:00Z".to_string(),
            download_time: Utc.with_ymd_and_hms(2020, 2, 1, 0, 0, 0).unwrap(),
            local_path: path,
            file_name: "sst_20200101.nc",
        }
    }

    fn stats() -> Option<FileStats> {
        Some(FileStats {
            size: 12,
            checksum: "abc".to_string(),
        })
    }

    #[test]
    fn test_successful_local_record() {
        let path = Path::new("/data/sst_20200101.nc");
        let (record, lineage) = build_records(
            &artifact(path),
            stats(),
            &UploadOutcome::NotRequested,
            None,
            None,
        );

        assert!(record.harvest_success);
        assert_eq!(record.file_path, "/data/sst_20200101.nc");
        assert_eq!(record.file_size, Some(12));
        assert_eq!(lineage.date, record.date);
        assert!(lineage.harvest_success);
        assert!(matches!(record.to_document(), IndexDocument::FullInsert(_)));
    }

    #[test]
    fn test_uploaded_record_stores_uri() {
        let path = Path::new("/tmp/SMAP/sst_20200101.nc");
        let (record, lineage) = build_records(
            &artifact(path),
            stats(),
            &UploadOutcome::Uploaded("s3://bucket/SMAP_SSS/sst_20200101.nc".to_string()),
            Some("doc-1".to_string()),
            Some("lin-1".to_string()),
        );

        assert_eq!(record.file_path, "s3://bucket/SMAP_SSS/sst_20200101.nc");
        assert_eq!(lineage.file_path, record.file_path);
        assert_eq!(record.to_document().id(), Some("doc-1"));
        assert_eq!(lineage.to_document().id(), Some("lin-1"));
    }

    #[test]
    fn test_failed_upload_clears_location() {
        let path = Path::new("/tmp/SMAP/sst_20200101.nc");
        let (record, lineage) = build_records(
            &artifact(path),
            stats(),
            &UploadOutcome::Failed("connection reset".to_string()),
            None,
            None,
        );

        assert!(!record.harvest_success);
        assert_eq!(record.file_path, "");
        assert_eq!(record.file_name, "");
        assert_eq!(record.file_size, Some(0));
        assert_eq!(record.message.as_deref(), Some(UPLOAD_FAILED_MESSAGE));
        assert!(!lineage.harvest_success);
        assert_eq!(lineage.file_path, "");
    }

    #[test]
    fn test_missing_stats_omits_fields_but_keeps_success() {
        let path = Path::new("/data/sst_20200101.nc");
        let (record, _) = build_records(
            &artifact(path),
            None,
            &UploadOutcome::NotRequested,
            None,
            None,
        );

        assert!(record.harvest_success);
        let doc = record.to_document();
        assert!(doc.get("file_size_l").is_none());
        assert!(doc.get("checksum_s").is_none());
    }

    #[test]
    fn test_partial_update_wire_shape() {
        let path = Path::new("/data/sst_20200101.nc");
        let (record, _) = build_records(
            &artifact(path),
            stats(),
            &UploadOutcome::NotRequested,
            Some("doc-9".to_string()),
            None,
        );

        let wire = record.to_document().to_wire();
        assert_eq!(wire["id"], json!("doc-9"));
        assert_eq!(wire["type_s"], json!({"set": "harvested"}));
        assert_eq!(wire["download_time_dt"], json!({"set": "2020-02-01T00:00:00Z"}));
    }

    #[test]
    fn test_record_from_index_row() {
        let row = json!({
            "id": "doc-1",
            "type_s": "harvested",
            "dataset_s": "SMAP_SSS",
            "filename_s": "sst_20200101.nc",
            "harvest_success_b": true,
            "download_time_dt": "2020-02-01T00:00:00Z",
            "file_size_l": 1024,
            "_version_": 1
        });
        let record: HarvestRecord = serde_json::from_value(row).unwrap();
        assert_eq!(record.id.as_deref(), Some("doc-1"));
        assert_eq!(
            record.download_time,
            Some(Utc.with_ymd_and_hms(2020, 2, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(record.file_size, Some(1024));
    }

    #[test]
    fn test_unparseable_download_time_is_absent() {
        let row = json!({"filename_s": "a.nc", "download_time_dt": "sometime"});
        let record: HarvestRecord = serde_json::from_value(row).unwrap();
        assert_eq!(record.download_time, None);
    }

    #[test]
    fn test_run_delta_replaces_same_keys() {
        let path = Path::new("/data/sst_20200101.nc");
        let (first, lineage) = build_records(
            &artifact(path),
            stats(),
            &UploadOutcome::NotRequested,
            None,
            None,
        );
        let (second, lineage_again) = build_records(
            &artifact(path),
            None,
            &UploadOutcome::Failed("boom".to_string()),
            None,
            None,
        );

        let mut delta = RunDelta::new();
        delta.push("sst_20200101.nc", &first, &lineage);
        delta.push("sst_20200101.nc", &second, &lineage_again);

        assert_eq!(delta.len(), 2);
        assert_eq!(
            delta.documents()[0].get("harvest_success_b"),
            Some(&json!(false))
        );
    }

    #[tokio::test]
    async fn test_file_stats_md5() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("granule.nc");
        std::fs::write(&path, b"hello world").unwrap();

        let stats = file_stats(&path).await.unwrap();
        assert_eq!(stats.size, 11);
        assert_eq!(stats.checksum, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[tokio::test]
    async fn test_inspect_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(inspect_file(&dir.path().join("missing.nc"), "missing.nc")
            .await
            .is_none());
    }
}
