//! Dataset coverage and dataset/field document reconciliation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use harvest_common::time::{format_wire, wire_time};
use harvest_common::DatasetConfig;
use storage::{FieldChange, IndexDocument};

/// `type_s` of dataset documents.
pub const DATASET_TYPE: &str = "dataset";
/// `type_s` of field documents.
pub const FIELD_TYPE: &str = "field";

/// Min/max over every granule interval observed in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Coverage {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl Coverage {
    pub fn observe(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.start = Some(self.start.map_or(start, |s| s.min(start)));
        self.end = Some(self.end.map_or(end, |e| e.max(end)));
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetStatus {
    Harvested,
    NoData,
    NoFilesFound,
}

impl DatasetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetStatus::Harvested => "harvested",
            DatasetStatus::NoData => "nodata",
            DatasetStatus::NoFilesFound => "error harvesting - no files found",
        }
    }
}

impl fmt::Display for DatasetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stored dataset document, as far as reconciliation needs it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatasetRecord {
    pub id: String,
    #[serde(rename = "start_date_dt", default, deserialize_with = "wire_time::lenient")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(rename = "end_date_dt", default, deserialize_with = "wire_time::lenient")]
    pub end_date: Option<DateTime<Utc>>,
}

/// What one run learned, condensed for reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub checked_at: DateTime<Utc>,
    pub coverage: Coverage,
    /// Any entry was downloaded and produced documents this run
    pub any_download: bool,
    /// Download time of the last successful harvest record
    pub last_download: Option<DateTime<Utc>>,
}

impl RunSummary {
    pub fn status(&self) -> DatasetStatus {
        if self.coverage.is_empty() {
            DatasetStatus::NoFilesFound
        } else if self.any_download {
            DatasetStatus::Harvested
        } else {
            DatasetStatus::NoData
        }
    }
}

/// Which edge of the dataset state machine a run takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Created,
    Steady,
}

/// Documents to post for the dataset record and its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetPlan {
    pub transition: Transition,
    pub dataset: IndexDocument,
    /// Only populated on creation
    pub fields: Vec<IndexDocument>,
}

/// Plan the dataset-level update for this run.
pub fn plan(config: &DatasetConfig, existing: Option<&DatasetRecord>, run: &RunSummary) -> DatasetPlan {
    match existing {
        None => DatasetPlan {
            transition: Transition::Created,
            dataset: create_dataset(config, run),
            fields: field_documents(config),
        },
        Some(record) => DatasetPlan {
            transition: Transition::Steady,
            dataset: update_dataset(record, run),
            fields: Vec::new(),
        },
    }
}

fn create_dataset(config: &DatasetConfig, run: &RunSummary) -> IndexDocument {
    let mut changes = vec![
        FieldChange::new("type_s", DATASET_TYPE),
        FieldChange::new("dataset_s", config.ds_name.as_str()),
        FieldChange::new("short_name_s", config.short_name.as_str()),
        FieldChange::new("source_s", config.dataset_source()),
        FieldChange::new("data_time_scale_s", config.data_time_scale.as_str()),
        FieldChange::new("date_format_s", config.date_format.as_str()),
        FieldChange::new("last_checked_dt", format_wire(&run.checked_at)),
        FieldChange::new("original_dataset_title_s", config.original_dataset_title.as_str()),
        FieldChange::new(
            "original_dataset_short_name_s",
            config.original_dataset_short_name.as_str(),
        ),
        FieldChange::new("original_dataset_url_s", config.original_dataset_url.as_str()),
        FieldChange::new(
            "original_dataset_reference_s",
            config.original_dataset_reference.as_str(),
        ),
        FieldChange::new("original_dataset_doi_s", config.original_dataset_doi.as_str()),
    ];

    if let (Some(start), Some(end)) = (run.coverage.start, run.coverage.end) {
        changes.push(FieldChange::new("start_date_dt", format_wire(&start)));
        changes.push(FieldChange::new("end_date_dt", format_wire(&end)));
    }
    if run.any_download {
        if let Some(last) = &run.last_download {
            changes.push(FieldChange::new("last_download_dt", format_wire(last)));
        }
    }
    changes.push(FieldChange::new("status_s", run.status().as_str()));

    IndexDocument::FullInsert(changes)
}

fn update_dataset(record: &DatasetRecord, run: &RunSummary) -> IndexDocument {
    let mut changes = vec![FieldChange::new("last_checked_dt", format_wire(&run.checked_at))];

    if run.any_download {
        changes.push(FieldChange::new("status_s", run.status().as_str()));

        if let Some(last) = &run.last_download {
            changes.push(FieldChange::new("last_download_dt", format_wire(last)));
        }
        if let Some(start) = run.coverage.start {
            if record.start_date.map_or(true, |old| start < old) {
                changes.push(FieldChange::new("start_date_dt", format_wire(&start)));
            }
        }
        if let Some(end) = run.coverage.end {
            if record.end_date.map_or(true, |old| end > old) {
                changes.push(FieldChange::new("end_date_dt", format_wire(&end)));
            }
        }
    }

    IndexDocument::PartialUpdate {
        id: record.id.clone(),
        changes,
    }
}

fn field_documents(config: &DatasetConfig) -> Vec<IndexDocument> {
    config
        .fields
        .iter()
        .map(|field| {
            IndexDocument::FullInsert(vec![
                FieldChange::new("type_s", FIELD_TYPE),
                FieldChange::new("dataset_s", config.ds_name.as_str()),
                FieldChange::new("name_s", field.name.as_str()),
                FieldChange::new("long_name_s", field.long_name.as_str()),
                FieldChange::new("standard_name_s", field.standard_name.as_str()),
                FieldChange::new("units_s", field.units.as_str()),
            ])
        })
        .collect()
}
