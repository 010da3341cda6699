//! Snapshot of prior harvest state, taken once at the start of a run.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{info, instrument, warn};

use storage::{IndexRow, MetadataIndex};

use crate::documents::{HarvestRecord, LineageRecord, HARVESTED_TYPE, LINEAGE_TYPE};
use crate::error::{SyncError, SyncResult};

/// Filter queries selecting documents of one type for one dataset.
pub fn type_filters(doc_type: &str, dataset: &str) -> Vec<String> {
    vec![format!("type_s:{}", doc_type), format!("dataset_s:{}", dataset)]
}

/// Harvest records keyed by file name and lineage records keyed by date.
#[derive(Debug, Clone, Default)]
pub struct PriorState {
    harvested: HashMap<String, HarvestRecord>,
    lineage: HashMap<String, LineageRecord>,
}

impl PriorState {
    /// Query the index for every harvest and lineage document of `dataset`.
    ///
    /// Any failure here is fatal: without the snapshot the run cannot tell
    /// inserts from updates.
    #[instrument(skip(index))]
    pub async fn load(index: &dyn MetadataIndex, dataset: &str) -> SyncResult<Self> {
        let harvested = index
            .query(&type_filters(HARVESTED_TYPE, dataset))
            .await
            .map_err(|e| SyncError::Snapshot(e.to_string()))?;
        let lineage = index
            .query(&type_filters(LINEAGE_TYPE, dataset))
            .await
            .map_err(|e| SyncError::Snapshot(e.to_string()))?;

        let state = Self::from_rows(harvested, lineage);
        info!(
            harvested = state.harvested.len(),
            lineage = state.lineage.len(),
            "Loaded prior harvest state"
        );
        Ok(state)
    }

    pub fn from_rows(harvested: Vec<IndexRow>, lineage: Vec<IndexRow>) -> Self {
        let mut state = Self::default();

        for row in harvested {
            match serde_json::from_value::<HarvestRecord>(Value::Object(row)) {
                Ok(record) => {
                    state.harvested.insert(record.file_name.clone(), record);
                }
                Err(e) => warn!(error = %e, "Ignoring malformed harvest document"),
            }
        }

        for row in lineage {
            match serde_json::from_value::<LineageRecord>(Value::Object(row)) {
                Ok(record) => {
                    state.lineage.insert(record.date.clone(), record);
                }
                Err(e) => warn!(error = %e, "Ignoring malformed lineage document"),
            }
        }

        state
    }

    pub fn harvest_record(&self, file_name: &str) -> Option<&HarvestRecord> {
        self.harvested.get(file_name)
    }

    /// Identity of the existing harvest document for `file_name`.
    pub fn harvest_id(&self, file_name: &str) -> Option<String> {
        self.harvested.get(file_name).and_then(|r| r.id.clone())
    }

    /// Identity of the existing lineage document for `date`.
    pub fn lineage_id(&self, date: &str) -> Option<String> {
        self.lineage.get(date).and_then(|r| r.id.clone())
    }
}
