//! Metadata index client (Solr-style select/update API).
//!
//! Documents are built as [`IndexDocument`] values: either a full insert or a
//! partial update of named fields on an existing document id. The `{"set": ..}`
//! wire wrapping only happens in [`IndexDocument::to_wire`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::error::{StorageError, StorageResult};

/// A document as returned by an index query.
pub type IndexRow = Map<String, Value>;

/// Row limit for select queries; large enough to return every document of a dataset.
const SELECT_ROWS: u32 = 300_000;

/// One field assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub value: Value,
}

impl FieldChange {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// A document headed for the index.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexDocument {
    /// New document; the index assigns its id.
    FullInsert(Vec<FieldChange>),
    /// Set the listed fields on an existing document.
    PartialUpdate { id: String, changes: Vec<FieldChange> },
}

impl IndexDocument {
    /// Insert when no id is known yet, otherwise update in place.
    pub fn upsert(id: Option<String>, changes: Vec<FieldChange>) -> Self {
        match id {
            Some(id) => IndexDocument::PartialUpdate { id, changes },
            None => IndexDocument::FullInsert(changes),
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            IndexDocument::FullInsert(_) => None,
            IndexDocument::PartialUpdate { id, .. } => Some(id),
        }
    }

    pub fn changes(&self) -> &[FieldChange] {
        match self {
            IndexDocument::FullInsert(changes) => changes,
            IndexDocument::PartialUpdate { changes, .. } => changes,
        }
    }

    /// Value assigned to `field`, if any.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.changes()
            .iter()
            .find(|change| change.field == field)
            .map(|change| &change.value)
    }

    /// Wire representation accepted by the update endpoint.
    pub fn to_wire(&self) -> Value {
        let mut object = Map::new();
        match self {
            IndexDocument::FullInsert(changes) => {
                for change in changes {
                    object.insert(change.field.clone(), change.value.clone());
                }
            }
            IndexDocument::PartialUpdate { id, changes } => {
                object.insert("id".to_string(), Value::String(id.clone()));
                for change in changes {
                    let mut set = Map::new();
                    set.insert("set".to_string(), change.value.clone());
                    object.insert(change.field.clone(), Value::Object(set));
                }
            }
        }
        Value::Object(object)
    }
}

impl Serialize for IndexDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

/// Query/update seam used by the harvest engine.
#[async_trait]
pub trait MetadataIndex: Send + Sync {
    /// Return every document matching all filter queries.
    async fn query(&self, filters: &[String]) -> StorageResult<Vec<IndexRow>>;

    /// Apply a batch of documents and commit.
    ///
    /// A non-success status is reported as [`StorageError::IndexRejected`].
    async fn update(&self, documents: &[IndexDocument]) -> StorageResult<()>;
}

/// Connection settings for a Solr collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolrIndexConfig {
    /// Base URL ending in `/solr/`
    pub host: String,
    pub collection: String,
    pub request_timeout_secs: u64,
}

/// Solr implementation of [`MetadataIndex`].
pub struct SolrIndex {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SelectResponse {
    response: SelectBody,
}

#[derive(Debug, Deserialize)]
struct SelectBody {
    docs: Vec<IndexRow>,
}

impl SolrIndex {
    pub fn new(config: &SolrIndexConfig) -> StorageResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StorageError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: collection_url(&config.host, &config.collection),
        })
    }

    fn select_params(filters: &[String]) -> Vec<(&'static str, String)> {
        let mut params = vec![("q", "*:*".to_string()), ("rows", SELECT_ROWS.to_string())];
        params.extend(filters.iter().map(|fq| ("fq", fq.clone())));
        params
    }
}

fn collection_url(host: &str, collection: &str) -> String {
    if host.ends_with('/') {
        format!("{}{}", host, collection)
    } else {
        format!("{}/{}", host, collection)
    }
}

#[async_trait]
impl MetadataIndex for SolrIndex {
    #[instrument(skip(self), fields(url = %self.base_url))]
    async fn query(&self, filters: &[String]) -> StorageResult<Vec<IndexRow>> {
        let response = self
            .client
            .get(format!("{}/select", self.base_url))
            .query(&Self::select_params(filters))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::InvalidResponse(format!(
                "select returned {}: {}",
                status, body
            )));
        }

        let parsed: SelectResponse = response
            .json()
            .await
            .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;

        debug!(count = parsed.response.docs.len(), "Index query complete");
        Ok(parsed.response.docs)
    }

    #[instrument(skip(self, documents), fields(url = %self.base_url, count = documents.len()))]
    async fn update(&self, documents: &[IndexDocument]) -> StorageResult<()> {
        let response = self
            .client
            .post(format!("{}/update?commit=true", self.base_url))
            .json(documents)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Index update rejected");
            return Err(StorageError::IndexRejected {
                status: status.as_u16(),
                body,
            });
        }

        info!("Index update committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_insert_wire_format() {
        let doc = IndexDocument::FullInsert(vec![
            FieldChange::new("type_s", "field"),
            FieldChange::new("name_s", "sss"),
        ]);
        assert_eq!(doc.to_wire(), json!({"type_s": "field", "name_s": "sss"}));
        assert_eq!(doc.id(), None);
    }

    #[test]
    fn test_partial_update_wraps_set() {
        let doc = IndexDocument::upsert(
            Some("abc".to_string()),
            vec![
                FieldChange::new("harvest_success_b", true),
                FieldChange::new("file_size_l", 42),
            ],
        );
        assert_eq!(
            doc.to_wire(),
            json!({
                "id": "abc",
                "harvest_success_b": {"set": true},
                "file_size_l": {"set": 42}
            })
        );
        assert_eq!(doc.get("file_size_l"), Some(&json!(42)));
    }

    #[test]
    fn test_serialize_batch_uses_wire_format() {
        let docs = vec![IndexDocument::upsert(
            Some("id-1".to_string()),
            vec![FieldChange::new("last_checked_dt", "2020-01-01T00:00:00Z")],
        )];
        let body = serde_json::to_value(&docs).unwrap();
        assert_eq!(
            body,
            json!([{"id": "id-1", "last_checked_dt": {"set": "2020-01-01T00:00:00Z"}}])
        );
    }

    #[test]
    fn test_select_params_repeat_fq() {
        let params = SolrIndex::select_params(&[
            "type_s:harvested".to_string(),
            "dataset_s:sst".to_string(),
        ]);
        assert_eq!(params[0], ("q", "*:*".to_string()));
        assert_eq!(params.iter().filter(|(k, _)| *k == "fq").count(), 2);
    }

    #[test]
    fn test_collection_url() {
        assert_eq!(
            collection_url("http://localhost:8983/solr/", "ecco_datasets"),
            "http://localhost:8983/solr/ecco_datasets"
        );
        assert_eq!(
            collection_url("http://localhost:8983/solr", "ecco_datasets"),
            "http://localhost:8983/solr/ecco_datasets"
        );
    }

    #[test]
    fn test_parse_select_response() {
        let body = json!({"response": {"numFound": 1, "docs": [{"id": "x", "filename_s": "a.nc"}]}});
        let parsed: SelectResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.response.docs.len(), 1);
        assert_eq!(parsed.response.docs[0]["filename_s"], "a.nc");
    }
}
