//! In-memory collaborators for harvest scenarios.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use harvest_common::DatasetConfig;
use harvesting::{CatalogSource, Collaborators, GranuleFetcher, SyncError, SyncResult, TimeSlicer};
use netcdf_parser::{SliceSummary, TimeStep};
use storage::{IndexDocument, IndexRow, MetadataIndex, ObjectUploader, StorageError, StorageResult};

/// Catalog pages keyed by URL.
#[derive(Default)]
pub struct MemoryCatalog {
    pages: Mutex<HashMap<String, String>>,
    pub requested: Mutex<Vec<String>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, body: String) -> Self {
        self.set_page(url, body);
        self
    }

    pub fn set_page(&self, url: &str, body: String) {
        self.pages.lock().unwrap().insert(url.to_string(), body);
    }
}

#[async_trait]
impl CatalogSource for MemoryCatalog {
    async fn fetch_page(&self, url: &str) -> SyncResult<String> {
        self.requested.lock().unwrap().push(url.to_string());
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| SyncError::Catalog(format!("404 for {}", url)))
    }
}

/// Index that stores documents in memory and assigns ids on insert.
#[derive(Default)]
pub struct MemoryIndex {
    docs: Mutex<Vec<IndexRow>>,
    next_id: AtomicUsize,
    pub batches: Mutex<Vec<Vec<Value>>>,
    pub reject_updates: AtomicBool,
    pub fail_queries: AtomicBool,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stored document; an id is assigned when missing.
    pub fn seed(&self, doc: Value) -> String {
        let mut row = match doc {
            Value::Object(map) => map,
            other => panic!("seed expects an object, got {}", other),
        };
        let id = match row.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = self.assign_id();
                row.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };
        self.docs.lock().unwrap().push(row);
        id
    }

    fn assign_id(&self) -> String {
        format!("doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn docs_of_type(&self, doc_type: &str) -> Vec<IndexRow> {
        self.docs
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.get("type_s") == Some(&Value::String(doc_type.to_string())))
            .cloned()
            .collect()
    }

    pub fn doc_by_id(&self, id: &str) -> Option<IndexRow> {
        self.docs
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.get("id").and_then(Value::as_str) == Some(id))
            .cloned()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    fn matches(row: &IndexRow, filter: &str) -> bool {
        match filter.split_once(':') {
            Some((field, value)) => row.get(field).and_then(Value::as_str) == Some(value),
            None => false,
        }
    }
}

#[async_trait]
impl MetadataIndex for MemoryIndex {
    async fn query(&self, filters: &[String]) -> StorageResult<Vec<IndexRow>> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StorageError::InvalidResponse("index unavailable".to_string()));
        }
        Ok(self
            .docs
            .lock()
            .unwrap()
            .iter()
            .filter(|row| filters.iter().all(|f| Self::matches(row, f)))
            .cloned()
            .collect())
    }

    async fn update(&self, documents: &[IndexDocument]) -> StorageResult<()> {
        self.batches
            .lock()
            .unwrap()
            .push(documents.iter().map(IndexDocument::to_wire).collect());

        if self.reject_updates.load(Ordering::SeqCst) {
            return Err(StorageError::IndexRejected {
                status: 500,
                body: "rejected".to_string(),
            });
        }

        for document in documents {
            match document {
                IndexDocument::FullInsert(changes) => {
                    let mut row = Map::new();
                    row.insert("id".to_string(), Value::String(self.assign_id()));
                    for change in changes {
                        row.insert(change.field.clone(), change.value.clone());
                    }
                    self.docs.lock().unwrap().push(row);
                }
                IndexDocument::PartialUpdate { id, changes } => {
                    let mut docs = self.docs.lock().unwrap();
                    let row = docs
                        .iter_mut()
                        .find(|row| row.get("id").and_then(Value::as_str) == Some(id.as_str()))
                        .ok_or_else(|| StorageError::InvalidResponse(format!("unknown id {}", id)))?;
                    for change in changes {
                        row.insert(change.field.clone(), change.value.clone());
                    }
                }
            }
        }
        Ok(())
    }
}

/// Fetcher that writes fixed bytes and can be told to fail per URL.
#[derive(Default)]
pub struct StaticFetcher {
    pub body: Vec<u8>,
    pub failing: Mutex<HashSet<String>>,
    pub fetched: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new(body: &[u8]) -> Self {
        Self {
            body: body.to_vec(),
            ..Default::default()
        }
    }

    pub fn fail_on(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }
}

#[async_trait]
impl GranuleFetcher for StaticFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> SyncResult<()> {
        self.fetched.lock().unwrap().push(url.to_string());
        if self.failing.lock().unwrap().contains(url) {
            return Err(SyncError::Download(format!("connection reset fetching {}", url)));
        }
        tokio::fs::write(dest, &self.body).await?;
        Ok(())
    }
}

/// Slicer with a fixed time axis that writes a marker file per slice.
#[derive(Default)]
pub struct FakeSlicer {
    pub times: Vec<DateTime<Utc>>,
}

impl TimeSlicer for FakeSlicer {
    fn time_steps(&self, _path: &Path) -> SyncResult<Vec<TimeStep>> {
        Ok(self
            .times
            .iter()
            .enumerate()
            .map(|(index, time)| TimeStep { index, time: *time })
            .collect())
    }

    fn write_slice(&self, _source: &Path, index: usize, dest: &Path) -> SyncResult<SliceSummary> {
        std::fs::write(dest, format!("slice {}", index))?;
        Ok(SliceSummary {
            copied: 1,
            skipped: Vec::new(),
        })
    }
}

/// Uploader that records keys, or fails every call.
#[derive(Default)]
pub struct MemoryUploader {
    pub bucket: String,
    pub fail: bool,
    pub keys: Mutex<Vec<String>>,
}

impl MemoryUploader {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            ..Default::default()
        }
    }

    pub fn failing(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            fail: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ObjectUploader for MemoryUploader {
    async fn upload(&self, local_path: &Path, key: &str) -> StorageResult<String> {
        if self.fail {
            return Err(StorageError::ObjectStore(format!(
                "Failed to write {}: access denied",
                key
            )));
        }
        tokio::fs::metadata(local_path).await?;
        self.keys.lock().unwrap().push(key.to_string());
        Ok(format!("s3://{}/{}", self.bucket, key))
    }
}

/// Shared handles to every collaborator of one test harness.
pub struct Harness {
    pub catalog: Arc<MemoryCatalog>,
    pub index: Arc<MemoryIndex>,
    pub fetcher: Arc<StaticFetcher>,
    pub slicer: Arc<FakeSlicer>,
    pub uploader: Option<Arc<MemoryUploader>>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            catalog: Arc::new(MemoryCatalog::new()),
            index: Arc::new(MemoryIndex::new()),
            fetcher: Arc::new(StaticFetcher::new(b"granule bytes")),
            slicer: Arc::new(FakeSlicer::default()),
            uploader: None,
        }
    }

    pub fn with_slicer(mut self, slicer: FakeSlicer) -> Self {
        self.slicer = Arc::new(slicer);
        self
    }

    pub fn with_uploader(mut self, uploader: MemoryUploader) -> Self {
        self.uploader = Some(Arc::new(uploader));
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            catalog: self.catalog.clone(),
            index: self.index.clone(),
            fetcher: self.fetcher.clone(),
            slicer: self.slicer.clone(),
            uploader: self
                .uploader
                .clone()
                .map(|u| u as Arc<dyn ObjectUploader>),
        }
    }

    /// Serve `body` as the first catalog page of `config`.
    pub fn serve_first_page(&self, config: &DatasetConfig, body: String) {
        self.catalog.set_page(&config.catalog_url(), body);
    }
}
