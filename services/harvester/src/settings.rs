//! Runtime settings that are not part of a dataset configuration.

use std::path::{Path, PathBuf};

use harvest_common::DatasetConfig;
use storage::{ObjectStorageConfig, SolrIndexConfig};

/// Object storage flags as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct BucketSettings {
    pub bucket: Option<String>,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: String,
    pub allow_http: bool,
}

impl BucketSettings {
    /// Storage config for upload mode, or `None` for local mode.
    pub fn storage_config(&self) -> Option<ObjectStorageConfig> {
        let bucket = self.bucket.as_deref().map(str::trim).filter(|b| !b.is_empty())?;

        let mut config = ObjectStorageConfig::for_bucket(bucket);
        config.endpoint = self.endpoint.clone();
        config.access_key_id = self.access_key_id.clone();
        config.secret_access_key = self.secret_access_key.clone();
        config.region = self.region.clone();
        config.allow_http = self.allow_http;
        Some(config)
    }
}

/// Index connection for the dataset's collection.
pub fn index_config(solr_host: &str, config: &DatasetConfig, timeout_secs: u64) -> SolrIndexConfig {
    SolrIndexConfig {
        host: solr_host.to_string(),
        collection: config.solr_collection_name.clone(),
        request_timeout_secs: timeout_secs,
    }
}

/// Place the dataset's scratch directory under `root` unless the dataset
/// configuration already names one.
pub fn apply_scratch_root(config: &mut DatasetConfig, root: Option<&Path>) {
    if config.scratch_dir.is_some() {
        return;
    }
    if let Some(root) = root {
        config.scratch_dir = Some(root.join(&config.ds_name));
    }
}

/// Resolve the configuration file: an explicit path wins, otherwise
/// `{config_dir}/{dataset}.yaml`.
pub fn config_path(
    explicit: Option<&Path>,
    config_dir: &Path,
    dataset: Option<&str>,
) -> Option<PathBuf> {
    match (explicit, dataset) {
        (Some(path), _) => Some(path.to_path_buf()),
        (None, Some(dataset)) => Some(config_dir.join(format!("{}.yaml", dataset))),
        (None, None) => None,
    }
}
