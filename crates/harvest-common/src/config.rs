//! Dataset harvest configuration.
//!
//! One YAML file describes one dataset. The parsed [`DatasetConfig`] is
//! immutable and handed by reference to every stage of a run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HarvestError, HarvestResult};
use crate::time::{parse_config_time, TimeWindow, WIRE_FORMAT};

/// Root configuration for a single dataset harvest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Dataset name used in every index document (`dataset_s`)
    pub ds_name: String,
    /// Short name used for split granule file names
    pub short_name: String,
    /// Catalog search endpoint, already carrying its query prefix
    pub host: String,
    /// Remote dataset identifier
    pub podaac_id: String,
    /// Window start, e.g. `19920101T00:00:01Z`
    pub start: String,
    /// Window end
    pub end: String,
    /// Whether the remote serves one file spanning many time steps
    #[serde(default)]
    pub aggregated: bool,
    /// strftime pattern for feed timestamps
    #[serde(default = "default_date_regex")]
    pub date_regex: String,
    /// Directory for harvested files and the run metadata artifact
    pub target_dir: PathBuf,
    /// Scratch directory override (defaults to `/tmp/{ds_name}`)
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    #[serde(default = "default_collection")]
    pub solr_collection_name: String,
    #[serde(default)]
    pub data_time_scale: String,
    #[serde(default)]
    pub date_format: String,
    #[serde(default)]
    pub original_dataset_title: String,
    #[serde(default)]
    pub original_dataset_short_name: String,
    #[serde(default)]
    pub original_dataset_url: String,
    #[serde(default)]
    pub original_dataset_reference: String,
    #[serde(default)]
    pub original_dataset_doi: String,
    /// Declared dataset fields
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

fn default_date_regex() -> String {
    WIRE_FORMAT.to_string()
}

fn default_collection() -> String {
    "ecco_datasets".to_string()
}

/// A declared dataset field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(default)]
    pub long_name: String,
    #[serde(default)]
    pub standard_name: String,
    #[serde(default)]
    pub units: String,
}

impl DatasetConfig {
    /// Load and validate a dataset configuration from a YAML file.
    pub fn load(path: &Path) -> HarvestResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| HarvestError::ConfigRead {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let config = Self::from_yaml(&content).map_err(|e| match e {
            HarvestError::InvalidConfig(message) => HarvestError::ConfigRead {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })?;

        debug!(dataset = %config.ds_name, path = %path.display(), "Loaded dataset config");
        Ok(config)
    }

    /// Parse and validate from a YAML string.
    pub fn from_yaml(content: &str) -> HarvestResult<Self> {
        let config: DatasetConfig = serde_yaml::from_str(content)
            .map_err(|e| HarvestError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check required values and the time window.
    pub fn validate(&self) -> HarvestResult<()> {
        if self.ds_name.trim().is_empty() {
            return Err(HarvestError::InvalidConfig("ds_name is empty".to_string()));
        }
        if self.short_name.trim().is_empty() {
            return Err(HarvestError::InvalidConfig("short_name is empty".to_string()));
        }
        if self.host.trim().is_empty() {
            return Err(HarvestError::InvalidConfig("host is empty".to_string()));
        }

        let window = self.window()?;
        if window.start > window.end {
            return Err(HarvestError::InvalidConfig(format!(
                "start {} is after end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    /// The configured harvest window.
    pub fn window(&self) -> HarvestResult<TimeWindow> {
        Ok(TimeWindow::new(
            parse_config_time(&self.start)?,
            parse_config_time(&self.end)?,
        ))
    }

    /// Dataset-level source URL (`source_s` on the dataset document).
    pub fn dataset_source(&self) -> String {
        format!("{}&datasetId={}", self.host, self.podaac_id)
    }

    /// First catalog page URL.
    ///
    /// Aggregated datasets are requested without a time filter because the
    /// aggregate is fetched whole and split locally.
    pub fn catalog_url(&self) -> String {
        if self.aggregated {
            self.dataset_source()
        } else {
            format!(
                "{}&endTime={}&startTime={}",
                self.dataset_source(),
                self.end,
                self.start
            )
        }
    }

    /// Scratch directory for this dataset. Never shared between datasets.
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(&self.ds_name))
    }

    /// Name of the run metadata artifact.
    pub fn metadata_file_name(&self) -> String {
        format!("{}.json", self.ds_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const SAMPLE: &str = r#"
ds_name: SMAP_RSS_L3_SSS_SMI_8DAY-RUNNINGMEAN_V4
short_name: SMAP_L3_SSS
host: "https://podaac.jpl.nasa.gov/ws/search/granule/?format=atom&sortBy=timeAsc&itemsPerPage=300"
podaac_id: PODAAC-SMP3L-8DOS4
start: "20150401T00:00:00Z"
end: "20150410T00:00:00Z"
aggregated: false
date_regex: "%Y-%m-%dT%H:%M:%SZ"
target_dir: /data/harvested
fields:
  - name: sss_smap
    long_name: SMAP sea surface salinity
    standard_name: sea_surface_salinity
    units: "1e-3"
"#;

    #[test]
    fn test_parse_dataset_config() {
        let config = DatasetConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.short_name, "SMAP_L3_SSS");
        assert_eq!(config.fields.len(), 1);
        assert_eq!(config.fields[0].units, "1e-3");
        assert_eq!(config.solr_collection_name, "ecco_datasets");

        let window = config.window().unwrap();
        assert_eq!(window.start, Utc.with_ymd_and_hms(2015, 4, 1, 0, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2015, 4, 10, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_catalog_url_depends_on_aggregation() {
        let mut config = DatasetConfig::from_yaml(SAMPLE).unwrap();
        assert!(config
            .catalog_url()
            .ends_with("&datasetId=PODAAC-SMP3L-8DOS4&endTime=20150410T00:00:00Z&startTime=20150401T00:00:00Z"));

        config.aggregated = true;
        assert!(config.catalog_url().ends_with("&datasetId=PODAAC-SMP3L-8DOS4"));
    }

    #[test]
    fn test_rejects_inverted_window() {
        let yaml = SAMPLE.replace("20150410T00:00:00Z", "20140101T00:00:00Z");
        assert!(matches!(
            DatasetConfig::from_yaml(&yaml),
            Err(HarvestError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_scratch_dir_is_per_dataset() {
        let config = DatasetConfig::from_yaml(SAMPLE).unwrap();
        assert!(config
            .scratch_dir()
            .ends_with("SMAP_RSS_L3_SSS_SMI_8DAY-RUNNINGMEAN_V4"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DatasetConfig::load(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(err, HarvestError::ConfigRead { .. }));
    }
}
