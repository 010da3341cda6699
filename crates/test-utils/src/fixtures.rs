//! Dataset configuration fixtures.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use harvest_common::{DatasetConfig, FieldDescriptor};

/// Catalog host used by fixtures.
pub const FIXTURE_HOST: &str =
    "https://podaac.example.org/ws/search/granule/?format=atom&sortBy=timeAsc&itemsPerPage=300";

/// Midnight UTC on the given day.
pub fn utc_day(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("invalid fixture date {}-{}-{}", year, month, day))
}

/// Builder for [`DatasetConfig`] values used in tests.
#[derive(Debug, Clone)]
pub struct DatasetFixture {
    ds_name: String,
    short_name: String,
    start: String,
    end: String,
    aggregated: bool,
    target_dir: PathBuf,
    scratch_dir: Option<PathBuf>,
    fields: Vec<FieldDescriptor>,
}

impl DatasetFixture {
    /// Non-aggregated dataset covering 2020.
    pub fn new(target_dir: &Path) -> Self {
        Self {
            ds_name: "SMAP_RSS_L3_SSS_SMI_8DAY".to_string(),
            short_name: "SMAP_L3_SSS".to_string(),
            start: "20200101T00:00:00Z".to_string(),
            end: "20201231T23:59:59Z".to_string(),
            aggregated: false,
            target_dir: target_dir.to_path_buf(),
            scratch_dir: None,
            fields: vec![FieldDescriptor {
                name: "sss_smap".to_string(),
                long_name: "SMAP sea surface salinity".to_string(),
                standard_name: "sea_surface_salinity".to_string(),
                units: "1e-3".to_string(),
            }],
        }
    }

    pub fn name(mut self, ds_name: &str) -> Self {
        self.ds_name = ds_name.to_string();
        self
    }

    pub fn window(mut self, start: &str, end: &str) -> Self {
        self.start = start.to_string();
        self.end = end.to_string();
        self
    }

    pub fn aggregated(mut self, aggregated: bool) -> Self {
        self.aggregated = aggregated;
        self
    }

    pub fn scratch_dir(mut self, dir: &Path) -> Self {
        self.scratch_dir = Some(dir.to_path_buf());
        self
    }

    pub fn build(self) -> DatasetConfig {
        DatasetConfig {
            ds_name: self.ds_name,
            short_name: self.short_name,
            host: FIXTURE_HOST.to_string(),
            podaac_id: "PODAAC-SMP3L-8DOS4".to_string(),
            start: self.start,
            end: self.end,
            aggregated: self.aggregated,
            date_regex: "%Y-%m-%dT%H:%M:%SZ".to_string(),
            target_dir: self.target_dir,
            scratch_dir: self.scratch_dir,
            solr_collection_name: "ecco_datasets".to_string(),
            data_time_scale: "daily".to_string(),
            date_format: "yyyymmdd".to_string(),
            original_dataset_title: "RSS SMAP Level 3 Sea Surface Salinity".to_string(),
            original_dataset_short_name: "SMAP_RSS_L3_SSS_SMI_8DAY-RUNNINGMEAN_V4".to_string(),
            original_dataset_url: "https://podaac.jpl.nasa.gov/dataset/SMAP_RSS_L3_SSS".to_string(),
            original_dataset_reference: "Meissner et al.".to_string(),
            original_dataset_doi: "10.5067/SMP40-3SPCS".to_string(),
            fields: self.fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_is_valid() {
        let config = DatasetFixture::new(Path::new("/tmp/target")).build();
        assert!(config.validate().is_ok());
        assert!(!config.aggregated);
    }

    #[test]
    fn test_utc_day() {
        assert_eq!(utc_day(2020, 1, 2).to_rfc3339(), "2020-01-02T00:00:00+00:00");
    }
}
