//! Validated catalog entries.

use chrono::{DateTime, Utc};
use tracing::debug;

use harvest_common::time::parse_timestamp;

use crate::error::{SyncError, SyncResult};
use crate::feed::{FeedEntry, OPENDAP_LINK_TITLE};

/// Extensions a granule file name must contain to be harvested.
const RECOGNIZED_EXTENSIONS: [&str; 3] = [".nc", ".bz2", ".gz"];

/// One remote granule, decoded from a feed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Direct download URL (OPeNDAP suffix stripped)
    pub download_link: String,
    /// Last path segment of the download link
    pub file_name: String,
    pub interval_start: DateTime<Utc>,
    pub interval_end: DateTime<Utc>,
    /// Remote modification time, when the provider publishes one
    pub last_modified: Option<DateTime<Utc>>,
}

impl CatalogEntry {
    /// Decode a feed entry.
    ///
    /// Returns `Ok(None)` when the file name carries no recognized extension;
    /// such entries are ignored rather than counted as failures.
    pub fn from_feed(entry: &FeedEntry, date_pattern: &str) -> SyncResult<Option<Self>> {
        let href = entry
            .link_titled(OPENDAP_LINK_TITLE)
            .map(|link| link.href.as_str())
            .ok_or_else(|| SyncError::Entry("entry has no OPeNDAP link".to_string()))?;

        let download_link = strip_access_suffix(href)
            .ok_or_else(|| SyncError::Entry(format!("unexpected link '{}'", href)))?
            .to_string();
        let file_name = download_link
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();

        if !RECOGNIZED_EXTENSIONS
            .iter()
            .any(|ext| file_name.contains(ext))
        {
            debug!(file = %file_name, "Ignoring entry without a granule extension");
            return Ok(None);
        }

        let start = entry
            .start
            .as_deref()
            .ok_or_else(|| SyncError::Entry(format!("{} has no interval start", file_name)))?;
        let end = entry
            .end
            .as_deref()
            .ok_or_else(|| SyncError::Entry(format!("{} has no interval end", file_name)))?;

        let last_modified = entry
            .updated
            .as_deref()
            .and_then(|raw| parse_timestamp(raw, date_pattern).ok());

        Ok(Some(Self {
            download_link,
            file_name,
            interval_start: parse_timestamp(start, date_pattern)?,
            interval_end: parse_timestamp(end, date_pattern)?,
            last_modified,
        }))
    }

    /// Modification time used for staleness checks.
    ///
    /// Falls back to `now` so entries without a published timestamp always
    /// look newer than any recorded download.
    pub fn resolved_modified(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.last_modified.unwrap_or(now)
    }
}

/// Drop the trailing `.html`-style suffix OPeNDAP links carry.
fn strip_access_suffix(href: &str) -> Option<&str> {
    href.rsplit_once('.')
        .map(|(prefix, _)| prefix)
        .filter(|prefix| !prefix.is_empty())
}
