//! Atom feed builders shaped like the granule search service output.

use chrono::{DateTime, Utc};

const WIRE: &str = "%Y-%m-%dT%H:%M:%SZ";

/// One `<entry>` of a granule feed.
#[derive(Debug, Clone)]
pub struct AtomEntry {
    pub href: String,
    pub link_title: String,
    pub start: String,
    pub end: String,
    pub updated: Option<String>,
}

impl AtomEntry {
    /// Entry for `file_name` covering one day, with an OPeNDAP `.html` link.
    ///
    /// Interval stamps carry nanosecond fractions like the live service.
    pub fn granule(file_name: &str, day: DateTime<Utc>) -> Self {
        let date = day.format("%Y-%m-%d");
        Self {
            href: format!("https://opendap.example.org/opendap/hyrax/allData/{}.html", file_name),
            link_title: "OPeNDAP URL".to_string(),
            start: format!("{}T00:00:00.000000000Z", date),
            end: format!("{}T23:59:59.999999999Z", date),
            updated: None,
        }
    }

    pub fn updated(mut self, updated: DateTime<Utc>) -> Self {
        self.updated = Some(updated.format(WIRE).to_string());
        self
    }

    pub fn updated_raw(mut self, updated: &str) -> Self {
        self.updated = Some(updated.to_string());
        self
    }

    pub fn link_title(mut self, title: &str) -> Self {
        self.link_title = title.to_string();
        self
    }

    /// Direct download URL the harvester derives from the link.
    pub fn download_url(&self) -> String {
        self.href.trim_end_matches(".html").to_string()
    }

    fn render(&self, out: &mut String) {
        out.push_str("  <entry>\n");
        out.push_str(&format!(
            "    <link href=\"{}\" rel=\"enclosure\" title=\"{}\"/>\n",
            self.href, self.link_title
        ));
        out.push_str(&format!("    <time:start>{}</time:start>\n", self.start));
        out.push_str(&format!("    <time:end>{}</time:end>\n", self.end));
        if let Some(updated) = &self.updated {
            out.push_str(&format!("    <updated>{}</updated>\n", updated));
        }
        out.push_str("  </entry>\n");
    }
}

/// A feed page.
#[derive(Debug, Clone, Default)]
pub struct AtomFeed {
    pub entries: Vec<AtomEntry>,
    pub next: Option<String>,
}

impl AtomFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, entry: AtomEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn next(mut self, url: &str) -> Self {
        self.next = Some(url.to_string());
        self
    }

    pub fn build(&self) -> String {
        let mut out = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <feed xmlns=\"http://www.w3.org/2005/Atom\" \
             xmlns:time=\"http://a9.com/-/opensearch/extensions/time/1.0/\">\n",
        );
        out.push_str("  <title>PO.DAAC Granule Search Results</title>\n");
        if let Some(next) = &self.next {
            out.push_str(&format!(
                "  <link href=\"{}\" rel=\"next\" type=\"application/atom+xml\"/>\n",
                next.replace('&', "&amp;")
            ));
        }
        for entry in &self.entries {
            entry.render(&mut out);
        }
        out.push_str("</feed>\n");
        out
    }
}
