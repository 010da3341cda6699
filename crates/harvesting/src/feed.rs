//! Typed decoder for OpenSearch/Atom granule feeds.
//!
//! Only the handful of elements the engine consumes are kept: entry links,
//! the `time:start`/`time:end` interval, the entry `updated` stamp and the
//! feed-level `rel="next"` link. Namespace prefixes are ignored so providers
//! that alias the Atom or time namespaces decode the same way.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{SyncError, SyncResult};

/// Title of the link carrying the OPeNDAP access URL.
pub const OPENDAP_LINK_TITLE: &str = "OPeNDAP URL";

/// A `<link>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedLink {
    pub rel: Option<String>,
    pub title: Option<String>,
    pub href: String,
}

/// One `<entry>` as it appears in the feed, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub links: Vec<FeedLink>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub updated: Option<String>,
}

impl FeedEntry {
    pub fn link_titled(&self, title: &str) -> Option<&FeedLink> {
        self.links
            .iter()
            .find(|link| link.title.as_deref() == Some(title))
    }
}

/// One decoded result page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedPage {
    /// Entries in document order
    pub entries: Vec<FeedEntry>,
    /// URL of the following page, absent on the last page
    pub next: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    Start,
    End,
    Updated,
}

fn read_link(element: &BytesStart) -> SyncResult<FeedLink> {
    let mut link = FeedLink::default();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| SyncError::FeedParse(format!("bad link attribute: {}", e)))?;
        let value = attr
            .unescape_value()
            .map_err(|e| SyncError::FeedParse(e.to_string()))?
            .into_owned();
        match attr.key.local_name().as_ref() {
            b"rel" => link.rel = Some(value),
            b"title" => link.title = Some(value),
            b"href" => link.href = value,
            _ => {}
        }
    }
    Ok(link)
}

/// Decode one feed page.
///
/// Malformed XML is an error for the whole page; missing fields inside an
/// entry are left as `None` for the entry decoder to judge.
pub fn parse_feed(xml: &str) -> SyncResult<FeedPage> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut page = FeedPage::default();
    let mut current: Option<FeedEntry> = None;
    let mut capture: Option<Capture> = None;
    let mut text = String::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            SyncError::FeedParse(format!(
                "XML error at position {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                b"entry" if matches!(event, Event::Start(_)) => {
                    current = Some(FeedEntry::default());
                }
                b"link" => {
                    let link = read_link(e)?;
                    match current.as_mut() {
                        Some(entry) => entry.links.push(link),
                        None => {
                            if link.rel.as_deref() == Some("next") && !link.href.is_empty() {
                                page.next = Some(link.href);
                            }
                        }
                    }
                }
                name if current.is_some() && matches!(event, Event::Start(_)) => {
                    capture = match name {
                        b"start" => Some(Capture::Start),
                        b"end" => Some(Capture::End),
                        b"updated" => Some(Capture::Updated),
                        _ => None,
                    };
                    text.clear();
                }
                _ => {}
            },
            Event::Text(t) if capture.is_some() => {
                let value = t.unescape().map_err(|e| SyncError::FeedParse(e.to_string()))?;
                text.push_str(&value);
            }
            Event::CData(t) if capture.is_some() => {
                text.push_str(&String::from_utf8_lossy(&t.into_inner()));
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"entry" => {
                    if let Some(entry) = current.take() {
                        page.entries.push(entry);
                    }
                    capture = None;
                }
                b"start" | b"end" | b"updated" => {
                    if let (Some(field), Some(entry)) = (capture.take(), current.as_mut()) {
                        let value = Some(text.trim().to_string()).filter(|v| !v.is_empty());
                        match field {
                            Capture::Start => entry.start = value,
                            Capture::End => entry.end = value,
                            Capture::Updated => entry.updated = value,
                        }
                    }
                    text.clear();
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if current.is_some() {
        return Err(SyncError::FeedParse("unterminated entry".to_string()));
    }

    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"
      xmlns:time="http://a9.com/-/opensearch/extensions/time/1.0/">
  <updated>2020-02-01T00:00:00Z</updated>
  <link href="https://example.org/search?page=1" rel="self"/>
  <link href="https://example.org/search?page=2&amp;x=1" rel="next"/>
  <entry>
    <title>granule one</title>
    <link href="https://example.org/opendap/sst_20200101.nc.html" title="OPeNDAP URL" rel="enclosure"/>
    <link href="https://example.org/ftp/sst_20200101.nc" title="FTP URL"/>
    <time:start>2020-01-01T00:00:00.000000000Z</time:start>
    <time:end>2020-01-01T23:59:59.999999999Z</time:end>
    <updated>2020-01-05T10:00:00Z</updated>
  </entry>
  <entry>
    <link href="https://example.org/opendap/sst_20200102.nc.html" title="OPeNDAP URL"/>
    <time:start>2020-01-02T00:00:00Z</time:start>
    <time:end>2020-01-02T23:59:59Z</time:end>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_entries_in_order() {
        let page = parse_feed(PAGE).unwrap();
        assert_eq!(page.entries.len(), 2);

        let first = &page.entries[0];
        assert_eq!(
            first.link_titled(OPENDAP_LINK_TITLE).unwrap().href,
            "https://example.org/opendap/sst_20200101.nc.html"
        );
        assert_eq!(first.start.as_deref(), Some("2020-01-01T00:00:00.000000000Z"));
        assert_eq!(first.updated.as_deref(), Some("2020-01-05T10:00:00Z"));

        assert_eq!(page.entries[1].updated, None);
        assert_eq!(page.entries[1].end.as_deref(), Some("2020-01-02T23:59:59Z"));
    }

    #[test]
    fn test_feed_level_updated_is_not_an_entry_field() {
        let page = parse_feed(PAGE).unwrap();
        assert!(page.entries.iter().all(|e| e.updated.as_deref() != Some("2020-02-01T00:00:00Z")));
    }

    #[test]
    fn test_next_link() {
        let page = parse_feed(PAGE).unwrap();
        assert_eq!(page.next.as_deref(), Some("https://example.org/search?page=2&x=1"));
    }

    #[test]
    fn test_last_page_has_no_next() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><link rel="self" href="x"/></feed>"#;
        let page = parse_feed(xml).unwrap();
        assert!(page.entries.is_empty());
        assert_eq!(page.next, None);
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        let err = parse_feed("<feed><entry><time:start>oops</feed>").unwrap_err();
        assert!(matches!(err, SyncError::FeedParse(_)));
    }
}
