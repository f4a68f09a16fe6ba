//! Candidate fetching from RSS and Atom feeds.
//!
//! Feeds for the selected category are fetched concurrently and parsed with
//! a small event-driven reader. A feed that fails to download or parse is
//! logged and contributes nothing; it never fails the whole fetch.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::Reader;
use reqwest::Client;
use tracing::{debug, info, instrument, warn};

use crate::config::CategoryConfig;
use crate::error::{PipelineError, Result};
use crate::models::CandidateItem;

/// How many feeds are downloaded in flight at once.
const FEED_CONCURRENCY: usize = 4;

/// Source of candidate headlines for a category.
pub trait CandidateSource {
    /// Fetch candidates for `category`. Per-feed failures are isolated: the
    /// returned list is simply smaller when a feed breaks, and an empty list
    /// means the run has nothing to publish.
    async fn fetch(&self, category: &CategoryConfig) -> Vec<CandidateItem>;
}

/// Fetches candidates from a category's RSS/Atom feed URLs.
pub struct RssCandidateSource {
    client: Client,
    per_source_items: usize,
}

impl RssCandidateSource {
    pub fn new(client: Client, per_source_items: usize) -> Self {
        Self {
            client,
            per_source_items,
        }
    }

    /// Download and parse one feed, keeping the first `per_source_items`
    /// entries in document order.
    #[instrument(level = "info", skip_all, fields(feed = %feed_url))]
    async fn fetch_one(&self, feed_url: &str, category: &str) -> Result<Vec<CandidateItem>> {
        let response = self
            .client
            .get(feed_url)
            .send()
            .await
            .map_err(|e| PipelineError::SourceFetch(format!("{feed_url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::SourceFetch(format!(
                "{feed_url}: HTTP {status}"
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::SourceFetch(format!("{feed_url}: {e}")))?;

        let entries = parse_feed(&body)?;
        let items = entries
            .into_iter()
            .take(self.per_source_items)
            .map(|entry| CandidateItem {
                title: entry.title,
                source_link: entry.link,
                published_at: entry.published_at,
                category: category.to_string(),
            })
            .collect();
        Ok(items)
    }
}

impl CandidateSource for RssCandidateSource {
    #[instrument(level = "info", skip_all, fields(category = %category.name))]
    async fn fetch(&self, category: &CategoryConfig) -> Vec<CandidateItem> {
        let per_feed: Vec<Vec<CandidateItem>> = stream::iter(category.feeds.iter())
            .map(|feed_url| async move {
                match self.fetch_one(feed_url, &category.name).await {
                    Ok(items) => {
                        debug!(feed = %feed_url, count = items.len(), "Collected feed items");
                        items
                    }
                    Err(e) => {
                        warn!(feed = %feed_url, error = %e, "Feed failed; contributing no candidates");
                        Vec::new()
                    }
                }
            })
            .buffer_unordered(FEED_CONCURRENCY)
            .collect()
            .await;

        let items: Vec<CandidateItem> = per_feed.into_iter().flatten().collect();
        info!(category = %category.name, count = items.len(), "Collected candidates");
        items
    }
}

/// One entry parsed out of a feed document.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(PartialEq)]
enum Field {
    Title,
    Link,
    Date,
}

/// Parse an RSS 2.0 or Atom document into its entries.
///
/// Handles CDATA sections, character and named entity references, RSS
/// `<link>` text as well as Atom `<link href>` attributes, and the
/// `pubDate`/`published`/`updated` date elements (RFC 2822 first, then
/// RFC 3339; anything else leaves the date unset). Entries without a title
/// or link are dropped. Channel-level metadata is never mistaken for an
/// entry.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>> {
    let mut reader = Reader::from_str(xml);

    let mut entries = Vec::new();
    let mut in_entry = false;
    let mut field: Option<Field> = None;
    let mut buf = String::new();
    let mut title = String::new();
    let mut link = String::new();
    let mut date_raw = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"item" | b"entry" => {
                    in_entry = true;
                    field = None;
                    title.clear();
                    link.clear();
                    date_raw.clear();
                }
                b"title" if in_entry => {
                    field = Some(Field::Title);
                    buf.clear();
                }
                b"link" if in_entry => {
                    if let Some(href) = link_from_attributes(&e) {
                        if link.is_empty() {
                            link = href;
                        }
                        field = None;
                    } else {
                        field = Some(Field::Link);
                        buf.clear();
                    }
                }
                b"pubDate" | b"published" | b"updated" if in_entry => {
                    field = Some(Field::Date);
                    buf.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if in_entry && e.local_name().as_ref() == b"link" && link.is_empty() {
                    if let Some(href) = link_from_attributes(&e) {
                        link = href;
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if in_entry && field.is_some() {
                    buf.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::CData(e)) => {
                if in_entry && field.is_some() {
                    buf.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if in_entry && field.is_some() {
                    match resolve_reference(&e) {
                        Some(ch) => buf.push(ch),
                        // Unknown entity: keep it verbatim.
                        None => {
                            if let Ok(name) = e.decode() {
                                buf.push('&');
                                buf.push_str(&name);
                                buf.push(';');
                            }
                        }
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"item" | b"entry" => {
                    if !title.trim().is_empty() && !link.trim().is_empty() {
                        entries.push(FeedEntry {
                            title: title.trim().to_string(),
                            link: link.trim().to_string(),
                            published_at: parse_entry_date(date_raw.trim()),
                        });
                    }
                    in_entry = false;
                    field = None;
                }
                b"title" if field == Some(Field::Title) => {
                    if title.is_empty() {
                        title = buf.trim().to_string();
                    }
                    field = None;
                }
                b"link" if field == Some(Field::Link) => {
                    if link.is_empty() {
                        link = buf.trim().to_string();
                    }
                    field = None;
                }
                b"pubDate" | b"published" | b"updated" if field == Some(Field::Date) => {
                    if date_raw.is_empty() {
                        date_raw = buf.trim().to_string();
                    }
                    field = None;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(PipelineError::SourceFetch(format!(
                    "malformed feed at byte {}: {e}",
                    reader.buffer_position()
                )));
            }
        }
    }

    Ok(entries)
}

/// Extract an Atom-style `href`, accepting only alternate (or unmarked)
/// links so `rel="self"` does not shadow the story URL.
fn link_from_attributes(e: &BytesStart) -> Option<String> {
    if let Ok(Some(rel)) = e.try_get_attribute("rel") {
        if rel.value.as_ref() != b"alternate" {
            return None;
        }
    }
    match e.try_get_attribute("href") {
        Ok(Some(href)) => Some(decode_attribute_entities(&String::from_utf8_lossy(
            href.value.as_ref(),
        ))),
        _ => None,
    }
}

/// Decode the XML-predefined entities in a raw attribute value.
fn decode_attribute_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&#34;", "\"")
        .replace("&amp;", "&")
}

fn resolve_reference(reference: &BytesRef) -> Option<char> {
    if let Ok(Some(ch)) = reference.resolve_char_ref() {
        return Some(ch);
    }
    match reference.decode().ok()?.as_ref() {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => None,
    }
}

fn parse_entry_date(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
