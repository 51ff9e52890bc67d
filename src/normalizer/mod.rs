use chrono::{DateTime, FixedOffset, Utc};
use feed_rs::parser;
use html_escape::decode_html_entities;
use regex::Regex;

use crate::app::{NanorssError, Result};
use crate::domain::{Feeditem, FeeditemKey, UserPagemonitor};

/// Column width used when rendering monitored pages as text.
pub const PAGE_TEXT_WIDTH: usize = 120;

/// Turns fetched documents into the records the store keeps.
#[derive(Clone)]
pub struct Normalizer;

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Parses an RSS, Atom, RDF or JSON feed. Every item gets `updated = now`;
    /// the store keeps the previous stamp when the content did not change.
    pub fn normalize_feed(
        &self,
        feed_url: &str,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Vec<Feeditem>> {
        let feed = parser::parse(body).map_err(|e| NanorssError::FeedParse(e.to_string()))?;

        let items = feed
            .entries
            .into_iter()
            .map(|entry| {
                let link = entry.links.first().map(|l| l.href.clone()).unwrap_or_default();
                let guid = if entry.id.is_empty() {
                    link.clone()
                } else {
                    entry.id.clone()
                };

                let mut item = Feeditem::new(FeeditemKey::new(feed_url, guid));
                item.title = entry
                    .title
                    .map(|t| decode_html_entities(&t.content).to_string())
                    .unwrap_or_default();
                item.url = link;
                item.date = entry
                    .published
                    .or(entry.updated)
                    .map(DateTime::<FixedOffset>::from);
                item.contents = entry
                    .content
                    .and_then(|c| c.body)
                    .or_else(|| entry.summary.map(|s| s.content))
                    .map(|body| decode_html_entities(&body).to_string())
                    .unwrap_or_default();
                item.updated = Some(now);
                item
            })
            .collect();

        Ok(items)
    }

    /// Renders a page as text and applies its match and replace patterns.
    ///
    /// With a match pattern only the matched text is kept, one match per line;
    /// when the pattern has capture groups the groups are kept instead of the
    /// whole match. Text matching the replace pattern is then removed.
    pub fn filter_page(&self, config: &UserPagemonitor, body: &[u8]) -> Result<String> {
        let text = html2text::from_read(body, PAGE_TEXT_WIDTH)
            .map_err(|e| NanorssError::Invalid(format!("cannot render {}: {}", config.url, e)))?;

        let text = if config.match_pattern.is_empty() {
            text
        } else {
            let pattern = compile(&config.match_pattern)?;
            pattern
                .captures_iter(&text)
                .map(|captures| {
                    if captures.len() > 1 {
                        captures
                            .iter()
                            .skip(1)
                            .flatten()
                            .map(|m| m.as_str())
                            .collect::<String>()
                    } else {
                        captures[0].to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        if config.replace_pattern.is_empty() {
            return Ok(text);
        }
        let pattern = compile(&config.replace_pattern)?;
        Ok(pattern.replace_all(&text, "").into_owned())
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| NanorssError::Invalid(format!("bad pattern {:?}: {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Feed</title>
    <description>A test feed</description>
    <item>
      <title>Test Item 1</title>
      <link>https://example.com/item1</link>
      <guid>item-1</guid>
      <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate>
      <description>This is item 1</description>
    </item>
    <item>
      <title>Test Item 2</title>
      <link>https://example.com/item2</link>
      <guid>item-2</guid>
      <description>This is item 2</description>
    </item>
  </channel>
</rss>"#;

    const ATOM_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Test Feed</title>
  <entry>
    <title>Atom Entry 1</title>
    <link href="https://example.com/atom1"/>
    <id>atom-entry-1</id>
    <updated>2024-01-01T00:00:00Z</updated>
    <content type="html">&lt;p&gt;Body&lt;/p&gt;</content>
    <summary>Summary</summary>
  </entry>
</feed>"#;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_parse_rss() {
        let items = Normalizer::new()
            .normalize_feed("http://feed1", RSS_SAMPLE.as_bytes(), now())
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key, FeeditemKey::new("http://feed1", "item-1"));
        assert_eq!(items[0].title, "Test Item 1");
        assert_eq!(items[0].url, "https://example.com/item1");
        assert_eq!(items[0].contents, "This is item 1");
        assert_eq!(
            items[0].date.unwrap().with_timezone(&Utc),
            DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap()
        );
        assert_eq!(items[0].updated, Some(now()));
        assert!(items[1].date.is_none());
    }

    #[test]
    fn test_parse_atom_prefers_content() {
        let items = Normalizer::new()
            .normalize_feed("http://feed2", ATOM_SAMPLE.as_bytes(), now())
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key.guid, "atom-entry-1");
        assert_eq!(items[0].title, "Atom Entry 1");
        assert_eq!(items[0].contents, "<p>Body</p>");
        assert!(items[0].date.is_some());
    }

    #[test]
    fn test_invalid_feed() {
        let result = Normalizer::new().normalize_feed("http://feed1", b"not a feed", now());
        assert!(matches!(result, Err(NanorssError::FeedParse(_))));
    }

    #[test]
    fn test_filter_page_without_patterns_keeps_text() {
        let config = UserPagemonitor::new("http://site1");
        let text = Normalizer::new()
            .filter_page(&config, b"<html><body><p>Hello world</p></body></html>")
            .unwrap();
        assert!(text.contains("Hello world"));
        assert!(!text.contains("<p>"));
    }

    #[test]
    fn test_filter_page_match_and_replace() {
        let mut config = UserPagemonitor::new("http://site1");
        config.match_pattern = r"Price: \d+ EUR".into();
        config.replace_pattern = r" EUR".into();

        let html = b"<html><body><p>Price: 10 EUR</p><p>Other</p><p>Price: 12 EUR</p></body></html>";
        let text = Normalizer::new().filter_page(&config, html).unwrap();
        assert_eq!(text, "Price: 10\nPrice: 12");
    }

    #[test]
    fn test_filter_page_keeps_capture_groups() {
        let mut config = UserPagemonitor::new("http://site1");
        config.match_pattern = r"Version (\d+\.\d+)".into();

        let text = Normalizer::new()
            .filter_page(&config, b"<p>Version 1.2 released</p>")
            .unwrap();
        assert_eq!(text, "1.2");
    }

    #[test]
    fn test_filter_page_rejects_bad_pattern() {
        let mut config = UserPagemonitor::new("http://site1");
        config.match_pattern = "(".into();
        assert!(matches!(
            Normalizer::new().filter_page(&config, b"<p>x</p>"),
            Err(NanorssError::Invalid(_))
        ));
    }
}
