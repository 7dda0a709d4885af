//! Feed and page fetching
//!
//! One `PageFetcher` is shared per scrape session; the rate limiter
//! bounds all outbound requests (feed and article pages) to keep the
//! scraper polite toward publishers.

use chrono::{DateTime, Utc};
use cti_common::{Error, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

const USER_AGENT: &str = "CTIScraper/0.1.0 (+https://github.com/cti-scraper/cti-scraper)";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const REQUESTS_PER_SECOND: u32 = 2;

/// One entry parsed out of an RSS/Atom feed
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub title: String,
    pub url: String,
    pub summary: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Rate-limited HTTP fetcher for feeds and article pages
pub struct PageFetcher {
    http: reqwest::Client,
    limiter: DefaultDirectRateLimiter,
}

impl PageFetcher {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Scrape(format!("Failed to build HTTP client: {}", e)))?;

        let qps = NonZeroU32::new(REQUESTS_PER_SECOND)
            .ok_or_else(|| Error::Internal("rate limit must be non-zero".to_string()))?;

        Ok(Self {
            http,
            limiter: RateLimiter::direct(Quota::per_second(qps)),
        })
    }

    /// Fetch and parse an RSS/Atom feed
    pub async fn fetch_feed(&self, url: &str) -> Result<Vec<FeedItem>> {
        self.limiter.until_ready().await;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Scrape(format!("Feed fetch failed for {}: {}", url, e)))?
            .error_for_status()
            .map_err(|e| Error::Scrape(format!("Feed fetch failed for {}: {}", url, e)))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Scrape(format!("Feed read failed for {}: {}", url, e)))?;

        parse_feed(&bytes)
    }

    /// Fetch an article page as text
    ///
    /// Non-HTML responses come back as their raw body; the extractor
    /// stores them as-is.
    pub async fn fetch_page(&self, url: &str) -> Result<String> {
        self.limiter.until_ready().await;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Scrape(format!("Page fetch failed for {}: {}", url, e)))?
            .error_for_status()
            .map_err(|e| Error::Scrape(format!("Page fetch failed for {}: {}", url, e)))?;

        response
            .text()
            .await
            .map_err(|e| Error::Scrape(format!("Page read failed for {}: {}", url, e)))
    }
}

/// Parse feed bytes into items
///
/// Entries without a link are skipped; they can't be fetched.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedItem>> {
    let feed = feed_rs::parser::parse(bytes)
        .map_err(|e| Error::Scrape(format!("Feed parse failed: {}", e)))?;

    let items = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let url = entry.links.first().map(|link| link.href.clone())?;
            let title = entry
                .title
                .map(|t| t.content)
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| url.clone());
            let summary = entry
                .summary
                .map(|t| t.content)
                .filter(|s| !s.trim().is_empty());
            let published_at = entry.published.or(entry.updated);

            Some(FeedItem {
                title,
                url,
                summary,
                published_at,
            })
        })
        .collect();

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Threat Blog</title>
    <link>https://blog.example.com</link>
    <item>
      <title>New loader campaign</title>
      <link>https://blog.example.com/loader-campaign</link>
      <description>Analysis of a new loader.</description>
      <pubDate>Thu, 15 Jan 2026 10:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Entry without a link</title>
      <description>Cannot be fetched.</description>
    </item>
  </channel>
</rss>"#;

    const ATOM_SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Research Feed</title>
  <id>urn:uuid:60a76c80-d399-11d9-b93C-0003939e0af6</id>
  <updated>2026-01-20T12:00:00Z</updated>
  <entry>
    <title>Ransomware intrusion chain</title>
    <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a</id>
    <link href="https://research.example.com/ransomware-chain"/>
    <updated>2026-01-20T12:00:00Z</updated>
  </entry>
</feed>"#;

    #[test]
    fn parses_rss_and_skips_linkless_entries() {
        let items = parse_feed(RSS_SAMPLE.as_bytes()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "New loader campaign");
        assert_eq!(items[0].url, "https://blog.example.com/loader-campaign");
        assert!(items[0].summary.as_deref().unwrap().contains("loader"));
        assert!(items[0].published_at.is_some());
    }

    #[test]
    fn parses_atom() {
        let items = parse_feed(ATOM_SAMPLE.as_bytes()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Ransomware intrusion chain");
        assert!(items[0].published_at.is_some());
    }

    #[test]
    fn garbage_bytes_are_a_scrape_error() {
        let err = parse_feed(b"definitely not xml").unwrap_err();
        assert!(matches!(err, Error::Scrape(_)));
    }

    #[test]
    fn empty_feed_is_ok() {
        let empty = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Empty</title></channel></rss>"#;
        let items = parse_feed(empty.as_bytes()).unwrap();
        assert!(items.is_empty());
    }
}
