//! Scrape orchestration
//!
//! Polls sources, captures new articles, and keeps per-session counts.
//! Failure of one entry (or one source) is counted and logged, never
//! fatal to the session.

pub mod extract;
pub mod feed;

use chrono::Utc;
use cti_common::db::models::{Article, Source, TriageStatus};
use cti_common::events::{CtiEvent, EventBus};
use cti_common::Result;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;
use crate::models::{ScrapeSession, ScrapeState};

use feed::PageFetcher;

const SUMMARY_MAX_CHARS: usize = 500;

/// Per-source poll statistics
#[derive(Debug, Default, Clone, Copy)]
pub struct SourcePollStats {
    pub entries_seen: usize,
    pub articles_stored: usize,
    pub articles_skipped: usize,
    pub entries_failed: usize,
}

/// Drives scrape sessions over the source registry
pub struct ScrapeOrchestrator {
    db: SqlitePool,
    event_bus: EventBus,
    fetcher: PageFetcher,
}

impl ScrapeOrchestrator {
    pub fn new(db: SqlitePool, event_bus: EventBus) -> Result<Self> {
        Ok(Self {
            db,
            event_bus,
            fetcher: PageFetcher::new()?,
        })
    }

    /// Run a scrape session over the given sources
    pub async fn run_session(
        &self,
        mut session: ScrapeSession,
        sources: Vec<Source>,
    ) -> Result<ScrapeSession> {
        tracing::info!(
            session_id = %session.session_id,
            sources = sources.len(),
            "Starting scrape session"
        );

        self.event_bus.emit_lossy(CtiEvent::ScrapeSessionStarted {
            session_id: session.session_id,
            source_count: sources.len(),
            timestamp: Utc::now(),
        });

        for source in &sources {
            let stats = match self.poll_source(&mut session, source).await {
                Ok(stats) => {
                    db::sources::record_poll_outcome(&self.db, source.source_id, true, Utc::now())
                        .await?;
                    stats
                }
                Err(e) => {
                    tracing::warn!(
                        source = %source.name,
                        error = %e,
                        "Source poll failed"
                    );
                    session.record_error(&source.name, e.to_string());
                    db::sources::record_poll_outcome(&self.db, source.source_id, false, Utc::now())
                        .await?;
                    SourcePollStats::default()
                }
            };

            session.sources_polled += 1;
            session.entries_seen += stats.entries_seen;
            session.articles_stored += stats.articles_stored;
            session.articles_skipped += stats.articles_skipped;

            self.event_bus.emit_lossy(CtiEvent::SourcePolled {
                session_id: session.session_id,
                source_id: source.source_id,
                source_name: source.name.clone(),
                entries_seen: stats.entries_seen,
                articles_stored: stats.articles_stored,
                articles_skipped: stats.articles_skipped,
                failed: stats.entries_seen == 0 && stats.entries_failed > 0,
                timestamp: Utc::now(),
            });

            db::scrape_sessions::save_session(&self.db, &session).await?;
        }

        let duration_seconds = Utc::now()
            .signed_duration_since(session.started_at)
            .num_seconds()
            .max(0) as u64;

        session.finish(ScrapeState::Completed);
        db::scrape_sessions::save_session(&self.db, &session).await?;

        self.event_bus.emit_lossy(CtiEvent::ScrapeSessionCompleted {
            session_id: session.session_id,
            sources_polled: session.sources_polled,
            articles_stored: session.articles_stored,
            duration_seconds,
            timestamp: Utc::now(),
        });

        tracing::info!(
            session_id = %session.session_id,
            stored = session.articles_stored,
            skipped = session.articles_skipped,
            "Scrape session completed"
        );

        Ok(session)
    }

    /// Poll one source: fetch the feed, then capture each new entry
    async fn poll_source(
        &self,
        session: &mut ScrapeSession,
        source: &Source,
    ) -> Result<SourcePollStats> {
        let items = self.fetcher.fetch_feed(&source.feed_url).await?;
        let mut stats = SourcePollStats {
            entries_seen: items.len(),
            ..Default::default()
        };

        for item in items {
            match self.capture_entry(source, &item).await {
                Ok(true) => stats.articles_stored += 1,
                Ok(false) => stats.articles_skipped += 1,
                Err(e) => {
                    tracing::warn!(url = %item.url, error = %e, "Entry capture failed");
                    session.record_error(&source.name, format!("{}: {}", item.url, e));
                    stats.entries_failed += 1;
                }
            }
        }

        Ok(stats)
    }

    /// Fetch and store one feed entry. Returns false when deduplicated.
    async fn capture_entry(&self, source: &Source, item: &feed::FeedItem) -> Result<bool> {
        if db::articles::exists_by_url(&self.db, &item.url).await? {
            return Ok(false);
        }

        let html = self.fetcher.fetch_page(&item.url).await?;
        let content = extract::extract_text(&html);
        let hash = content_hash(&content);

        if db::articles::exists_by_hash(&self.db, &hash).await? {
            return Ok(false);
        }

        let title = if item.title.trim().is_empty() {
            extract::extract_title(&html).unwrap_or_else(|| item.url.clone())
        } else {
            item.title.clone()
        };

        let article = Article {
            article_id: Uuid::new_v4(),
            source_id: Some(source.source_id),
            title,
            url: item.url.clone(),
            content,
            content_hash: hash,
            summary: item.summary.as_deref().map(truncate_summary),
            published_at: item.published_at,
            scraped_at: Utc::now(),
            triage_status: TriageStatus::New,
            os_targets: None,
            indicators: None,
            ttps: None,
        };

        db::articles::insert_article(&self.db, &article).await?;

        self.event_bus.emit_lossy(CtiEvent::ArticleStored {
            article_id: article.article_id,
            source_id: article.source_id,
            title: article.title.clone(),
            url: article.url.clone(),
            timestamp: Utc::now(),
        });

        Ok(true)
    }
}

/// SHA-256 over normalized content, as lowercase hex
pub fn content_hash(content: &str) -> String {
    let normalized: String = content.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn truncate_summary(summary: &str) -> String {
    match summary.char_indices().nth(SUMMARY_MAX_CHARS) {
        Some((idx, _)) => format!("{}…", &summary[..idx]),
        None => summary.to_string(),
    }
}
