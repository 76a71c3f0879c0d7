//! Pagination frontier crawler
//!
//! Walks a category's listing pages in order over a single rendering session
//! and accumulates article links that are neither already known nor already
//! seen during this run. Listing sites often advertise more pages than they
//! have content for, so there is no exhaustion signal to wait for: the crawl
//! stops after a configured number of consecutive pages yield nothing new, or
//! at the page cap, whichever comes first.

use crate::config::CrawlerConfig;
use crate::crawler::parser::SiteExtractor;
use crate::crawler::render::{RenderSession, Renderer};
use crate::storage::Category;
use crate::url::page_url;
use crate::HarvestError;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::Instrument;

/// Why a category crawl ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Too many consecutive pages without new links
    EmptyStreak,
    /// The configured maximum page number was reached
    PageCap,
}

/// Result of crawling one category
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    /// Newly discovered article URLs, in sorted order
    pub links: BTreeSet<String>,

    /// Pages requested, including failed ones
    pub pages_visited: u32,

    /// Pages whose render failed
    pub pages_failed: u32,

    pub stop_reason: StopReason,
}

/// Sequential, streak-terminated crawler for category listings
#[derive(Clone)]
pub struct FrontierCrawler {
    renderer: Arc<dyn Renderer>,
    extractor: Arc<SiteExtractor>,
    config: CrawlerConfig,
    page_param: String,
}

impl FrontierCrawler {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        extractor: Arc<SiteExtractor>,
        config: CrawlerConfig,
        page_param: impl Into<String>,
    ) -> Self {
        Self {
            renderer,
            extractor,
            config,
            page_param: page_param.into(),
        }
    }

    /// Crawls the listing pages of `category`
    ///
    /// `known` must hold every URL already stored or staged for the category;
    /// the crawler never derives it itself. Per-page render failures are
    /// logged and skipped without affecting the empty streak.
    ///
    /// # Errors
    ///
    /// Fails only when the session cannot be opened or the category URL
    /// cannot be turned into a page URL.
    pub async fn crawl(
        &self,
        category: &Category,
        known: &HashSet<String>,
    ) -> Result<CrawlOutcome, HarvestError> {
        let span = tracing::info_span!("category", name = %category.name(), id = category.id);
        let mut session = self.renderer.open_session().instrument(span.clone()).await?;

        let outcome = self
            .crawl_pages(session.as_mut(), category, known)
            .instrument(span)
            .await;

        session.close().await;
        outcome
    }

    async fn crawl_pages(
        &self,
        session: &mut dyn RenderSession,
        category: &Category,
        known: &HashSet<String>,
    ) -> Result<CrawlOutcome, HarvestError> {
        tracing::info!("Start crawling category {}", category.url);

        let mut accumulator = BTreeSet::new();
        let mut empty_streak = 0u32;
        let mut pages_visited = 0u32;
        let mut pages_failed = 0u32;
        let mut stop_reason = StopReason::PageCap;

        for page in 1..=self.config.max_pages {
            let url = page_url(&category.url, &self.page_param, page)?;
            pages_visited += 1;

            let html = match session.render(url.as_str(), self.config.page_timeout()).await {
                Ok(html) => html,
                Err(e) if e.is_timeout() => {
                    pages_failed += 1;
                    tracing::warn!("Page {} timeout, skip to next page", page);
                    continue;
                }
                Err(e) => {
                    pages_failed += 1;
                    tracing::error!("Page {} unexpected error: {}, skip", page, e);
                    continue;
                }
            };

            let new_links: Vec<String> = self
                .extractor
                .extract_links(&html)
                .into_iter()
                .filter(|link| !known.contains(link) && !accumulator.contains(link))
                .collect();

            if new_links.is_empty() {
                empty_streak += 1;
                tracing::info!("Page {}: no new links (empty streak {})", page, empty_streak);
                if empty_streak >= self.config.empty_streak_limit {
                    tracing::info!(
                        "Stop crawling after {} empty pages in a row",
                        self.config.empty_streak_limit
                    );
                    stop_reason = StopReason::EmptyStreak;
                    break;
                }
            } else {
                empty_streak = 0;
                let found = new_links.len();
                accumulator.extend(new_links);
                tracing::info!(
                    "Page {}: {} new links found (total: {})",
                    page,
                    found,
                    accumulator.len()
                );
            }
        }

        Ok(CrawlOutcome {
            links: accumulator,
            pages_visited,
            pages_failed,
            stop_reason,
        })
    }
}
