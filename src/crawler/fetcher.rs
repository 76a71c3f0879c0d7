//! Concurrent article fetcher
//!
//! Renders article pages with a bounded pool of workers, each owning its own
//! rendering session, and stages one artifact per successfully extracted
//! article. A failure on one URL never affects another: timeouts and errors
//! are collected into the [`FetchReport`] and the pool keeps going.

use crate::config::FetcherConfig;
use crate::crawler::parser::SiteExtractor;
use crate::crawler::render::{RenderError, RenderSession, Renderer};
use crate::staging::{ContentArtifact, StagingArea};
use crate::storage::Category;
use crate::HarvestError;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Why an article could not be staged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Navigation exceeded the configured timeout
    Timeout,
    /// Any other failure, with a description
    Error(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Error(message) => write!(f, "{}", message),
        }
    }
}

impl From<RenderError> for FailureReason {
    fn from(e: RenderError) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Error(e.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub url: String,
    pub reason: FailureReason,
}

/// Outcome of fetching a list of articles
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub success_count: usize,
    pub failure_count: usize,
    pub failures: Vec<FetchFailure>,
    /// URLs left alone because an artifact was already staged for them
    pub skipped: usize,
}

/// Bounded worker pool that turns article URLs into staged artifacts
#[derive(Clone)]
pub struct ContentFetcher {
    renderer: Arc<dyn Renderer>,
    extractor: Arc<SiteExtractor>,
    config: FetcherConfig,
    staging: StagingArea,
}

impl ContentFetcher {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        extractor: Arc<SiteExtractor>,
        config: FetcherConfig,
        staging: StagingArea,
    ) -> Self {
        Self {
            renderer,
            extractor,
            config,
            staging,
        }
    }

    /// Fetches every URL of `urls` for `category` and stages the results
    ///
    /// URLs that already have a staged manifest are skipped, so a run that
    /// was interrupted mid-fetch resumes where it stopped.
    ///
    /// # Errors
    ///
    /// Per-URL failures are reported, not returned. This only fails when the
    /// staging area itself cannot be read.
    pub async fn fetch_all(
        &self,
        category: &Category,
        urls: &[String],
    ) -> Result<FetchReport, HarvestError> {
        let name = category.name();
        let already = self.staging.staged_artifact_urls(&name)?;

        let mut report = FetchReport::default();
        let pending: Vec<String> = urls
            .iter()
            .filter(|url| {
                let staged = already.contains(*url);
                if staged {
                    report.skipped += 1;
                }
                !staged
            })
            .cloned()
            .collect();

        if report.skipped > 0 {
            tracing::info!("[{}] {} articles already staged, skipping", name, report.skipped);
        }
        if pending.is_empty() {
            return Ok(report);
        }

        let workers = self.config.workers.max(1) as usize;
        tracing::info!(
            "[{}] Fetching {} articles with {} workers",
            name,
            pending.len(),
            workers
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();

        for url in pending {
            let worker = self.clone();
            let semaphore = semaphore.clone();
            let category_id = category.id;
            let name = name.clone();
            let span = tracing::info_span!("article", category = %name, url = %url);

            tasks.spawn(
                async move {
                    let result = match semaphore.acquire().await {
                        Ok(_permit) => worker.fetch_one(category_id, &name, &url).await,
                        Err(e) => Err(FailureReason::Error(e.to_string())),
                    };
                    (url, result)
                }
                .instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.success_count += 1,
                Ok((url, Err(reason))) => {
                    match &reason {
                        FailureReason::Timeout => tracing::warn!("Timeout fetching {}", url),
                        FailureReason::Error(message) => {
                            tracing::error!("Error fetching {}: {}", url, message)
                        }
                    }
                    report.failure_count += 1;
                    report.failures.push(FetchFailure { url, reason });
                }
                Err(e) => {
                    tracing::error!("Article worker aborted: {}", e);
                    report.failure_count += 1;
                    report.failures.push(FetchFailure {
                        url: String::new(),
                        reason: FailureReason::Error(e.to_string()),
                    });
                }
            }
        }

        tracing::info!(
            "[{}] Fetched {} articles, {} failed",
            name,
            report.success_count,
            report.failure_count
        );
        Ok(report)
    }

    async fn fetch_one(
        &self,
        category_id: i64,
        category_name: &str,
        url: &str,
    ) -> Result<(), FailureReason> {
        let mut session = self.renderer.open_session().await?;
        let result = self
            .render_and_stage(session.as_mut(), category_id, category_name, url)
            .await;
        session.close().await;
        result
    }

    async fn render_and_stage(
        &self,
        session: &mut dyn RenderSession,
        category_id: i64,
        category_name: &str,
        url: &str,
    ) -> Result<(), FailureReason> {
        session
            .render(url, self.config.navigation_timeout())
            .await?;

        self.scroll_to_end(session).await;
        tokio::time::sleep(self.config.settle()).await;

        let html = session.content().await?;
        let extracted = self.extractor.extract_content(&html);
        if !extracted.has_timestamp() {
            tracing::warn!("No publish date found");
        }
        if !extracted.has_body() {
            tracing::warn!("No article body found");
        }

        let artifact =
            ContentArtifact::new(category_id, url, extracted.publish_timestamp, extracted.body);
        let path = self
            .staging
            .write_artifact(category_name, &artifact)
            .map_err(|e| FailureReason::Error(e.to_string()))?;

        tracing::debug!("Staged {}", path.display());
        Ok(())
    }

    /// Scrolls until the document height stops changing or the scroll cap is hit
    async fn scroll_to_end(&self, session: &mut dyn RenderSession) {
        let mut last_height = None;
        for _ in 0..self.config.max_scrolls {
            let height = match session.scroll().await {
                Ok(height) => height,
                Err(e) => {
                    tracing::debug!("Scroll failed, extracting as is: {}", e);
                    return;
                }
            };
            if last_height == Some(height) {
                return;
            }
            last_height = Some(height);
            tokio::time::sleep(self.config.scroll_pause()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Serves an article page for every URL, except those listed as timing out
    struct ScriptedArticles {
        timing_out: HashSet<String>,
        open_sessions: Arc<AtomicUsize>,
        peak_sessions: Arc<AtomicUsize>,
    }

    struct ScriptedSession {
        timing_out: HashSet<String>,
        open_sessions: Arc<AtomicUsize>,
        current: Option<String>,
        height: u64,
    }

    #[async_trait]
    impl Renderer for ScriptedArticles {
        async fn open_session(&self) -> Result<Box<dyn RenderSession>, RenderError> {
            let open = self.open_sessions.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_sessions.fetch_max(open, Ordering::SeqCst);
            Ok(Box::new(ScriptedSession {
                timing_out: self.timing_out.clone(),
                open_sessions: self.open_sessions.clone(),
                current: None,
                height: 0,
            }))
        }
    }

    #[async_trait]
    impl RenderSession for ScriptedSession {
        async fn render(&mut self, url: &str, _timeout: Duration) -> Result<String, RenderError> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if self.timing_out.contains(url) {
                return Err(RenderError::Timeout {
                    url: url.to_string(),
                });
            }
            let html = format!(
                r#"<html><body>
                <p class="date">01/03/2024, 09:30</p>
                <div class="body"><p>Story at {}</p><p>Second paragraph</p></div>
                </body></html>"#,
                url
            );
            self.current = Some(html.clone());
            Ok(html)
        }

        async fn scroll(&mut self) -> Result<u64, RenderError> {
            // Grows twice, then settles
            self.height = (self.height + 1000).min(2000);
            Ok(self.height)
        }

        async fn content(&mut self) -> Result<String, RenderError> {
            self.current.clone().ok_or(RenderError::NothingLoaded)
        }

        async fn close(self: Box<Self>) {
            self.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn extractor() -> Arc<SiteExtractor> {
        let site = SiteConfig {
            base_url: "https://news.example.com".to_string(),
            link_selector: "a.link-layer-imt".to_string(),
            date_selector: "p.date".to_string(),
            date_format: "%d/%m/%Y, %H:%M".to_string(),
            body_selector: "div.body".to_string(),
            paragraph_selector: "p".to_string(),
            page_param: "page".to_string(),
        };
        Arc::new(SiteExtractor::from_config(&site).unwrap())
    }

    fn config(workers: u32) -> FetcherConfig {
        FetcherConfig {
            workers,
            navigation_timeout_ms: 1_000,
            max_scrolls: 20,
            scroll_pause_ms: 0,
            settle_ms: 0,
        }
    }

    fn category() -> Category {
        Category {
            id: 4,
            url: "https://news.example.com/kinh-te.htm".to_string(),
        }
    }

    fn article_urls(n: usize) -> Vec<String> {
        (1..=n)
            .map(|i| format!("https://news.example.com/bai-viet-{}.htm", i))
            .collect()
    }

    fn renderer(timing_out: &[&str], peak: Arc<AtomicUsize>) -> Arc<ScriptedArticles> {
        Arc::new(ScriptedArticles {
            timing_out: timing_out.iter().map(|u| u.to_string()).collect(),
            open_sessions: Arc::new(AtomicUsize::new(0)),
            peak_sessions: peak,
        })
    }

    fn staged_files(dir: &std::path::Path, ext: &str) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                e.as_ref().unwrap().path().extension().and_then(|x| x.to_str()) == Some(ext)
            })
            .count()
    }

    #[tokio::test]
    async fn test_one_timeout_does_not_affect_others() {
        let dir = TempDir::new().unwrap();
        let staging = StagingArea::open(dir.path()).unwrap();
        let urls = article_urls(10);
        let peak = Arc::new(AtomicUsize::new(0));

        let fetcher = ContentFetcher::new(
            renderer(&[urls[3].as_str()], peak.clone()),
            extractor(),
            config(3),
            staging.clone(),
        );

        let report = fetcher.fetch_all(&category(), &urls).await.unwrap();

        assert_eq!(report.success_count, 9);
        assert_eq!(report.failure_count, 1);
        assert_eq!(
            report.failures,
            vec![FetchFailure {
                url: urls[3].clone(),
                reason: FailureReason::Timeout,
            }]
        );

        let content_dir = staging.content_dir("kinh-te");
        assert_eq!(staged_files(&content_dir, "txt"), 9);
        assert_eq!(staged_files(&content_dir, "json"), 9);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_staged_artifact_carries_extracted_content() {
        let dir = TempDir::new().unwrap();
        let staging = StagingArea::open(dir.path()).unwrap();
        let urls = article_urls(1);

        let fetcher = ContentFetcher::new(
            renderer(&[], Arc::new(AtomicUsize::new(0))),
            extractor(),
            config(2),
            staging.clone(),
        );
        fetcher.fetch_all(&category(), &urls).await.unwrap();

        let batch = staging.read_content_batch("kinh-te").unwrap();
        assert_eq!(batch.artifacts.len(), 1);

        let artifact = &batch.artifacts[0];
        assert_eq!(artifact.manifest.publish_timestamp, "2024-03-01-09-30");
        assert_eq!(artifact.manifest.title, "bai-viet-1");
        assert_eq!(artifact.manifest.category_id, 4);
        assert_eq!(
            artifact.body,
            format!("Story at {}\n\nSecond paragraph", urls[0])
        );
    }

    #[tokio::test]
    async fn test_already_staged_urls_are_skipped() {
        let dir = TempDir::new().unwrap();
        let staging = StagingArea::open(dir.path()).unwrap();
        let urls = article_urls(4);

        let fetcher = ContentFetcher::new(
            renderer(&[], Arc::new(AtomicUsize::new(0))),
            extractor(),
            config(2),
            staging.clone(),
        );

        let first = fetcher.fetch_all(&category(), &urls[..2]).await.unwrap();
        assert_eq!(first.success_count, 2);

        let second = fetcher.fetch_all(&category(), &urls).await.unwrap();
        assert_eq!(second.skipped, 2);
        assert_eq!(second.success_count, 2);
        assert_eq!(staged_files(&staging.content_dir("kinh-te"), "json"), 4);
    }

    #[tokio::test]
    async fn test_empty_url_list() {
        let dir = TempDir::new().unwrap();
        let staging = StagingArea::open(dir.path()).unwrap();
        let fetcher = ContentFetcher::new(
            renderer(&[], Arc::new(AtomicUsize::new(0))),
            extractor(),
            config(2),
            staging,
        );

        let report = fetcher.fetch_all(&category(), &[]).await.unwrap();
        assert_eq!(report.success_count, 0);
        assert_eq!(report.failure_count, 0);
    }
}
