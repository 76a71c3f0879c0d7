//! Harvest coordinator - pipeline orchestration
//!
//! This module ties the pipeline stages together:
//! - Opening the store and the staging area, seeding categories
//! - Discovering new links for every category, bounded per category
//! - Fetching staged links into content artifacts
//! - Merging staged links and content into the store

use crate::config::Config;
use crate::crawler::fetcher::{ContentFetcher, FetchReport};
use crate::crawler::frontier::{CrawlOutcome, FrontierCrawler};
use crate::crawler::parser::SiteExtractor;
use crate::crawler::render::{HttpRenderer, Renderer};
use crate::merge::{MergeEngine, MergeSummary};
use crate::staging::StagingArea;
use crate::storage::{lock_storage, Category, SharedStorage, SqliteStorage, Storage};
use crate::HarvestError;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Links discovered and staged for one category
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    pub outcome: CrawlOutcome,
    /// Links pending in the category's batch after staging
    pub staged: usize,
}

/// Outcome of a full pipeline run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub discovered: BTreeMap<String, DiscoveryReport>,
    pub fetched: BTreeMap<String, FetchReport>,
    pub links: MergeSummary,
    pub contents: MergeSummary,
}

impl RunSummary {
    pub fn new_links(&self) -> usize {
        self.discovered.values().map(|r| r.outcome.links.len()).sum()
    }

    pub fn fetch_successes(&self) -> usize {
        self.fetched.values().map(|r| r.success_count).sum()
    }

    pub fn fetch_failures(&self) -> usize {
        self.fetched.values().map(|r| r.failure_count).sum()
    }
}

/// Main pipeline coordinator
pub struct Coordinator {
    config: Arc<Config>,
    storage: SharedStorage,
    staging: StagingArea,
    crawler: FrontierCrawler,
    fetcher: ContentFetcher,
    merge: MergeEngine,
}

impl Coordinator {
    /// Creates a coordinator rendering pages over HTTP
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Store and staging area opened, categories seeded
    /// * `Err(HarvestError)` - Failed to initialize
    pub fn new(config: Config) -> Result<Self, HarvestError> {
        let renderer = HttpRenderer::from_config(&config.user_agent)?;
        Self::with_renderer(config, Arc::new(renderer))
    }

    /// Creates a coordinator over an arbitrary rendering engine
    pub fn with_renderer(config: Config, renderer: Arc<dyn Renderer>) -> Result<Self, HarvestError> {
        let mut storage = SqliteStorage::new(Path::new(&config.output.database_path))?;

        for entry in &config.categories {
            let category = Category::new(entry.id, entry.url.clone());
            if storage.insert_category_if_absent(&category)? {
                tracing::info!("Seeded category {} ({})", category.id, category.url);
            }
        }

        let storage = Arc::new(Mutex::new(storage));
        let staging = StagingArea::open(&config.output.staging_dir)?;
        let extractor = Arc::new(SiteExtractor::from_config(&config.site)?);

        let crawler = FrontierCrawler::new(
            renderer.clone(),
            extractor.clone(),
            config.crawler.clone(),
            config.site.page_param.clone(),
        );
        let fetcher = ContentFetcher::new(
            renderer,
            extractor,
            config.fetcher.clone(),
            staging.clone(),
        );

        let mut merge = MergeEngine::new(storage.clone(), staging.clone());
        if let Some(archive_dir) = &config.output.archive_dir {
            merge = merge.with_archive_dir(archive_dir);
        }

        Ok(Self {
            config: Arc::new(config),
            storage,
            staging,
            crawler,
            fetcher,
            merge,
        })
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    pub fn categories(&self) -> Result<Vec<Category>, HarvestError> {
        Ok(lock_storage(&self.storage)?.list_categories()?)
    }

    /// Crawls every category and stages the newly discovered links
    ///
    /// Categories are crawled concurrently, at most
    /// `crawler.max-category-workers` at a time. A failing category is logged
    /// and left out of the result.
    pub async fn discover_all(&self) -> Result<BTreeMap<String, DiscoveryReport>, HarvestError> {
        let categories = self.categories()?;
        if categories.is_empty() {
            tracing::warn!("No categories to harvest");
            return Ok(BTreeMap::new());
        }

        let workers = self.config.crawler.max_category_workers.max(1) as usize;
        tracing::info!(
            "Discovering links in {} categories ({} at a time)",
            categories.len(),
            workers
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();

        for category in categories {
            let semaphore = semaphore.clone();
            let crawler = self.crawler.clone();
            let storage = self.storage.clone();
            let staging = self.staging.clone();

            tasks.spawn(async move {
                let name = category.name();
                let result = match semaphore.acquire().await {
                    Ok(_permit) => discover_category(&crawler, &storage, &staging, &category).await,
                    Err(_) => Err(HarvestError::PoolClosed),
                };
                (name, result)
            });
        }

        let mut reports = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(report))) => {
                    reports.insert(name, report);
                }
                Ok((name, Err(e))) => tracing::error!("[{}] Discovery failed: {}", name, e),
                Err(e) => tracing::error!("Category worker aborted: {}", e),
            }
        }

        Ok(reports)
    }

    /// Fetches article content for every staged link batch
    pub async fn fetch_all_staged(&self) -> Result<BTreeMap<String, FetchReport>, HarvestError> {
        let mut reports = BTreeMap::new();

        for category in self.categories()? {
            let name = category.name();
            let batch = match self.staging.read_link_batch(&name) {
                Ok(Some(batch)) if !batch.is_empty() => batch,
                Ok(_) => continue,
                Err(e) => {
                    tracing::error!("[{}] Cannot read staged links: {}", name, e);
                    continue;
                }
            };

            let urls: Vec<String> = batch.urls().map(str::to_string).collect();
            let span = tracing::info_span!("category", name = %name, id = category.id);
            match self.fetcher.fetch_all(&category, &urls).instrument(span).await {
                Ok(report) => {
                    reports.insert(name, report);
                }
                Err(e) => tracing::error!("[{}] Fetch failed: {}", name, e),
            }
        }

        Ok(reports)
    }

    /// Merges staged links, then staged content
    pub fn merge(&self) -> Result<(MergeSummary, MergeSummary), HarvestError> {
        let links = self.merge.merge_all_links()?;
        let contents = self.merge.merge_all_content()?;
        Ok((links, contents))
    }

    /// Runs the full pipeline: discover, fetch, merge links, merge content
    pub async fn run(&self) -> Result<RunSummary, HarvestError> {
        let start_time = std::time::Instant::now();

        let discovered = self.discover_all().await?;
        let fetched = self.fetch_all_staged().await?;
        let (links, contents) = self.merge()?;

        let summary = RunSummary {
            discovered,
            fetched,
            links,
            contents,
        };

        tracing::info!(
            "Harvest completed in {:?}: {} new links, {} articles fetched ({} failed), {} links and {} contents merged",
            start_time.elapsed(),
            summary.new_links(),
            summary.fetch_successes(),
            summary.fetch_failures(),
            summary.links.totals().inserted,
            summary.contents.totals().inserted
        );

        Ok(summary)
    }
}

/// Crawls one category against its stored and staged links, then stages
/// whatever is new
async fn discover_category(
    crawler: &FrontierCrawler,
    storage: &SharedStorage,
    staging: &StagingArea,
    category: &Category,
) -> Result<DiscoveryReport, HarvestError> {
    let name = category.name();

    let (mut known, last_stored) = {
        let storage = lock_storage(storage)?;
        (
            storage.known_links(category.id)?,
            storage.max_link_sequence(category.id)?,
        )
    };

    let leftover = staging.read_link_batch(&name)?;
    if let Some(batch) = &leftover {
        tracing::info!("[{}] Resuming with {} staged links", name, batch.len());
        known.extend(batch.urls().map(str::to_string));
    }

    let outcome = crawler.crawl(category, &known).await?;
    let staged = if outcome.links.is_empty() {
        leftover.map(|batch| batch.len()).unwrap_or(0)
    } else {
        staging.stage_links(category, &outcome.links, last_stored)?.len()
    };

    Ok(DiscoveryReport { outcome, staged })
}

/// Runs a complete harvest with the given configuration
///
/// # Example
///
/// ```no_run
/// use paper_harvest::config::load_config;
/// use paper_harvest::crawler::run_harvest;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("config.toml"))?;
/// run_harvest(config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_harvest(config: Config) -> Result<RunSummary, HarvestError> {
    let coordinator = Coordinator::new(config)?;
    coordinator.run().instrument(tracing::info_span!("run")).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CategoryEntry, CrawlerConfig, FetcherConfig, LoggingConfig, OutputConfig, SiteConfig,
        UserAgentConfig,
    };
    use crate::crawler::render::{RenderError, RenderSession};
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Serves one story on page 1 of every listing, and crashes on `crashing`
    struct CrashingListing {
        crashing: &'static str,
    }

    struct CrashingSession {
        crashing: &'static str,
    }

    #[async_trait]
    impl Renderer for CrashingListing {
        async fn open_session(&self) -> Result<Box<dyn RenderSession>, RenderError> {
            Ok(Box::new(CrashingSession {
                crashing: self.crashing,
            }))
        }
    }

    #[async_trait]
    impl RenderSession for CrashingSession {
        async fn render(&mut self, url: &str, _timeout: Duration) -> Result<String, RenderError> {
            if url.contains(self.crashing) {
                panic!("render engine crashed");
            }
            let anchors = if url.ends_with("page=1") {
                r#"<a class="link-layer-imt" href="/gia-vang.htm">x</a>"#
            } else {
                ""
            };
            Ok(format!("<html><body>{}</body></html>", anchors))
        }

        async fn scroll(&mut self) -> Result<u64, RenderError> {
            Ok(0)
        }

        async fn content(&mut self) -> Result<String, RenderError> {
            Err(RenderError::NothingLoaded)
        }

        async fn close(self: Box<Self>) {}
    }

    fn create_test_config(dir: &TempDir) -> Config {
        Config {
            site: SiteConfig {
                base_url: "https://news.example.com".to_string(),
                link_selector: "a.link-layer-imt".to_string(),
                date_selector: "p.date".to_string(),
                date_format: "%d/%m/%Y, %H:%M".to_string(),
                body_selector: "div.body".to_string(),
                paragraph_selector: "p".to_string(),
                page_param: "page".to_string(),
            },
            crawler: CrawlerConfig::default(),
            fetcher: FetcherConfig::default(),
            user_agent: UserAgentConfig {
                crawler_name: "TestHarvest".to_string(),
                crawler_version: "1.0".to_string(),
                contact_url: "https://example.com".to_string(),
                contact_email: "test@example.com".to_string(),
            },
            output: OutputConfig {
                database_path: dir.path().join("news.db").to_string_lossy().into_owned(),
                staging_dir: dir.path().join("staging").to_string_lossy().into_owned(),
                archive_dir: None,
            },
            logging: LoggingConfig::default(),
            categories: vec![
                CategoryEntry {
                    id: 1,
                    url: "https://news.example.com/tai-chinh.htm".to_string(),
                },
                CategoryEntry {
                    id: 2,
                    url: "https://news.example.com/chung-khoan.htm".to_string(),
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_coordinator_seeds_categories() {
        let dir = TempDir::new().unwrap();
        let coordinator = Coordinator::new(create_test_config(&dir)).unwrap();

        let categories = coordinator.categories().unwrap();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].name(), "tai-chinh");

        // Reopening does not duplicate seeds
        drop(coordinator);
        let coordinator = Coordinator::new(create_test_config(&dir)).unwrap();
        assert_eq!(coordinator.categories().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_without_staged_links_does_nothing() {
        let dir = TempDir::new().unwrap();
        let coordinator = Coordinator::new(create_test_config(&dir)).unwrap();

        let reports = coordinator.fetch_all_staged().await.unwrap();
        assert!(reports.is_empty());
    }

    #[tokio::test]
    async fn test_crashed_category_does_not_abort_discovery() {
        let dir = TempDir::new().unwrap();
        let mut config = create_test_config(&dir);
        config.crawler.max_pages = 4;
        config.crawler.empty_streak_limit = 2;
        let renderer = Arc::new(CrashingListing {
            crashing: "chung-khoan",
        });
        let coordinator = Coordinator::with_renderer(config, renderer).unwrap();

        let reports = coordinator.discover_all().await.unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports["tai-chinh"].outcome.links.len(), 1);
        assert_eq!(
            coordinator.staging().list_link_batches().unwrap(),
            vec!["tai-chinh".to_string()]
        );
    }
}
