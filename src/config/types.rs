use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Paper-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub categories: Vec<CategoryEntry>,
}

/// Site structure: where links, dates and bodies live in the markup
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Base URL used to resolve relative article links
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Anchor selector matching article links on category pages
    #[serde(rename = "link-selector")]
    pub link_selector: String,

    /// Selector for the element holding the publish date
    #[serde(rename = "date-selector")]
    pub date_selector: String,

    /// chrono format string of the publish date text
    #[serde(rename = "date-format", default = "default_date_format")]
    pub date_format: String,

    /// Selector for the article body container
    #[serde(rename = "body-selector")]
    pub body_selector: String,

    /// Selector for paragraphs inside the body container
    #[serde(rename = "paragraph-selector", default = "default_paragraph_selector")]
    pub paragraph_selector: String,

    /// Query parameter carrying the page number on category pages
    #[serde(rename = "page-param", default = "default_page_param")]
    pub page_param: String,
}

/// Pagination crawler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Upper bound on category pages visited per run
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Consecutive pages without new links before a category is considered exhausted
    #[serde(rename = "empty-streak-limit", default = "default_empty_streak_limit")]
    pub empty_streak_limit: u32,

    /// Maximum number of categories crawled concurrently
    #[serde(rename = "max-category-workers", default = "default_workers")]
    pub max_category_workers: u32,

    /// Navigation timeout for a single category page (milliseconds)
    #[serde(rename = "page-timeout-ms", default = "default_timeout_ms")]
    pub page_timeout_ms: u64,
}

impl CrawlerConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_millis(self.page_timeout_ms)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            empty_streak_limit: default_empty_streak_limit(),
            max_category_workers: default_workers(),
            page_timeout_ms: default_timeout_ms(),
        }
    }
}

/// Article fetcher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Size of the article worker pool
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Navigation timeout for a single article (milliseconds)
    #[serde(rename = "navigation-timeout-ms", default = "default_timeout_ms")]
    pub navigation_timeout_ms: u64,

    /// Maximum scroll iterations used to trigger lazy-loaded content
    #[serde(rename = "max-scrolls", default = "default_max_scrolls")]
    pub max_scrolls: u32,

    /// Pause between scroll iterations (milliseconds)
    #[serde(rename = "scroll-pause-ms", default = "default_scroll_pause_ms")]
    pub scroll_pause_ms: u64,

    /// Final pause after scrolling, before extraction (milliseconds)
    #[serde(rename = "settle-ms", default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl FetcherConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            navigation_timeout_ms: default_timeout_ms(),
            max_scrolls: default_max_scrolls(),
            scroll_pause_ms: default_scroll_pause_ms(),
            settle_ms: default_settle_ms(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Root of the staging area shared by crawler, fetcher and merge
    #[serde(rename = "staging-dir")]
    pub staging_dir: String,

    /// Where merged article bodies are copied, if anywhere
    #[serde(rename = "archive-dir", default)]
    pub archive_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Append-mode log file, in addition to stderr
    #[serde(default)]
    pub file: Option<String>,
}

/// Category seed entry, inserted into the store if absent
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryEntry {
    pub id: i64,
    pub url: String,
}

fn default_date_format() -> String {
    "%d/%m/%Y, %H:%M".to_string()
}

fn default_paragraph_selector() -> String {
    "p".to_string()
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_max_pages() -> u32 {
    200
}

fn default_empty_streak_limit() -> u32 {
    5
}

fn default_workers() -> u32 {
    20
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_scrolls() -> u32 {
    20
}

fn default_scroll_pause_ms() -> u64 {
    300
}

fn default_settle_ms() -> u64 {
    500
}
