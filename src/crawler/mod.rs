//! Crawler module for link discovery and article fetching
//!
//! This module contains the core harvesting logic, including:
//! - The rendering engine seam and its HTTP implementation
//! - Link and content extraction from rendered markup
//! - The streak-terminated pagination crawler
//! - The bounded article fetcher
//! - Overall pipeline coordination

mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod render;

pub use coordinator::{run_harvest, Coordinator, DiscoveryReport, RunSummary};
pub use fetcher::{ContentFetcher, FailureReason, FetchFailure, FetchReport};
pub use frontier::{CrawlOutcome, FrontierCrawler, StopReason};
pub use parser::{
    parse_publish_date, ExtractedContent, SiteExtractor, UNEXTRACTABLE_BODY, UNKNOWN_TIMESTAMP,
};
pub use render::{build_http_client, HttpRenderer, RenderError, RenderSession, Renderer};
