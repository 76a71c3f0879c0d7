use crate::config::types::{
    CategoryEntry, Config, CrawlerConfig, FetcherConfig, OutputConfig, SiteConfig,
    UserAgentConfig,
};
use crate::url::category_name;
use crate::ConfigError;
use scraper::Selector;
use std::collections::{HashMap, HashSet};
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_crawler_config(&config.crawler)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_categories(&config.categories)?;
    Ok(())
}

/// Validates site structure configuration
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    for selector in [
        &config.link_selector,
        &config.date_selector,
        &config.body_selector,
        &config.paragraph_selector,
    ] {
        validate_selector(selector)?;
    }

    if config.date_format.is_empty() {
        return Err(ConfigError::Validation(
            "date_format cannot be empty".to_string(),
        ));
    }

    if config.page_param.is_empty() {
        return Err(ConfigError::Validation(
            "page_param cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Parses a selector once so bad site configuration fails at startup
pub(crate) fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector {
            selector: selector.to_string(),
            message: format!("{:?}", e),
        })
}

/// Validates pagination crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.empty_streak_limit < 1 {
        return Err(ConfigError::Validation(format!(
            "empty_streak_limit must be >= 1, got {}",
            config.empty_streak_limit
        )));
    }

    validate_worker_count("max_category_workers", config.max_category_workers)?;
    validate_timeout("page_timeout_ms", config.page_timeout_ms)?;

    Ok(())
}

/// Validates article fetcher configuration
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    validate_worker_count("workers", config.workers)?;
    validate_timeout("navigation_timeout_ms", config.navigation_timeout_ms)?;
    Ok(())
}

fn validate_worker_count(name: &str, value: u32) -> Result<(), ConfigError> {
    if !(1..=100).contains(&value) {
        return Err(ConfigError::Validation(format!(
            "{} must be between 1 and 100, got {}",
            name, value
        )));
    }
    Ok(())
}

fn validate_timeout(name: &str, value: u64) -> Result<(), ConfigError> {
    if value < 100 {
        return Err(ConfigError::Validation(format!(
            "{} must be >= 100ms, got {}ms",
            name, value
        )));
    }
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.staging_dir.is_empty() {
        return Err(ConfigError::Validation(
            "staging_dir cannot be empty".to_string(),
        ));
    }

    if matches!(config.archive_dir.as_deref(), Some("")) {
        return Err(ConfigError::Validation(
            "archive_dir cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates category seed entries
/// Category ids must be unique, and so must the names derived from their
/// URLs, since staged batches are keyed by name
fn validate_categories(categories: &[CategoryEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    let mut names = HashMap::new();
    for entry in categories {
        if !seen.insert(entry.id) {
            return Err(ConfigError::Validation(format!(
                "Duplicate category id {}",
                entry.id
            )));
        }

        Url::parse(&entry.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid category URL '{}': {}", entry.url, e))
        })?;

        let name = category_name(&entry.url);
        if let Some(other) = names.insert(name.clone(), entry.id) {
            return Err(ConfigError::Validation(format!(
                "Categories {} and {} share the name '{}'",
                other, entry.id, name
            )));
        }
    }
    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
