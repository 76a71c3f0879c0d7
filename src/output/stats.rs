//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the storage layer and the staging area.

use crate::staging::StagingArea;
use crate::storage::{Storage, TableSummary};
use crate::HarvestError;

/// Row counts of one category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryStatistics {
    pub id: i64,
    pub name: String,
    pub url: String,

    /// Links stored in the database
    pub links: u64,

    /// Articles stored in the database
    pub contents: u64,

    /// Links staged but not merged yet
    pub staged_links: usize,
}

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    pub categories: Vec<CategoryStatistics>,

    pub total_links: u64,

    pub total_contents: u64,

    /// Shape and size of every table
    pub tables: Vec<TableSummary>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `staging` - Staging area to count pending links in, if any
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(
    storage: &dyn Storage,
    staging: Option<&StagingArea>,
) -> Result<HarvestStatistics, HarvestError> {
    let mut categories = Vec::new();

    for category in storage.list_categories()? {
        let name = category.name();
        let staged_links = match staging {
            Some(staging) => staging
                .read_link_batch(&name)?
                .map(|batch| batch.len())
                .unwrap_or(0),
            None => 0,
        };

        categories.push(CategoryStatistics {
            id: category.id,
            links: storage.count_links(Some(category.id))?,
            contents: storage.count_contents(Some(category.id))?,
            staged_links,
            url: category.url,
            name,
        });
    }

    Ok(HarvestStatistics {
        categories,
        total_links: storage.count_links(None)?,
        total_contents: storage.count_contents(None)?,
        tables: storage.table_summaries()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Categories: {}", stats.categories.len());
    println!("  Total links stored: {}", stats.total_links);
    println!("  Total articles stored: {}", stats.total_contents);
    println!();

    println!("By Category:");
    for category in &stats.categories {
        let coverage = if category.links > 0 {
            (category.contents as f64 / category.links as f64) * 100.0
        } else {
            0.0
        };
        print!(
            "  [{}] {}: {} links, {} articles ({:.1}%)",
            category.id, category.name, category.links, category.contents, coverage
        );
        if category.staged_links > 0 {
            print!(", {} staged", category.staged_links);
        }
        println!();
    }
    println!();

    println!("Tables:");
    for table in &stats.tables {
        println!("  {} ({} rows)", table.name, table.rows);
        println!("    columns: {}", table.columns.join(", "));
    }
}
