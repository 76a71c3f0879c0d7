//! Output module for harvest summaries and reports
//!
//! This module handles:
//! - Printing the summary of a pipeline run
//! - Loading and printing database statistics

pub mod stats;

pub use stats::{load_statistics, print_statistics, CategoryStatistics, HarvestStatistics};

use crate::crawler::{FailureReason, RunSummary, StopReason};
use crate::merge::MergeSummary;

/// Prints the outcome of a pipeline run to stdout
pub fn print_run_summary(summary: &RunSummary) {
    println!("=== Harvest Summary ===\n");

    if !summary.discovered.is_empty() {
        println!("Discovery:");
        for (name, report) in &summary.discovered {
            let stop = match report.outcome.stop_reason {
                StopReason::EmptyStreak => "empty streak",
                StopReason::PageCap => "page cap",
            };
            println!(
                "  {}: {} new links in {} pages ({} failed, stopped on {})",
                name,
                report.outcome.links.len(),
                report.outcome.pages_visited,
                report.outcome.pages_failed,
                stop
            );
        }
        println!();
    }

    if !summary.fetched.is_empty() {
        println!("Fetching:");
        for (name, report) in &summary.fetched {
            println!(
                "  {}: {} fetched, {} failed, {} already staged",
                name, report.success_count, report.failure_count, report.skipped
            );
            let timeouts = report
                .failures
                .iter()
                .filter(|f| f.reason == FailureReason::Timeout)
                .count();
            if timeouts > 0 {
                println!("    {} timeouts", timeouts);
            }
        }
        println!();
    }

    print_merge_summary("Links", &summary.links);
    print_merge_summary("Contents", &summary.contents);
}

/// Prints one merge summary block
pub fn print_merge_summary(label: &str, summary: &MergeSummary) {
    let totals = summary.totals();
    println!(
        "{} merged: {} inserted, {} duplicates skipped",
        label, totals.inserted, totals.skipped
    );
    for name in &summary.unresolved {
        println!("  ! {}: no matching category, left in staging", name);
    }
    for name in &summary.failed {
        println!("  ! {}: merge failed, left in staging", name);
    }
}
