//! Subcommand implementations and the helpers they share.

pub mod catalog;
pub mod generate;
pub mod init;
pub mod plan;
pub mod validate;
pub mod verify;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use exampaper_core::catalog::{parse_catalog, CatalogReader};
use exampaper_core::model::{DistributionPlan, ExamRequest};
use exampaper_core::Granularity;
use exampaper_providers::PaperConfig;

/// Build an exam request from command-line values.
pub fn request(subject: String, total: u32, cutoff_year: i32, topics: Option<String>) -> ExamRequest {
    ExamRequest {
        subject,
        total_questions: total,
        cutoff_year,
        topics: topics.map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect()
        }),
    }
}

/// Open the catalog at `path`, or at the configured catalog directory.
pub fn open_catalog(path: Option<PathBuf>, config: &PaperConfig) -> Result<CatalogReader> {
    let path = path.unwrap_or_else(|| config.catalog_dir.clone());
    open_catalog_path(&path)
}

pub fn open_catalog_path(path: &Path) -> Result<CatalogReader> {
    let reader = if path.is_file() {
        CatalogReader::new(vec![parse_catalog(path)?])
    } else if path.is_dir() {
        CatalogReader::from_dir(path)
    } else {
        anyhow::bail!("catalog not found: {}", path.display());
    };
    reader.with_context(|| format!("failed to open catalog {}", path.display()))
}

pub fn parse_granularity(value: Option<&str>) -> Result<Option<Granularity>> {
    match value {
        None => Ok(None),
        Some("every") => Ok(Some(Granularity::Every)),
        Some("roots") => Ok(Some(Granularity::Roots)),
        Some(other) => anyhow::bail!("unknown granularity '{other}' (expected every or roots)"),
    }
}

/// Topics that received questions, with their bucket split.
pub fn distribution_table(plan: &DistributionPlan) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Topic",
        "Weight",
        "Questions",
        "Frequent",
        "Recent",
        "Never asked",
    ]);

    for topic in plan.topics.iter().filter(|t| t.count > 0) {
        table.add_row(vec![
            Cell::new(&topic.topic_name),
            Cell::new(format!("{:.2}", topic.weight)),
            Cell::new(topic.count),
            Cell::new(topic.buckets.frequent),
            Cell::new(topic.buckets.recent),
            Cell::new(topic.buckets.never_asked),
        ]);
    }

    let totals = plan.bucket_totals();
    table.add_row(vec![
        Cell::new("Total"),
        Cell::new(""),
        Cell::new(plan.allocated()),
        Cell::new(totals.frequent),
        Cell::new(totals.recent),
        Cell::new(totals.never_asked),
    ]);
    table
}
