//! The `exampaper subjects` and `exampaper topics` commands.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use exampaper_core::traits::TopicGraphReader;
use exampaper_core::ExamError;
use exampaper_providers::load_config_from;

use super::open_catalog;

pub async fn subjects(catalog: Option<PathBuf>, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let reader = open_catalog(catalog, &config)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Topics", "PYQs"]);
    for subject in reader.list_subjects().await? {
        let topics = reader.list_topics(&subject.id).await?;
        let mut pyqs = 0;
        for topic in &topics {
            pyqs += reader.list_pyq_records(&topic.id, i32::MAX).await?.len();
        }
        table.add_row(vec![
            Cell::new(&subject.id),
            Cell::new(&subject.name),
            Cell::new(topics.len()),
            Cell::new(pyqs),
        ]);
    }

    println!("{table}");
    Ok(())
}

pub async fn topics(
    subject: String,
    catalog: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let reader = open_catalog(catalog, &config)?;

    let topics = reader.list_topics(&subject).await?;
    if topics.is_empty() {
        return Err(ExamError::invalid(format!("subject '{subject}' has no topics")).into());
    }
    let names: HashMap<&str, &str> = topics
        .iter()
        .map(|t| (t.id.as_str(), t.name.as_str()))
        .collect();

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Parent", "PYQs", "Asked", "Last asked"]);
    for topic in &topics {
        let records = reader.list_pyq_records(&topic.id, i32::MAX).await?;
        let asked: u32 = records.iter().map(|r| r.occurrences).sum();
        let last = records
            .iter()
            .map(|r| r.year)
            .max()
            .map(|y| y.to_string())
            .unwrap_or_else(|| "never".to_string());
        let parent = topic
            .parent
            .as_deref()
            .map(|p| names.get(p).copied().unwrap_or(p))
            .unwrap_or("");
        table.add_row(vec![
            Cell::new(&topic.id),
            Cell::new(&topic.name),
            Cell::new(parent),
            Cell::new(records.len()),
            Cell::new(asked),
            Cell::new(last),
        ]);
    }

    println!("{table}");
    Ok(())
}
