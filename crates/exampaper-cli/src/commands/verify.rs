//! The `exampaper verify` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use exampaper_core::model::GeneratedQuestion;
use exampaper_core::report::ExamPaper;
use exampaper_core::traits::TopicGraphReader;
use exampaper_core::verifier::{VerificationReport, Verifier};
use exampaper_core::ExamError;
use exampaper_providers::load_config_from;

use super::open_catalog;

/// Either a bare question array or a saved paper.
#[derive(Deserialize)]
#[serde(untagged)]
enum QuestionsFile {
    List(Vec<GeneratedQuestion>),
    Paper(Box<ExamPaper>),
}

fn read_questions(path: &Path) -> Result<Vec<GeneratedQuestion>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: QuestionsFile = serde_json::from_str(&content).with_context(|| {
        format!(
            "{} is neither a question list nor a saved paper",
            path.display()
        )
    })?;
    Ok(match parsed {
        QuestionsFile::List(questions) => questions,
        QuestionsFile::Paper(paper) => paper.questions.into_iter().map(|q| q.question).collect(),
    })
}

pub async fn execute(
    questions_path: PathBuf,
    subject: String,
    catalog: Option<PathBuf>,
    config_path: Option<PathBuf>,
    format: String,
    fail_on_invalid: bool,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let reader = open_catalog(catalog, &config)?;

    let topics = reader.list_topics(&subject).await?;
    if topics.is_empty() {
        return Err(ExamError::invalid(format!("subject '{subject}' has no topics")).into());
    }

    let questions = read_questions(&questions_path)?;
    let verifier = Verifier::new(topics.into_iter().map(|t| t.name), config.verifier.clone());
    let report = VerificationReport::run(&verifier, &questions);

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        "text" => {
            for (n, entry) in report.results.iter().enumerate() {
                match &entry.result.reason {
                    None => println!("  {:>3}. OK      {}", n + 1, entry.question.concept),
                    Some(reason) => println!(
                        "  {:>3}. INVALID {}: {reason}",
                        n + 1,
                        entry.question.concept
                    ),
                }
            }
            println!(
                "\n{} question(s): {} valid, {} invalid",
                report.total, report.valid, report.invalid
            );
        }
        other => anyhow::bail!("unknown format '{other}' (expected text or json)"),
    }

    if fail_on_invalid && report.invalid > 0 {
        anyhow::bail!("{} invalid question(s)", report.invalid);
    }

    Ok(())
}
