//! The `exampaper plan` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};
use serde::Serialize;

use exampaper_core::engine::{plan_exam, PlannedExam};
use exampaper_core::model::{DistributionPlan, ExamRequest, Slot, Subject, TopicWeight};
use exampaper_providers::load_config_from;

use super::{distribution_table, open_catalog, parse_granularity};

#[derive(Serialize)]
struct PlanOutput<'a> {
    subject: &'a Subject,
    cutoff_year: i32,
    weights: &'a [TopicWeight],
    distribution: &'a DistributionPlan,
    slots: &'a [Slot],
}

pub async fn execute(
    request: ExamRequest,
    granularity: Option<String>,
    catalog: Option<PathBuf>,
    config_path: Option<PathBuf>,
    format: String,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let reader = open_catalog(catalog, &config)?;

    let mut engine_config = config.engine_config();
    if let Some(g) = parse_granularity(granularity.as_deref())? {
        engine_config.granularity = g;
    }
    engine_config.validate()?;

    let planned = plan_exam(&reader, &request, &engine_config).await?;

    match format.as_str() {
        "json" => {
            let output = PlanOutput {
                subject: &planned.subject,
                cutoff_year: request.cutoff_year,
                weights: &planned.weights,
                distribution: &planned.plan,
                slots: &planned.slots,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        "text" => print_plan(&planned),
        other => anyhow::bail!("unknown format '{other}' (expected text or json)"),
    }

    Ok(())
}

fn print_plan(planned: &PlannedExam) {
    println!(
        "{} ({}): {} questions, cutoff {}",
        planned.subject.name,
        planned.subject.id,
        planned.plan.total_questions,
        planned.request.cutoff_year
    );
    println!("\n{}", distribution_table(&planned.plan));

    let mut table = Table::new();
    table.set_header(vec!["#", "Topic", "Bucket", "Difficulty", "Seed"]);
    for slot in &planned.slots {
        let seed = match slot.seed_record() {
            Some(record) => format!("{} ({})", record.id, record.year),
            None => "synthesize".to_string(),
        };
        table.add_row(vec![
            Cell::new(slot.index + 1),
            Cell::new(&slot.topic_name),
            Cell::new(slot.bucket),
            Cell::new(slot.difficulty),
            Cell::new(seed),
        ]);
    }
    println!("\n{table}");
}
