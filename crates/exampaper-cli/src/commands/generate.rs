//! The `exampaper generate` command.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use exampaper_core::model::{DistributionPlan, ExamRequest, Slot};
use exampaper_core::report::ExamPaper;
use exampaper_core::{ExamEngine, ProgressReporter};
use exampaper_providers::{create_generator, load_config_from};

use super::{distribution_table, open_catalog, parse_granularity};

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_plan_ready(&self, plan: &DistributionPlan, slots: usize) {
        let topics = plan.topics.iter().filter(|t| t.count > 0).count();
        eprintln!("  Planned {slots} slots across {topics} topics");
    }

    fn on_slot_complete(&self, slot: &Slot, completed: usize, total: usize) {
        eprintln!(
            "  [{completed}/{total}] {} :: {} ({})",
            slot.topic_name, slot.difficulty, slot.bucket
        );
    }

    fn on_slot_error(&self, slot: &Slot, error: &str) {
        eprintln!("  ERROR: slot {} ({}): {error}", slot.index + 1, slot.topic_name);
    }

    fn on_regeneration(&self, round: u32, slots: usize) {
        eprintln!("  Regenerating {slots} invalid question(s), round {round}");
    }

    fn on_paper_complete(&self, generated: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {generated} generated, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

/// Options for `exampaper generate`.
pub struct GenerateArgs {
    pub request: ExamRequest,
    pub granularity: Option<String>,
    pub catalog: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub parallelism: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub output: Option<PathBuf>,
    pub format: String,
}

pub async fn execute(args: GenerateArgs) -> Result<()> {
    let formats: Vec<&str> = match args.format.as_str() {
        "all" => vec!["json", "markdown"],
        "json" => vec!["json"],
        "markdown" | "md" => vec!["markdown"],
        other => anyhow::bail!("unknown format '{other}' (expected json, markdown or all)"),
    };

    let config = load_config_from(args.config.as_deref())?;
    let reader = open_catalog(args.catalog, &config)?;

    let provider_name = args
        .provider
        .unwrap_or_else(|| config.default_provider.clone());
    let provider_config = config.provider(&provider_name)?;
    let generator = create_generator(
        &provider_name,
        &provider_config,
        config.generation_settings(args.model.as_deref()),
    )?;

    let mut engine_config = config.engine_config();
    if let Some(parallelism) = args.parallelism {
        engine_config.parallelism = parallelism;
    }
    if let Some(secs) = args.timeout_secs {
        engine_config.request_timeout = Some(Duration::from_secs(secs));
    }
    if let Some(g) = parse_granularity(args.granularity.as_deref())? {
        engine_config.granularity = g;
    }

    eprintln!(
        "exampaper v{}: {} questions for {} (cutoff {}) via {}",
        env!("CARGO_PKG_VERSION"),
        args.request.total_questions,
        args.request.subject,
        args.request.cutoff_year,
        generator.name()
    );

    let engine = ExamEngine::new(Arc::new(reader), Arc::from(generator), engine_config);
    let paper = engine.generate(&args.request, &ConsoleReporter).await?;

    println!("\n{}", distribution_table(&paper.distribution));
    println!(
        "Questions: {}/{} generated, {} valid, {} invalid",
        paper.questions.len(),
        paper.total_requested,
        paper.verification.valid,
        paper.verification.invalid
    );
    if !paper.is_complete() {
        eprintln!("Warning: {} question(s) missing", paper.missing);
    }

    let output = args.output.unwrap_or_else(|| config.output_dir.clone());
    save(&paper, &output, &formats)
}

fn save(paper: &ExamPaper, output: &Path, formats: &[&str]) -> Result<()> {
    std::fs::create_dir_all(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    let timestamp = paper.created_at.format("%Y-%m-%dT%H%M%S");
    let stem = format!("paper-{}-{timestamp}", paper.subject.id);

    for fmt in formats {
        match *fmt {
            "json" => {
                let path = output.join(format!("{stem}.json"));
                paper.save_json(&path)?;
                eprintln!("Paper saved to: {}", path.display());
            }
            "markdown" => {
                let path = output.join(format!("{stem}.md"));
                std::fs::write(&path, paper.to_markdown())
                    .with_context(|| format!("failed to write {}", path.display()))?;
                eprintln!("Markdown paper: {}", path.display());
            }
            _ => {}
        }
    }

    Ok(())
}
