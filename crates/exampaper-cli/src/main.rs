//! exampaper CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use exampaper_core::ExamError;

mod commands;

#[derive(Parser)]
#[command(
    name = "exampaper",
    version,
    about = "Plan and assemble exam papers from past-question history"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan, generate and verify a full exam paper
    Generate {
        /// Subject id from the catalog
        #[arg(long)]
        subject: String,

        /// Number of questions in the paper
        #[arg(long)]
        total: u32,

        /// Ignore past questions asked after this year
        #[arg(long)]
        cutoff_year: i32,

        /// Restrict to these topics (comma-separated ids or names)
        #[arg(long)]
        topics: Option<String>,

        /// Planning units: every topic, or root topics only
        #[arg(long)]
        granularity: Option<String>,

        /// Catalog directory or file (default: catalog_dir from config)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Generator provider name (e.g. "groq", "openai", "ollama", "mock")
        #[arg(long)]
        provider: Option<String>,

        /// Model name for the provider
        #[arg(long)]
        model: Option<String>,

        /// Max concurrent generator calls
        #[arg(long)]
        parallelism: Option<usize>,

        /// Overall deadline for generation, in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Output directory (default: output_dir from config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: json, markdown, all
        #[arg(long, default_value = "all")]
        format: String,
    },

    /// Show the distribution and slots without generating anything
    Plan {
        /// Subject id from the catalog
        #[arg(long)]
        subject: String,

        /// Number of questions in the paper
        #[arg(long)]
        total: u32,

        /// Ignore past questions asked after this year
        #[arg(long)]
        cutoff_year: i32,

        /// Restrict to these topics (comma-separated ids or names)
        #[arg(long)]
        topics: Option<String>,

        /// Planning units: every topic, or root topics only
        #[arg(long)]
        granularity: Option<String>,

        /// Catalog directory or file (default: catalog_dir from config)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Verify a list of generated questions
    Verify {
        /// JSON file: a question array or a saved paper
        #[arg(long)]
        questions: PathBuf,

        /// Subject whose topic names the concepts must match
        #[arg(long)]
        subject: String,

        /// Catalog directory or file (default: catalog_dir from config)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Exit with an error if any question is invalid
        #[arg(long)]
        fail_on_invalid: bool,
    },

    /// List subjects in the catalog
    Subjects {
        /// Catalog directory or file (default: catalog_dir from config)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List a subject's topics and their history
    Topics {
        /// Subject id from the catalog
        #[arg(long)]
        subject: String,

        /// Catalog directory or file (default: catalog_dir from config)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Check catalog files for problems
    Validate {
        /// Catalog directory or file
        #[arg(long)]
        catalog: PathBuf,
    },

    /// Create a starter config and example catalog
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("exampaper=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Generate {
            subject,
            total,
            cutoff_year,
            topics,
            granularity,
            catalog,
            config,
            provider,
            model,
            parallelism,
            timeout_secs,
            output,
            format,
        } => {
            commands::generate::execute(commands::generate::GenerateArgs {
                request: commands::request(subject, total, cutoff_year, topics),
                granularity,
                catalog,
                config,
                provider,
                model,
                parallelism,
                timeout_secs,
                output,
                format,
            })
            .await
        }
        Commands::Plan {
            subject,
            total,
            cutoff_year,
            topics,
            granularity,
            catalog,
            config,
            format,
        } => {
            commands::plan::execute(
                commands::request(subject, total, cutoff_year, topics),
                granularity,
                catalog,
                config,
                format,
            )
            .await
        }
        Commands::Verify {
            questions,
            subject,
            catalog,
            config,
            format,
            fail_on_invalid,
        } => {
            commands::verify::execute(questions, subject, catalog, config, format, fail_on_invalid)
                .await
        }
        Commands::Subjects { catalog, config } => {
            commands::catalog::subjects(catalog, config).await
        }
        Commands::Topics {
            subject,
            catalog,
            config,
        } => commands::catalog::topics(subject, catalog, config).await,
        Commands::Validate { catalog } => commands::validate::execute(catalog),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        let client_error = e
            .downcast_ref::<ExamError>()
            .is_some_and(ExamError::is_client_error);
        process::exit(if client_error { 2 } else { 1 });
    }
}
