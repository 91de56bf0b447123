//! The `exampaper init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("exampaper.toml").exists() {
        println!("exampaper.toml already exists, skipping.");
    } else {
        std::fs::write("exampaper.toml", SAMPLE_CONFIG)?;
        println!("Created exampaper.toml");
    }

    std::fs::create_dir_all("catalog")?;
    let example_path = Path::new("catalog/example.toml");
    if example_path.exists() {
        println!("catalog/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_CATALOG)?;
        println!("Created catalog/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Set EXAMPAPER_GROQ_KEY, or edit the providers in exampaper.toml");
    println!("  2. Run: exampaper plan --subject EE --total 10 --cutoff-year 2022");
    println!("  3. Run: exampaper generate --subject EE --total 10 --cutoff-year 2022");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# exampaper configuration

default_provider = "groq"
default_model = "llama-3.3-70b-versatile"
temperature = 0.35
max_tokens = 220
parallelism = 4
max_retries = 3
retry_delay_ms = 1000
regeneration_rounds = 2
catalog_dir = "./catalog"
output_dir = "./exampaper-output"
granularity = "every"

[providers.groq]
type = "openai"
api_key = "${GROQ_API_KEY}"
base_url = "https://api.groq.com/openai"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"

[weights]
frequency_coefficient = 1.0
recency_coefficient = 2.0
never_asked_coefficient = 1.0
never_asked_bonus = 1.0
recency_half_life_years = 3.0
frequent_threshold = 1
recent_window_years = 3

[planner.bucket_ratio]
frequent = 0.5
recent = 0.3
never_asked = 0.2

[difficulty_mix]
easy = 0.3
medium = 0.5
hard = 0.2

[verifier]
forbidden_phrases = ["solution:", "answer:"]
reject_multi_part = false
"#;

const EXAMPLE_CATALOG: &str = r#"[subject]
id = "EE"
name = "Electrical Engineering"

[[topics]]
id = "circuits"
name = "Electric Circuits"

[[topics]]
id = "network-theorems"
name = "Network Theorems"
parent = "circuits"

[[topics]]
id = "machines"
name = "Electrical Machines"

[[topics]]
id = "control"
name = "Control Systems"

[[pyqs]]
id = "ee-2017-11"
topic = "network-theorems"
year = 2017
difficulty = "medium"
occurrences = 2
text = "Find the Thevenin equivalent across terminals a-b of the given bridge network."

[[pyqs]]
id = "ee-2019-14"
topic = "network-theorems"
year = 2019
difficulty = "medium"

[[pyqs]]
id = "ee-2020-03"
topic = "machines"
year = 2020
difficulty = "easy"
occurrences = 3

[[pyqs]]
id = "ee-2012-08"
topic = "machines"
year = 2012
difficulty = "hard"
"#;
