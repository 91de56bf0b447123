//! TOML subject catalog.
//!
//! One file per subject: a `[subject]` header, `[[topics]]` and `[[pyqs]]`.
//! Catalog directories are loaded into a [`CatalogReader`], the file-backed
//! topic graph reader used by the CLI.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::model::{Difficulty, PyqRecord, Subject, Topic};
use crate::traits::TopicGraphReader;

/// Intermediate TOML structure for parsing catalog files.
#[derive(Debug, Deserialize)]
struct TomlCatalogFile {
    subject: TomlSubject,
    #[serde(default)]
    topics: Vec<TomlTopic>,
    #[serde(default)]
    pyqs: Vec<TomlPyq>,
}

#[derive(Debug, Deserialize)]
struct TomlSubject {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TomlTopic {
    id: String,
    name: String,
    #[serde(default)]
    parent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TomlPyq {
    id: String,
    topic: String,
    year: i32,
    #[serde(default = "default_difficulty")]
    difficulty: String,
    #[serde(default = "default_occurrences")]
    occurrences: u32,
    #[serde(default)]
    text: Option<String>,
}

fn default_difficulty() -> String {
    "medium".to_string()
}

fn default_occurrences() -> u32 {
    1
}

/// One subject's topics and PYQ history, as loaded from a catalog file.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectCatalog {
    pub subject: Subject,
    pub topics: Vec<Topic>,
    pub pyqs: Vec<PyqRecord>,
    /// File the catalog was read from, if any.
    pub source: Option<PathBuf>,
}

/// Parse a single catalog file.
pub fn parse_catalog(path: &Path) -> Result<SubjectCatalog> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog file: {}", path.display()))?;

    parse_catalog_str(&content, path)
}

/// Parse catalog TOML from a string (useful for testing).
pub fn parse_catalog_str(content: &str, source_path: &Path) -> Result<SubjectCatalog> {
    let parsed: TomlCatalogFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let subject_id = parsed.subject.id;
    let topics = parsed
        .topics
        .into_iter()
        .map(|t| Topic {
            id: t.id,
            name: t.name,
            parent: t.parent,
            subject: subject_id.clone(),
        })
        .collect();

    let pyqs = parsed
        .pyqs
        .into_iter()
        .map(|p| {
            let difficulty: Difficulty = p
                .difficulty
                .parse()
                .map_err(|e: String| anyhow::anyhow!("pyq '{}': {}", p.id, e))?;
            Ok(PyqRecord {
                id: p.id,
                topic_id: p.topic,
                year: p.year,
                difficulty,
                occurrences: p.occurrences,
                text: p.text,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(SubjectCatalog {
        subject: Subject {
            id: subject_id,
            name: parsed.subject.name,
        },
        topics,
        pyqs,
        source: Some(source_path.to_path_buf()),
    })
}

/// Recursively load every `.toml` catalog under `dir`, in path order.
///
/// Files that fail to parse are skipped with a warning.
pub fn load_catalog_directory(dir: &Path) -> Result<Vec<SubjectCatalog>> {
    let mut catalogs = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut paths = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    paths.sort();

    for path in paths {
        if path.is_dir() {
            catalogs.extend(load_catalog_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_catalog(&path) {
                Ok(catalog) => catalogs.push(catalog),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(catalogs)
}

/// A warning from catalog validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    /// The topic or record id (if applicable).
    pub item_id: Option<String>,
    pub message: String,
}

impl ValidationWarning {
    fn new(item_id: &str, message: impl Into<String>) -> Self {
        Self {
            item_id: Some(item_id.to_string()),
            message: message.into(),
        }
    }
}

/// Lint a catalog for issues that would fail or skew planning.
pub fn validate_catalog(catalog: &SubjectCatalog) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if catalog.subject.name.trim().is_empty() {
        warnings.push(ValidationWarning {
            item_id: Some(catalog.subject.id.clone()),
            message: "subject name is empty".into(),
        });
    }
    if catalog.topics.is_empty() {
        warnings.push(ValidationWarning {
            item_id: None,
            message: "catalog has no topics".into(),
        });
    }

    let mut topic_ids = HashSet::new();
    for topic in &catalog.topics {
        if !topic_ids.insert(topic.id.as_str()) {
            warnings.push(ValidationWarning::new(
                &topic.id,
                format!("duplicate topic ID: {}", topic.id),
            ));
        }
        if topic.name.trim().is_empty() {
            warnings.push(ValidationWarning::new(&topic.id, "topic name is empty"));
        }
    }

    let mut names = HashSet::new();
    for topic in &catalog.topics {
        if !topic.name.trim().is_empty() && !names.insert(topic.name.as_str()) {
            warnings.push(ValidationWarning::new(
                &topic.id,
                format!("duplicate topic name: {}", topic.name),
            ));
        }
    }

    for topic in &catalog.topics {
        if let Some(parent) = &topic.parent {
            if !topic_ids.contains(parent.as_str()) {
                warnings.push(ValidationWarning::new(
                    &topic.id,
                    format!("unknown parent topic: {parent}"),
                ));
            }
        }
    }

    let mut pyq_ids = HashSet::new();
    for pyq in &catalog.pyqs {
        if !pyq_ids.insert(pyq.id.as_str()) {
            warnings.push(ValidationWarning::new(
                &pyq.id,
                format!("duplicate pyq ID: {}", pyq.id),
            ));
        }
        if !topic_ids.contains(pyq.topic_id.as_str()) {
            warnings.push(ValidationWarning::new(
                &pyq.id,
                format!("references unknown topic: {}", pyq.topic_id),
            ));
        }
        if pyq.occurrences == 0 {
            warnings.push(ValidationWarning::new(&pyq.id, "occurrences must be at least 1"));
        }
    }

    warnings
}

// ---------------------------------------------------------------------------
// File-backed reader
// ---------------------------------------------------------------------------

/// In-memory topic graph reader over loaded catalogs.
///
/// Subjects are listed by id, topics in file order, and records by
/// (year, id). Records are looked up by topic id alone, so topic ids must be
/// unique across all loaded subjects.
#[derive(Debug, Clone, Default)]
pub struct CatalogReader {
    subjects: Vec<Subject>,
    topics: HashMap<String, Vec<Topic>>,
    records: HashMap<String, Vec<PyqRecord>>,
}

impl CatalogReader {
    /// Build a reader from parsed catalogs. Two catalogs for the same
    /// subject id, or two subjects sharing a topic id, are rejected.
    pub fn new(catalogs: Vec<SubjectCatalog>) -> Result<Self> {
        let mut reader = Self::default();
        let mut owner: HashMap<String, String> = HashMap::new();

        for catalog in catalogs {
            let subject_id = catalog.subject.id.clone();
            if reader.topics.contains_key(&subject_id) {
                anyhow::bail!("subject '{subject_id}' is defined by more than one catalog");
            }

            for topic in &catalog.topics {
                if let Some(previous) = owner.insert(topic.id.clone(), subject_id.clone()) {
                    if previous != subject_id {
                        anyhow::bail!(
                            "topic id '{}' is used by both subject '{previous}' and subject '{subject_id}'",
                            topic.id
                        );
                    }
                }
            }
            let own: HashSet<&str> = catalog.topics.iter().map(|t| t.id.as_str()).collect();
            for record in catalog.pyqs {
                if !own.contains(record.topic_id.as_str()) {
                    tracing::warn!(
                        record = %record.id,
                        "skipping record for topic '{}' outside subject '{subject_id}'",
                        record.topic_id
                    );
                    continue;
                }
                reader
                    .records
                    .entry(record.topic_id.clone())
                    .or_default()
                    .push(record);
            }
            reader.topics.insert(subject_id, catalog.topics);
            reader.subjects.push(catalog.subject);
        }

        reader.subjects.sort_by(|a, b| a.id.cmp(&b.id));
        for records in reader.records.values_mut() {
            records.sort_by(|a, b| a.year.cmp(&b.year).then_with(|| a.id.cmp(&b.id)));
        }
        Ok(reader)
    }

    /// Load and index every catalog under `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let catalogs = load_catalog_directory(dir)?;
        if catalogs.is_empty() {
            anyhow::bail!("no catalog files found in {}", dir.display());
        }
        Self::new(catalogs)
    }

    pub fn subject(&self, id: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.id == id)
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }
}

#[async_trait]
impl TopicGraphReader for CatalogReader {
    async fn list_subjects(&self) -> anyhow::Result<Vec<Subject>> {
        Ok(self.subjects.clone())
    }

    async fn list_topics(&self, subject_id: &str) -> anyhow::Result<Vec<Topic>> {
        Ok(self.topics.get(subject_id).cloned().unwrap_or_default())
    }

    async fn list_pyq_records(
        &self,
        topic_id: &str,
        up_to_year: i32,
    ) -> anyhow::Result<Vec<PyqRecord>> {
        Ok(self
            .records
            .get(topic_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.year <= up_to_year)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
