//! Assembled exam paper with JSON persistence and markdown rendering.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Bucket, Difficulty, DistributionPlan, GeneratedQuestion, Subject};
use crate::verifier::VerificationReport;

/// A complete exam paper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamPaper {
    /// Unique paper identifier.
    pub id: Uuid,
    /// When the paper was assembled.
    pub created_at: DateTime<Utc>,
    pub subject: Subject,
    pub cutoff_year: i32,
    /// Number of questions the request asked for.
    pub total_requested: u32,
    /// The plan exactly as the planner produced it.
    pub distribution: DistributionPlan,
    /// Generated questions in slot order.
    pub questions: Vec<PaperQuestion>,
    /// Slots whose generation failed or timed out.
    #[serde(default)]
    pub failed: Vec<FailedSlot>,
    /// `total_requested - questions.len()`.
    pub missing: usize,
    /// Verdicts for `questions`, same order.
    pub verification: VerificationReport,
    /// Regeneration rounds actually run.
    #[serde(default)]
    pub regeneration_rounds: u32,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// One generated question and the slot it fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperQuestion {
    pub slot_index: usize,
    pub topic_id: String,
    pub bucket: Bucket,
    /// Difficulty the slot asked for.
    pub target_difficulty: Difficulty,
    /// PYQ record the slot paraphrases, `None` when synthesized.
    #[serde(default)]
    pub seed_id: Option<String>,
    #[serde(flatten)]
    pub question: GeneratedQuestion,
}

/// A slot that ended without a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedSlot {
    pub slot_index: usize,
    pub topic_id: String,
    pub topic_name: String,
    pub bucket: Bucket,
    pub reason: String,
}

impl ExamPaper {
    /// `true` when every requested question was generated.
    pub fn is_complete(&self) -> bool {
        self.missing == 0
    }

    /// Questions that passed verification.
    pub fn valid_questions(&self) -> impl Iterator<Item = &PaperQuestion> {
        self.questions
            .iter()
            .zip(&self.verification.results)
            .filter(|(_, v)| v.result.valid)
            .map(|(q, _)| q)
    }

    /// Save the paper as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize paper")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write paper to {}", path.display()))?;
        Ok(())
    }

    /// Load a paper from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read paper from {}", path.display()))?;
        let paper: ExamPaper =
            serde_json::from_str(&content).context("failed to parse paper JSON")?;
        Ok(paper)
    }

    /// Format the paper as markdown: questions first, then the distribution
    /// and anything that went wrong.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "# {} ({})\n\n",
            self.subject.name, self.subject.id
        ));
        md.push_str(&format!(
            "**Questions:** {}/{} | **Cutoff year:** {} | **Generated:** {}\n\n",
            self.questions.len(),
            self.total_requested,
            self.cutoff_year,
            self.created_at.format("%Y-%m-%d %H:%M UTC"),
        ));

        md.push_str("## Questions\n\n");
        for (n, q) in self.questions.iter().enumerate() {
            md.push_str(&format!(
                "{}. **[{} | {}]** {}\n",
                n + 1,
                q.question.concept,
                q.question.difficulty,
                q.question.question.trim()
            ));
        }
        md.push('\n');

        md.push_str("## Distribution\n\n");
        md.push_str("| Topic | Weight | Questions | Frequent | Recent | Never asked |\n");
        md.push_str("|-------|--------|-----------|----------|--------|-------------|\n");
        for t in self.distribution.topics.iter().filter(|t| t.count > 0) {
            md.push_str(&format!(
                "| {} | {:.2} | {} | {} | {} | {} |\n",
                t.topic_name,
                t.weight,
                t.count,
                t.buckets.frequent,
                t.buckets.recent,
                t.buckets.never_asked
            ));
        }
        md.push('\n');

        let invalid: Vec<_> = self
            .verification
            .results
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.result.valid)
            .collect();
        if !invalid.is_empty() {
            md.push_str("## Verification issues\n\n");
            for (n, v) in invalid {
                md.push_str(&format!(
                    "- Question {}: {}\n",
                    n + 1,
                    v.result.reason.as_deref().unwrap_or("invalid")
                ));
            }
            md.push('\n');
        }

        if !self.failed.is_empty() {
            md.push_str(&format!("## Missing questions ({})\n\n", self.missing));
            for f in &self.failed {
                md.push_str(&format!(
                    "- Slot {} ({}, {}): {}\n",
                    f.slot_index + 1,
                    f.topic_name,
                    f.bucket,
                    f.reason
                ));
            }
            md.push('\n');
        }

        md
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BucketAllocation, TopicAllocation, VerifyResult};

    fn sample_paper() -> ExamPaper {
        let question = GeneratedQuestion {
            concept: "Network Theorems".into(),
            difficulty: "Medium".into(),
            question: "Find the Thevenin resistance across a-b.".into(),
        };
        let verification =
            VerificationReport::from_results(&[question.clone()], vec![VerifyResult::ok()]);
        ExamPaper {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            subject: Subject {
                id: "EE".into(),
                name: "Electrical Engineering".into(),
            },
            cutoff_year: 2020,
            total_requested: 2,
            distribution: DistributionPlan {
                total_questions: 2,
                topics: vec![TopicAllocation {
                    topic_id: "theorems".into(),
                    topic_name: "Network Theorems".into(),
                    weight: 3.5,
                    count: 2,
                    buckets: BucketAllocation {
                        frequent: 1,
                        recent: 1,
                        never_asked: 0,
                    },
                }],
            },
            questions: vec![PaperQuestion {
                slot_index: 0,
                topic_id: "theorems".into(),
                bucket: Bucket::Frequent,
                target_difficulty: Difficulty::Medium,
                seed_id: Some("ee-2019-14".into()),
                question,
            }],
            failed: vec![FailedSlot {
                slot_index: 1,
                topic_id: "theorems".into(),
                topic_name: "Network Theorems".into(),
                bucket: Bucket::Recent,
                reason: "timed out after 30s".into(),
            }],
            missing: 1,
            verification,
            regeneration_rounds: 0,
            duration_ms: 1200,
        }
    }

    #[test]
    fn save_and_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("papers").join("paper.json");
        let paper = sample_paper();
        paper.save_json(&path).unwrap();

        let loaded = ExamPaper::load_json(&path).unwrap();
        assert_eq!(loaded.id, paper.id);
        assert_eq!(loaded.distribution, paper.distribution);
        assert_eq!(loaded.questions, paper.questions);
        assert_eq!(loaded.missing, 1);
        assert!(!loaded.is_complete());
    }

    #[test]
    fn question_json_is_flat() {
        let json = serde_json::to_value(&sample_paper()).unwrap();
        let q = &json["questions"][0];
        assert_eq!(q["concept"], "Network Theorems");
        assert_eq!(q["bucket"], "frequent");
        assert_eq!(q["seed_id"], "ee-2019-14");
    }

    #[test]
    fn markdown_lists_questions_and_gaps() {
        let md = sample_paper().to_markdown();
        assert!(md.starts_with("# Electrical Engineering (EE)"));
        assert!(md.contains("1. **[Network Theorems | Medium]** Find the Thevenin"));
        assert!(md.contains("| Network Theorems | 3.50 | 2 | 1 | 1 | 0 |"));
        assert!(md.contains("## Missing questions (1)"));
        assert!(md.contains("timed out"));
        assert!(!md.contains("Verification issues"));
    }

    #[test]
    fn valid_questions_follow_verdicts() {
        let mut paper = sample_paper();
        assert_eq!(paper.valid_questions().count(), 1);
        paper.verification.results[0].result = VerifyResult::invalid("unknown concept");
        assert_eq!(paper.valid_questions().count(), 0);
    }
}
