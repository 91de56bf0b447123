//! Core data model types for exampaper.
//!
//! Topics and PYQ records come from the topic graph and are read-only for the
//! duration of a request. Everything else here is created per exam request
//! and discarded once the paper is assembled.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ExamError;

/// Lowest cutoff year accepted in a request.
pub const MIN_CUTOFF_YEAR: i32 = 1950;
/// Highest cutoff year accepted in a request.
pub const MAX_CUTOFF_YEAR: i32 = 2100;

/// A subject known to the topic graph (e.g. "EE" / "Electrical Engineering").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
}

/// A syllabus topic. Topics form a tree through `parent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    /// Unique within the subject.
    pub id: String,
    /// Display name; generated questions declare this as their concept.
    pub name: String,
    /// Parent topic id, `None` for a root topic.
    #[serde(default)]
    pub parent: Option<String>,
    /// Owning subject id.
    pub subject: String,
}

/// Question difficulty, ordered Easy < Medium < Hard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "Easy"),
            Difficulty::Medium => write!(f, "Medium"),
            Difficulty::Hard => write!(f, "Hard"),
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

/// A previously-asked question pattern tied to a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PyqRecord {
    /// Record identifier, used as the final tie-break when picking seeds.
    pub id: String,
    pub topic_id: String,
    /// Year the question was asked.
    pub year: i32,
    pub difficulty: Difficulty,
    /// How many historical papers repeated this pattern (at least 1).
    pub occurrences: u32,
    /// Original wording, if the graph stores it.
    #[serde(default)]
    pub text: Option<String>,
}

/// Recency/frequency classification of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Frequent,
    Recent,
    NeverAsked,
}

impl Bucket {
    /// Fixed preference order, also the slot emission order.
    pub const ORDER: [Bucket; 3] = [Bucket::Frequent, Bucket::Recent, Bucket::NeverAsked];
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bucket::Frequent => write!(f, "frequent"),
            Bucket::Recent => write!(f, "recent"),
            Bucket::NeverAsked => write!(f, "never_asked"),
        }
    }
}

/// Which buckets a topic's history can feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketBreakdown {
    /// Surviving records whose occurrence count exceeds the frequent threshold.
    pub frequent: u32,
    /// Surviving records asked within the trailing recent window.
    pub recent: u32,
    /// No surviving records at all.
    pub never_asked: bool,
}

impl BucketBreakdown {
    /// Whether `bucket` has at least one eligible source.
    pub fn is_available(&self, bucket: Bucket) -> bool {
        match bucket {
            Bucket::Frequent => self.frequent > 0,
            Bucket::Recent => self.recent > 0,
            Bucket::NeverAsked => self.never_asked,
        }
    }
}

/// Importance weight of one topic for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicWeight {
    pub topic_id: String,
    pub topic_name: String,
    /// Never negative.
    pub weight: f64,
    pub breakdown: BucketBreakdown,
}

/// A request to assemble one exam paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamRequest {
    pub subject: String,
    pub total_questions: u32,
    /// PYQ records asked after this year are ignored for scoring.
    pub cutoff_year: i32,
    /// Optional subset of topics, by id or display name.
    #[serde(default)]
    pub topics: Option<Vec<String>>,
}

impl ExamRequest {
    /// Checks everything that can be checked without touching the graph.
    pub fn validate(&self) -> Result<(), ExamError> {
        if self.subject.trim().is_empty() {
            return Err(ExamError::invalid("subject must not be empty"));
        }
        if self.total_questions == 0 {
            return Err(ExamError::invalid("total_questions must be positive"));
        }
        if !(MIN_CUTOFF_YEAR..=MAX_CUTOFF_YEAR).contains(&self.cutoff_year) {
            return Err(ExamError::invalid(format!(
                "cutoff_year {} outside {MIN_CUTOFF_YEAR}..={MAX_CUTOFF_YEAR}",
                self.cutoff_year
            )));
        }
        if let Some(topics) = &self.topics {
            if topics.iter().all(|t| t.trim().is_empty()) {
                return Err(ExamError::invalid("topic filter is empty"));
            }
        }
        Ok(())
    }
}

/// Questions allocated to each bucket within one topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketAllocation {
    pub frequent: u32,
    pub recent: u32,
    pub never_asked: u32,
}

impl BucketAllocation {
    pub fn get(&self, bucket: Bucket) -> u32 {
        match bucket {
            Bucket::Frequent => self.frequent,
            Bucket::Recent => self.recent,
            Bucket::NeverAsked => self.never_asked,
        }
    }

    pub fn set(&mut self, bucket: Bucket, count: u32) {
        match bucket {
            Bucket::Frequent => self.frequent = count,
            Bucket::Recent => self.recent = count,
            Bucket::NeverAsked => self.never_asked = count,
        }
    }

    pub fn total(&self) -> u32 {
        self.frequent + self.recent + self.never_asked
    }
}

/// One topic's share of the paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicAllocation {
    pub topic_id: String,
    pub topic_name: String,
    pub weight: f64,
    pub count: u32,
    pub buckets: BucketAllocation,
}

/// How many questions each topic contributes, per bucket.
///
/// `topics` keeps the order of the weights the plan was built from, which is
/// the topic graph reader's deterministic order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionPlan {
    pub total_questions: u32,
    pub topics: Vec<TopicAllocation>,
}

impl DistributionPlan {
    /// Sum of all topic allocations.
    pub fn allocated(&self) -> u32 {
        self.topics.iter().map(|t| t.count).sum()
    }

    pub fn get(&self, topic_id: &str) -> Option<&TopicAllocation> {
        self.topics.iter().find(|t| t.topic_id == topic_id)
    }

    /// Allocation for `topic_id`, zero when the topic is not in the plan.
    pub fn count_for(&self, topic_id: &str) -> u32 {
        self.get(topic_id).map(|t| t.count).unwrap_or(0)
    }

    /// Paper-wide bucket totals.
    pub fn bucket_totals(&self) -> BucketAllocation {
        self.topics
            .iter()
            .fold(BucketAllocation::default(), |mut acc, t| {
                acc.frequent += t.buckets.frequent;
                acc.recent += t.buckets.recent;
                acc.never_asked += t.buckets.never_asked;
                acc
            })
    }
}

/// Where a slot's question comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotSeed {
    /// Rephrase a historical question pattern.
    Reuse { record: PyqRecord },
    /// No qualifying history; write a fresh question.
    Synthesize,
}

/// One planned question unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Position in the paper, starting at 0.
    pub index: usize,
    pub topic_id: String,
    pub topic_name: String,
    pub difficulty: Difficulty,
    pub bucket: Bucket,
    pub seed: SlotSeed,
}

impl Slot {
    pub fn seed_record(&self) -> Option<&PyqRecord> {
        match &self.seed {
            SlotSeed::Reuse { record } => Some(record),
            SlotSeed::Synthesize => None,
        }
    }

    pub fn is_synthesized(&self) -> bool {
        matches!(self.seed, SlotSeed::Synthesize)
    }
}

/// A worded question, as returned by a question generator.
///
/// `difficulty` is kept as declared text so the verifier can reject labels
/// it does not recognize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub concept: String,
    pub difficulty: String,
    pub question: String,
}

/// Verdict for one generated question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResult {
    pub valid: bool,
    /// First failing check, `None` when valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl VerifyResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(total: u32, cutoff: i32) -> ExamRequest {
        ExamRequest {
            subject: "EE".into(),
            total_questions: total,
            cutoff_year: cutoff,
            topics: None,
        }
    }

    #[test]
    fn difficulty_display_and_parse() {
        assert_eq!(Difficulty::Medium.to_string(), "Medium");
        assert_eq!("easy".parse::<Difficulty>().unwrap(), Difficulty::Easy);
        assert_eq!(" HARD ".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert!("trivial".parse::<Difficulty>().is_err());
        assert!(Difficulty::Easy < Difficulty::Medium);
        assert!(Difficulty::Medium < Difficulty::Hard);
    }

    #[test]
    fn request_rejects_zero_questions() {
        let err = request(0, 2020).validate().unwrap_err();
        assert!(err.is_client_error());
        assert!(err.to_string().contains("total_questions"));
    }

    #[test]
    fn request_rejects_implausible_cutoff() {
        assert!(request(10, 1800).validate().is_err());
        assert!(request(10, 3000).validate().is_err());
        assert!(request(10, 2020).validate().is_ok());
    }

    #[test]
    fn request_rejects_blank_filter() {
        let mut req = request(10, 2020);
        req.topics = Some(vec![]);
        assert!(req.validate().is_err());
        req.topics = Some(vec!["  ".into()]);
        assert!(req.validate().is_err());
        req.topics = Some(vec!["circuits".into()]);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn bucket_allocation_accessors() {
        let mut alloc = BucketAllocation::default();
        alloc.set(Bucket::Recent, 2);
        alloc.set(Bucket::NeverAsked, 1);
        assert_eq!(alloc.get(Bucket::Recent), 2);
        assert_eq!(alloc.total(), 3);
    }

    #[test]
    fn slot_seed_serializes_with_kind_tag() {
        let slot = Slot {
            index: 0,
            topic_id: "t1".into(),
            topic_name: "Topic".into(),
            difficulty: Difficulty::Easy,
            bucket: Bucket::NeverAsked,
            seed: SlotSeed::Synthesize,
        };
        let json = serde_json::to_value(&slot).unwrap();
        assert_eq!(json["seed"]["kind"], "synthesize");
        assert_eq!(json["bucket"], "never_asked");
        assert!(slot.is_synthesized());
        assert!(slot.seed_record().is_none());
    }
}
