//! Topic importance weights from PYQ history.
//!
//! weight = w_f * F + w_r * R + w_n * bonus (never-asked topics only), where
//! F is the summed occurrence count of records asked up to the cutoff year
//! and R halves every `recency_half_life_years` since the most recent ask.

use serde::{Deserialize, Serialize};

use crate::error::ExamError;
use crate::graph::TopicGraph;
use crate::model::{BucketBreakdown, PyqRecord, Topic, TopicWeight};

/// Tunable coefficients and bucket thresholds for the weight calculator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    pub frequency_coefficient: f64,
    pub recency_coefficient: f64,
    pub never_asked_coefficient: f64,
    /// Flat bonus for topics with no history, so coverage can still place them.
    pub never_asked_bonus: f64,
    pub recency_half_life_years: f64,
    /// A record is "frequent" when its occurrence count exceeds this.
    pub frequent_threshold: u32,
    /// A record is "recent" when asked within this many years up to the cutoff.
    pub recent_window_years: u32,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            frequency_coefficient: 1.0,
            recency_coefficient: 2.0,
            never_asked_coefficient: 1.0,
            never_asked_bonus: 1.0,
            recency_half_life_years: 3.0,
            frequent_threshold: 1,
            recent_window_years: 3,
        }
    }
}

impl WeightConfig {
    pub fn validate(&self) -> Result<(), ExamError> {
        let coefficients = [
            ("frequency_coefficient", self.frequency_coefficient),
            ("recency_coefficient", self.recency_coefficient),
            ("never_asked_coefficient", self.never_asked_coefficient),
            ("never_asked_bonus", self.never_asked_bonus),
        ];
        for (name, value) in coefficients {
            if !value.is_finite() || value < 0.0 {
                return Err(ExamError::Config(format!(
                    "{name} must be a nonnegative number, got {value}"
                )));
            }
        }
        if !self.recency_half_life_years.is_finite() || self.recency_half_life_years <= 0.0 {
            return Err(ExamError::Config(format!(
                "recency_half_life_years must be positive, got {}",
                self.recency_half_life_years
            )));
        }
        Ok(())
    }

    /// Bucket rules bound to one request's cutoff year.
    pub fn rules(&self, cutoff_year: i32) -> BucketRules {
        BucketRules {
            cutoff_year,
            frequent_threshold: self.frequent_threshold,
            recent_window_years: self.recent_window_years,
        }
    }
}

/// Record eligibility tests shared by the weight calculator and slot resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketRules {
    pub cutoff_year: i32,
    pub frequent_threshold: u32,
    pub recent_window_years: u32,
}

impl BucketRules {
    pub fn is_eligible(&self, record: &PyqRecord) -> bool {
        record.year <= self.cutoff_year
    }

    pub fn is_frequent(&self, record: &PyqRecord) -> bool {
        self.is_eligible(record) && record.occurrences > self.frequent_threshold
    }

    pub fn is_recent(&self, record: &PyqRecord) -> bool {
        self.is_eligible(record)
            && i64::from(record.year) > i64::from(self.cutoff_year) - i64::from(self.recent_window_years)
    }
}

/// Weight one topic from its own PYQ records.
///
/// Every record must belong to `topic`; records after `cutoff_year` are
/// ignored. An invalid `config` is rejected with [`ExamError::Config`].
pub fn compute_weight(
    topic: &Topic,
    records: &[PyqRecord],
    cutoff_year: i32,
    config: &WeightConfig,
) -> Result<TopicWeight, ExamError> {
    for record in records {
        if record.topic_id != topic.id {
            return Err(ExamError::integrity(format!(
                "record '{}' belongs to topic '{}', not '{}'",
                record.id, record.topic_id, topic.id
            )));
        }
    }
    weigh(topic, records, cutoff_year, config)
}

/// Weight `topic` from its own records and those of all its descendants.
pub fn compute_rollup_weight(
    graph: &TopicGraph,
    topic: &Topic,
    records: &[PyqRecord],
    cutoff_year: i32,
    config: &WeightConfig,
) -> Result<TopicWeight, ExamError> {
    for record in records {
        if !graph.is_within(&topic.id, &record.topic_id) {
            return Err(ExamError::integrity(format!(
                "record '{}' (topic '{}') is outside the '{}' subtree",
                record.id, record.topic_id, topic.id
            )));
        }
    }
    weigh(topic, records, cutoff_year, config)
}

fn weigh(
    topic: &Topic,
    records: &[PyqRecord],
    cutoff_year: i32,
    config: &WeightConfig,
) -> Result<TopicWeight, ExamError> {
    config.validate()?;
    if let Some(bad) = records.iter().find(|r| r.occurrences == 0) {
        return Err(ExamError::integrity(format!(
            "record '{}' has an occurrence count of 0",
            bad.id
        )));
    }

    let rules = config.rules(cutoff_year);
    let surviving: Vec<&PyqRecord> = records.iter().filter(|r| rules.is_eligible(r)).collect();

    let frequency: f64 = surviving.iter().map(|r| f64::from(r.occurrences)).sum();
    let recency = surviving
        .iter()
        .map(|r| r.year)
        .max()
        .map(|last| {
            let gap = (i64::from(cutoff_year) - i64::from(last)) as f64;
            0.5f64.powf(gap / config.recency_half_life_years)
        })
        .unwrap_or(0.0);
    let never_asked = surviving.is_empty();

    let mut weight =
        config.frequency_coefficient * frequency + config.recency_coefficient * recency;
    if never_asked {
        weight += config.never_asked_coefficient * config.never_asked_bonus;
    }

    let breakdown = BucketBreakdown {
        frequent: surviving.iter().filter(|r| rules.is_frequent(r)).count() as u32,
        recent: surviving.iter().filter(|r| rules.is_recent(r)).count() as u32,
        never_asked,
    };

    Ok(TopicWeight {
        topic_id: topic.id.clone(),
        topic_name: topic.name.clone(),
        weight: weight.max(0.0),
        breakdown,
    })
}
