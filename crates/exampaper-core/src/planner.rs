//! Distribution planner: apportions a paper's questions across topics and,
//! within each topic, across buckets.
//!
//! Both levels use the largest-remainder (Hamilton) method so every plan sums
//! exactly to the requested total. Ties are broken by key so identical input
//! always produces an identical plan.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ExamError;
use crate::model::{Bucket, BucketAllocation, BucketBreakdown, DistributionPlan, TopicAllocation, TopicWeight};

/// Preferred split of a topic's questions across buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketRatio {
    pub frequent: f64,
    pub recent: f64,
    pub never_asked: f64,
}

impl Default for BucketRatio {
    fn default() -> Self {
        Self {
            frequent: 0.5,
            recent: 0.3,
            never_asked: 0.2,
        }
    }
}

impl BucketRatio {
    pub fn get(&self, bucket: Bucket) -> f64 {
        match bucket {
            Bucket::Frequent => self.frequent,
            Bucket::Recent => self.recent,
            Bucket::NeverAsked => self.never_asked,
        }
    }

    pub fn validate(&self) -> Result<(), ExamError> {
        for bucket in Bucket::ORDER {
            let value = self.get(bucket);
            if !value.is_finite() || value < 0.0 {
                return Err(ExamError::Config(format!(
                    "bucket ratio for {bucket} must be nonnegative, got {value}"
                )));
            }
        }
        if Bucket::ORDER.iter().map(|b| self.get(*b)).sum::<f64>() <= 0.0 {
            return Err(ExamError::Config("bucket ratio must not be all zero".into()));
        }
        Ok(())
    }
}

/// Planner settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub bucket_ratio: BucketRatio,
}

/// Split `total` into integer parts proportional to each entry's weight.
///
/// Returns counts in entry order. Leftover units go to the largest fractional
/// remainders, ties to the smallest key. If every weight is zero the split is
/// uniform.
pub fn largest_remainder<K: Ord>(total: u32, entries: &[(K, f64)]) -> Vec<u32> {
    if entries.is_empty() {
        return Vec::new();
    }

    let sum: f64 = entries.iter().map(|(_, w)| w.max(0.0)).sum();
    let shares: Vec<f64> = if sum > 0.0 {
        entries
            .iter()
            .map(|(_, w)| f64::from(total) * w.max(0.0) / sum)
            .collect()
    } else {
        vec![f64::from(total) / entries.len() as f64; entries.len()]
    };

    let mut counts: Vec<u32> = shares.iter().map(|s| s.floor() as u32).collect();
    let assigned: u32 = counts.iter().sum();
    let remainder = total.saturating_sub(assigned) as usize;

    let mut order: Vec<usize> = (0..entries.len()).collect();
    order.sort_by(|&a, &b| {
        let frac_a = shares[a] - shares[a].floor();
        let frac_b = shares[b] - shares[b].floor();
        frac_b
            .total_cmp(&frac_a)
            .then_with(|| entries[a].0.cmp(&entries[b].0))
    });
    for &i in order.iter().take(remainder) {
        counts[i] += 1;
    }

    counts
}

/// Turns topic weights into a [`DistributionPlan`].
#[derive(Debug, Clone, Default)]
pub struct DistributionPlanner {
    config: PlannerConfig,
}

impl DistributionPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Plan `total_questions` over `weights`, optionally restricted to the
    /// topic ids in `filter`.
    pub fn plan(
        &self,
        total_questions: u32,
        weights: &[TopicWeight],
        filter: Option<&[String]>,
    ) -> Result<DistributionPlan, ExamError> {
        if total_questions == 0 {
            return Err(ExamError::invalid("total_questions must be positive"));
        }

        let mut seen = HashSet::new();
        for w in weights {
            if !seen.insert(w.topic_id.as_str()) {
                return Err(ExamError::integrity(format!(
                    "topic '{}' weighted twice",
                    w.topic_id
                )));
            }
            if !w.weight.is_finite() || w.weight < 0.0 {
                return Err(ExamError::integrity(format!(
                    "topic '{}' has invalid weight {}",
                    w.topic_id, w.weight
                )));
            }
        }

        let selected: Vec<&TopicWeight> = match filter {
            Some(ids) => {
                if ids.is_empty() {
                    return Err(ExamError::invalid("topic filter is empty"));
                }
                let unknown: Vec<&str> = ids
                    .iter()
                    .map(String::as_str)
                    .filter(|id| !seen.contains(id))
                    .collect();
                if !unknown.is_empty() {
                    return Err(ExamError::invalid(format!(
                        "unknown topics in filter: {}",
                        unknown.join(", ")
                    )));
                }
                weights
                    .iter()
                    .filter(|w| ids.iter().any(|id| *id == w.topic_id))
                    .collect()
            }
            None => weights.iter().collect(),
        };
        if selected.is_empty() {
            return Err(ExamError::invalid("no topics available to plan"));
        }

        let entries: Vec<(&str, f64)> = selected
            .iter()
            .map(|w| (w.topic_id.as_str(), w.weight))
            .collect();
        let mut counts = largest_remainder(total_questions, &entries);
        self.ensure_coverage(total_questions, &selected, &mut counts);

        let topics = selected
            .iter()
            .zip(counts)
            .map(|(w, count)| {
                let buckets = self.split_buckets(count, &w.breakdown);
                tracing::debug!(
                    topic = %w.topic_id,
                    weight = w.weight,
                    count,
                    frequent = buckets.frequent,
                    recent = buckets.recent,
                    never_asked = buckets.never_asked,
                    "allocated topic"
                );
                TopicAllocation {
                    topic_id: w.topic_id.clone(),
                    topic_name: w.topic_name.clone(),
                    weight: w.weight,
                    count,
                    buckets,
                }
            })
            .collect();

        let plan = DistributionPlan {
            total_questions,
            topics,
        };
        debug_assert_eq!(plan.allocated(), total_questions);
        Ok(plan)
    }

    /// Give every nonzero-weight topic at least one question when there are
    /// enough questions to go round. Each unit comes from the topic holding
    /// the most questions (ties: smallest weight, then id).
    fn ensure_coverage(&self, total: u32, topics: &[&TopicWeight], counts: &mut [u32]) {
        let eligible = topics.iter().filter(|w| w.weight > 0.0).count();
        if eligible == 0 || (total as usize) < eligible {
            return;
        }

        let mut uncovered: Vec<usize> = (0..topics.len())
            .filter(|&i| topics[i].weight > 0.0 && counts[i] == 0)
            .collect();
        uncovered.sort_by(|&a, &b| {
            topics[b]
                .weight
                .total_cmp(&topics[a].weight)
                .then_with(|| topics[a].topic_id.cmp(&topics[b].topic_id))
        });

        for needy in uncovered {
            let donor = (0..topics.len()).filter(|&i| counts[i] >= 2).min_by(|&a, &b| {
                counts[b]
                    .cmp(&counts[a])
                    .then_with(|| topics[a].weight.total_cmp(&topics[b].weight))
                    .then_with(|| topics[a].topic_id.cmp(&topics[b].topic_id))
            });
            let Some(donor) = donor else {
                break;
            };
            tracing::debug!(
                from = %topics[donor].topic_id,
                to = %topics[needy].topic_id,
                "moved one question for coverage"
            );
            counts[donor] -= 1;
            counts[needy] += 1;
        }
    }

    fn split_buckets(&self, count: u32, breakdown: &BucketBreakdown) -> BucketAllocation {
        let ratio = &self.config.bucket_ratio;
        let available: Vec<Bucket> = Bucket::ORDER
            .into_iter()
            .filter(|b| breakdown.is_available(*b))
            .collect();

        let entries: Vec<(Bucket, f64)> = if available.is_empty() {
            Bucket::ORDER.into_iter().map(|b| (b, ratio.get(b))).collect()
        } else if available.iter().all(|b| ratio.get(*b) <= 0.0) {
            available.into_iter().map(|b| (b, 1.0)).collect()
        } else {
            available.into_iter().map(|b| (b, ratio.get(b))).collect()
        };

        let mut alloc = BucketAllocation::default();
        for ((bucket, _), n) in entries.iter().zip(largest_remainder(count, &entries)) {
            alloc.set(*bucket, n);
        }
        alloc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weight(id: &str, w: f64) -> TopicWeight {
        TopicWeight {
            topic_id: id.into(),
            topic_name: id.to_uppercase(),
            weight: w,
            breakdown: BucketBreakdown {
                frequent: 1,
                recent: 1,
                never_asked: false,
            },
        }
    }

    fn planner() -> DistributionPlanner {
        DistributionPlanner::default()
    }

    #[test]
    fn largest_remainder_exact_sum() {
        let entries = [("a", 1.0), ("b", 1.0), ("c", 1.0)];
        let counts = largest_remainder(10, &entries);
        assert_eq!(counts.iter().sum::<u32>(), 10);
        // tie on remainder goes to the smallest key
        assert_eq!(counts, vec![4, 3, 3]);
    }

    #[test]
    fn largest_remainder_uniform_when_all_zero() {
        let counts = largest_remainder(5, &[("b", 0.0), ("a", 0.0)]);
        assert_eq!(counts, vec![2, 3]);
    }

    #[test]
    fn two_topics_three_to_one() {
        let plan = planner()
            .plan(4, &[weight("a", 3.0), weight("b", 1.0)], None)
            .unwrap();
        assert_eq!(plan.count_for("a"), 3);
        assert_eq!(plan.count_for("b"), 1);
        assert_eq!(plan.allocated(), 4);
    }

    #[test]
    fn short_paper_favors_weighted_topic() {
        let weights = vec![
            weight("a", 5.0),
            weight("b", 0.0),
            weight("c", 0.0),
            weight("d", 0.0),
            weight("e", 0.0),
        ];
        let plan = planner().plan(3, &weights, None).unwrap();
        assert_eq!(plan.count_for("a"), 3);
        for id in ["b", "c", "d", "e"] {
            assert_eq!(plan.count_for(id), 0);
        }
    }

    #[test]
    fn coverage_steals_from_largest() {
        let weights = vec![weight("a", 10.0), weight("b", 1.0), weight("c", 1.0)];
        let plan = planner().plan(3, &weights, None).unwrap();
        assert_eq!(plan.count_for("a"), 1);
        assert_eq!(plan.count_for("b"), 1);
        assert_eq!(plan.count_for("c"), 1);
    }

    #[test]
    fn coverage_relaxed_when_too_few_questions() {
        let weights = vec![
            weight("a", 10.0),
            weight("b", 2.0),
            weight("c", 1.0),
            weight("d", 1.0),
        ];
        let plan = planner().plan(2, &weights, None).unwrap();
        assert_eq!(plan.allocated(), 2);
        assert_eq!(plan.count_for("a"), 2);
    }

    #[test]
    fn zero_questions_rejected() {
        let err = planner().plan(0, &[weight("a", 1.0)], None).unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn unknown_filter_rejected() {
        let filter = vec!["a".to_string(), "ghost".to_string()];
        let err = planner()
            .plan(4, &[weight("a", 1.0)], Some(&filter))
            .unwrap_err();
        assert!(err.is_client_error());
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn empty_filter_rejected() {
        let filter: Vec<String> = vec![];
        assert!(planner()
            .plan(4, &[weight("a", 1.0)], Some(&filter))
            .is_err());
    }

    #[test]
    fn filter_restricts_topics() {
        let filter = vec!["b".to_string()];
        let plan = planner()
            .plan(5, &[weight("a", 9.0), weight("b", 1.0)], Some(&filter))
            .unwrap();
        assert_eq!(plan.count_for("a"), 0);
        assert!(plan.get("a").is_none());
        assert_eq!(plan.count_for("b"), 5);
    }

    #[test]
    fn no_topics_rejected() {
        assert!(planner().plan(3, &[], None).is_err());
    }

    #[test]
    fn bucket_split_follows_ratio() {
        let plan = planner().plan(10, &[weight("a", 1.0)], None).unwrap();
        let buckets = plan.get("a").unwrap().buckets;
        // frequent and recent available: 0.5 / 0.3 of 10 → 6.25 / 3.75
        assert_eq!(buckets.frequent, 6);
        assert_eq!(buckets.recent, 4);
        assert_eq!(buckets.never_asked, 0);
        assert_eq!(buckets.total(), 10);
    }

    #[test]
    fn never_asked_topic_fills_never_asked_bucket() {
        let mut w = weight("a", 1.0);
        w.breakdown = BucketBreakdown {
            frequent: 0,
            recent: 0,
            never_asked: true,
        };
        let plan = planner().plan(3, &[w], None).unwrap();
        let buckets = plan.get("a").unwrap().buckets;
        assert_eq!(buckets.never_asked, 3);
        assert_eq!(buckets.frequent + buckets.recent, 0);
    }

    #[test]
    fn stale_history_uses_full_ratio() {
        let mut w = weight("a", 1.0);
        w.breakdown = BucketBreakdown::default();
        let plan = planner().plan(10, &[w], None).unwrap();
        let buckets = plan.get("a").unwrap().buckets;
        assert_eq!(
            (buckets.frequent, buckets.recent, buckets.never_asked),
            (5, 3, 2)
        );
    }

    #[test]
    fn duplicate_weights_rejected() {
        let err = planner()
            .plan(2, &[weight("a", 1.0), weight("a", 2.0)], None)
            .unwrap_err();
        assert!(matches!(err, ExamError::DataIntegrity(_)));
    }

    #[test]
    fn identical_input_identical_plan() {
        let weights = vec![weight("x", 1.0), weight("y", 1.0), weight("z", 1.0)];
        let a = serde_json::to_string(&planner().plan(7, &weights, None).unwrap()).unwrap();
        let b = serde_json::to_string(&planner().plan(7, &weights, None).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn ratio_validation() {
        assert!(BucketRatio::default().validate().is_ok());
        let zero = BucketRatio {
            frequent: 0.0,
            recent: 0.0,
            never_asked: 0.0,
        };
        assert!(zero.validate().is_err());
    }
}
