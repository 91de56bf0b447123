//! Slot resolver: turns a distribution plan into an ordered list of slots,
//! each seeded by a historical question or marked for synthesis.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ExamError;
use crate::model::{Bucket, Difficulty, DistributionPlan, PyqRecord, Slot, SlotSeed};
use crate::weights::BucketRules;

/// Target difficulty split for synthesized slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyMix {
    pub easy: f64,
    pub medium: f64,
    pub hard: f64,
}

impl Default for DifficultyMix {
    fn default() -> Self {
        Self {
            easy: 0.3,
            medium: 0.5,
            hard: 0.2,
        }
    }
}

impl DifficultyMix {
    pub fn get(&self, difficulty: Difficulty) -> f64 {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
        }
    }

    pub fn validate(&self) -> Result<(), ExamError> {
        for d in Difficulty::ALL {
            let value = self.get(d);
            if !value.is_finite() || value < 0.0 {
                return Err(ExamError::Config(format!(
                    "difficulty mix for {d} must be nonnegative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Smooth weighted round-robin over difficulties. Deterministic, and spreads
/// each level evenly through the sequence instead of clumping it.
struct DifficultyCycle {
    weights: [f64; 3],
    current: [f64; 3],
}

impl DifficultyCycle {
    fn new(mix: &DifficultyMix) -> Self {
        Self {
            weights: Difficulty::ALL.map(|d| mix.get(d).max(0.0)),
            current: [0.0; 3],
        }
    }

    fn next(&mut self) -> Difficulty {
        let total: f64 = self.weights.iter().sum();
        if total <= 0.0 {
            return Difficulty::Medium;
        }
        let mut best = 0;
        for i in 0..3 {
            self.current[i] += self.weights[i];
            if self.current[i] > self.current[best] {
                best = i;
            }
        }
        self.current[best] -= total;
        Difficulty::ALL[best]
    }
}

/// Picks seed records for every planned slot.
#[derive(Debug, Clone)]
pub struct SlotResolver {
    rules: BucketRules,
    mix: DifficultyMix,
}

impl SlotResolver {
    pub fn new(rules: BucketRules, mix: DifficultyMix) -> Self {
        Self { rules, mix }
    }

    /// Emit slots grouped by topic in plan order, buckets in the order
    /// frequent, recent, never-asked.
    ///
    /// Records are drawn without replacement: once a record seeds a slot it
    /// cannot seed another one in the same paper.
    pub fn resolve(
        &self,
        plan: &DistributionPlan,
        records_by_topic: &HashMap<String, Vec<PyqRecord>>,
    ) -> Vec<Slot> {
        let mut slots = Vec::with_capacity(plan.total_questions as usize);
        let empty = Vec::new();
        let mut used: HashSet<(&str, &str)> = HashSet::new();
        let mut cycle = DifficultyCycle::new(&self.mix);

        for alloc in &plan.topics {
            let records = records_by_topic.get(&alloc.topic_id).unwrap_or(&empty);

            for bucket in Bucket::ORDER {
                for _ in 0..alloc.buckets.get(bucket) {
                    let seed = match bucket {
                        Bucket::NeverAsked => None,
                        _ => self.pick(records, bucket, &used),
                    };

                    let (difficulty, seed) = match seed {
                        Some(record) => {
                            used.insert((record.topic_id.as_str(), record.id.as_str()));
                            (
                                record.difficulty,
                                SlotSeed::Reuse {
                                    record: record.clone(),
                                },
                            )
                        }
                        None => (cycle.next(), SlotSeed::Synthesize),
                    };

                    slots.push(Slot {
                        index: slots.len(),
                        topic_id: alloc.topic_id.clone(),
                        topic_name: alloc.topic_name.clone(),
                        difficulty,
                        bucket,
                        seed,
                    });
                }
            }
        }

        let synthesized = slots.iter().filter(|s| s.is_synthesized()).count();
        tracing::debug!(
            slots = slots.len(),
            reused = slots.len() - synthesized,
            synthesized,
            "resolved slots"
        );
        slots
    }

    /// Best unused record for `bucket`: most occurrences, then most recent,
    /// then lowest id.
    fn pick<'a>(
        &self,
        records: &'a [PyqRecord],
        bucket: Bucket,
        used: &HashSet<(&str, &str)>,
    ) -> Option<&'a PyqRecord> {
        records
            .iter()
            .filter(|r| !used.contains(&(r.topic_id.as_str(), r.id.as_str())))
            .filter(|r| match bucket {
                Bucket::Frequent => self.rules.is_frequent(r),
                Bucket::Recent => self.rules.is_recent(r),
                Bucket::NeverAsked => false,
            })
            .min_by(|a, b| {
                b.occurrences
                    .cmp(&a.occurrences)
                    .then_with(|| b.year.cmp(&a.year))
                    .then_with(|| a.id.cmp(&b.id))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BucketAllocation, TopicAllocation};

    fn rules() -> BucketRules {
        BucketRules {
            cutoff_year: 2020,
            frequent_threshold: 1,
            recent_window_years: 3,
        }
    }

    fn record(id: &str, topic: &str, year: i32, occurrences: u32, difficulty: Difficulty) -> PyqRecord {
        PyqRecord {
            id: id.into(),
            topic_id: topic.into(),
            year,
            difficulty,
            occurrences,
            text: None,
        }
    }

    fn alloc(id: &str, frequent: u32, recent: u32, never_asked: u32) -> TopicAllocation {
        let buckets = BucketAllocation {
            frequent,
            recent,
            never_asked,
        };
        TopicAllocation {
            topic_id: id.into(),
            topic_name: id.to_uppercase(),
            weight: 1.0,
            count: buckets.total(),
            buckets,
        }
    }

    fn plan(topics: Vec<TopicAllocation>) -> DistributionPlan {
        DistributionPlan {
            total_questions: topics.iter().map(|t| t.count).sum(),
            topics,
        }
    }

    #[test]
    fn prefers_occurrences_then_year_then_id() {
        let records = HashMap::from([(
            "a".to_string(),
            vec![
                record("r3", "a", 2015, 3, Difficulty::Easy),
                record("r2", "a", 2018, 3, Difficulty::Hard),
                record("r1", "a", 2018, 3, Difficulty::Medium),
                record("r4", "a", 2019, 5, Difficulty::Easy),
            ],
        )]);
        let slots = SlotResolver::new(rules(), DifficultyMix::default())
            .resolve(&plan(vec![alloc("a", 4, 0, 0)]), &records);

        let ids: Vec<_> = slots
            .iter()
            .map(|s| s.seed_record().unwrap().id.as_str())
            .collect();
        assert_eq!(ids, vec!["r4", "r1", "r2", "r3"]);
        assert_eq!(slots[1].difficulty, Difficulty::Medium);
    }

    #[test]
    fn records_are_not_reused_across_buckets() {
        // r1 is both frequent and recent; it may only seed one slot.
        let records = HashMap::from([(
            "a".to_string(),
            vec![record("r1", "a", 2020, 2, Difficulty::Hard)],
        )]);
        let slots = SlotResolver::new(rules(), DifficultyMix::default())
            .resolve(&plan(vec![alloc("a", 1, 1, 0)]), &records);

        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].bucket, Bucket::Frequent);
        assert_eq!(slots[0].seed_record().unwrap().id, "r1");
        assert_eq!(slots[1].bucket, Bucket::Recent);
        assert!(slots[1].is_synthesized());
    }

    #[test]
    fn never_asked_always_synthesizes() {
        let records = HashMap::from([(
            "a".to_string(),
            vec![record("r1", "a", 2020, 2, Difficulty::Hard)],
        )]);
        let slots = SlotResolver::new(rules(), DifficultyMix::default())
            .resolve(&plan(vec![alloc("a", 0, 0, 2)]), &records);
        assert!(slots.iter().all(Slot::is_synthesized));
    }

    #[test]
    fn records_after_cutoff_never_seed() {
        let records = HashMap::from([(
            "a".to_string(),
            vec![record("r1", "a", 2023, 9, Difficulty::Hard)],
        )]);
        let slots = SlotResolver::new(rules(), DifficultyMix::default())
            .resolve(&plan(vec![alloc("a", 1, 1, 0)]), &records);
        assert!(slots.iter().all(Slot::is_synthesized));
    }

    #[test]
    fn emission_order_and_indices() {
        let slots = SlotResolver::new(rules(), DifficultyMix::default()).resolve(
            &plan(vec![alloc("b", 1, 1, 0), alloc("a", 0, 0, 1)]),
            &HashMap::new(),
        );
        let order: Vec<_> = slots
            .iter()
            .map(|s| (s.index, s.topic_id.as_str(), s.bucket))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, "b", Bucket::Frequent),
                (1, "b", Bucket::Recent),
                (2, "a", Bucket::NeverAsked),
            ]
        );
    }

    #[test]
    fn synthesized_difficulties_follow_mix() {
        let slots = SlotResolver::new(rules(), DifficultyMix::default())
            .resolve(&plan(vec![alloc("a", 0, 0, 10)]), &HashMap::new());
        let first: Vec<_> = slots.iter().take(3).map(|s| s.difficulty).collect();
        assert_eq!(
            first,
            vec![Difficulty::Medium, Difficulty::Easy, Difficulty::Hard]
        );

        let count = |d| slots.iter().filter(|s| s.difficulty == d).count();
        assert_eq!(count(Difficulty::Easy), 3);
        assert_eq!(count(Difficulty::Medium), 5);
        assert_eq!(count(Difficulty::Hard), 2);
    }

    #[test]
    fn resolution_is_deterministic() {
        let records = HashMap::from([(
            "a".to_string(),
            vec![
                record("r1", "a", 2019, 2, Difficulty::Easy),
                record("r2", "a", 2019, 2, Difficulty::Hard),
            ],
        )]);
        let resolver = SlotResolver::new(rules(), DifficultyMix::default());
        let p = plan(vec![alloc("a", 2, 1, 1)]);
        assert_eq!(resolver.resolve(&p, &records), resolver.resolve(&p, &records));
    }
}
