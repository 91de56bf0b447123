//! Property tests for the planning pipeline.

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;

use exampaper_core::model::{
    BucketBreakdown, Difficulty, GeneratedQuestion, PyqRecord, Topic, TopicWeight,
};
use exampaper_core::planner::{largest_remainder, DistributionPlanner};
use exampaper_core::resolver::{DifficultyMix, SlotResolver};
use exampaper_core::verifier::{Verifier, VerifierConfig};
use exampaper_core::weights::{compute_weight, WeightConfig};

fn breakdown() -> impl Strategy<Value = BucketBreakdown> {
    (0u32..4, 0u32..4, any::<bool>()).prop_map(|(frequent, recent, never_asked)| {
        BucketBreakdown {
            frequent,
            recent,
            never_asked,
        }
    })
}

fn weights() -> impl Strategy<Value = Vec<TopicWeight>> {
    prop::collection::vec(
        (prop_oneof![Just(0.0), 0.0f64..50.0], breakdown()),
        1..25,
    )
    .prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (weight, breakdown))| TopicWeight {
                topic_id: format!("t{i:02}"),
                topic_name: format!("Topic {i}"),
                weight,
                breakdown,
            })
            .collect()
    })
}

fn records(topic: &'static str) -> impl Strategy<Value = Vec<PyqRecord>> {
    prop::collection::vec((1990i32..2030, 1u32..6, 0usize..3), 0..12).prop_map(move |rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (year, occurrences, d))| PyqRecord {
                id: format!("{topic}-{i}"),
                topic_id: topic.to_string(),
                year,
                difficulty: Difficulty::ALL[d],
                occurrences,
                text: None,
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn largest_remainder_sums_exactly(
        total in 0u32..500,
        entries in prop::collection::vec(0.0f64..100.0, 1..30),
    ) {
        let keyed: Vec<(usize, f64)> = entries.into_iter().enumerate().collect();
        let counts = largest_remainder(total, &keyed);
        prop_assert_eq!(counts.len(), keyed.len());
        prop_assert_eq!(counts.iter().sum::<u32>(), total);
    }

    #[test]
    fn plan_sums_to_total(total in 1u32..200, weights in weights()) {
        let plan = DistributionPlanner::default().plan(total, &weights, None).unwrap();
        prop_assert_eq!(plan.allocated(), total);
        for topic in &plan.topics {
            prop_assert_eq!(topic.buckets.total(), topic.count);
        }
    }

    #[test]
    fn plan_covers_weighted_topics_when_possible(total in 1u32..200, weights in weights()) {
        let plan = DistributionPlanner::default().plan(total, &weights, None).unwrap();
        let weighted = weights.iter().filter(|w| w.weight > 0.0).count();
        if weighted > 0 && total as usize >= weighted {
            for w in weights.iter().filter(|w| w.weight > 0.0) {
                prop_assert!(
                    plan.count_for(&w.topic_id) >= 1,
                    "topic {} left uncovered", w.topic_id
                );
            }
        }
    }

    #[test]
    fn plan_is_deterministic(total in 1u32..200, weights in weights()) {
        let planner = DistributionPlanner::default();
        let first = planner.plan(total, &weights, None).unwrap();
        let second = planner.plan(total, &weights, None).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn weights_are_idempotent_and_nonnegative(records in records("a"), cutoff in 1990i32..2030) {
        let topic = Topic {
            id: "a".into(),
            name: "A".into(),
            parent: None,
            subject: "EE".into(),
        };
        let config = WeightConfig::default();
        let first = compute_weight(&topic, &records, cutoff, &config).unwrap();
        let second = compute_weight(&topic, &records, cutoff, &config).unwrap();
        prop_assert!(first.weight >= 0.0);
        prop_assert_eq!(
            first.breakdown.never_asked,
            records.iter().all(|r| r.year > cutoff)
        );
        prop_assert_eq!(first, second);
    }

    #[test]
    fn resolver_never_reuses_a_record(
        total in 1u32..40,
        a in records("a"),
        b in records("b"),
    ) {
        let config = WeightConfig::default();
        let topic = |id: &str| Topic {
            id: id.into(),
            name: id.to_uppercase(),
            parent: None,
            subject: "EE".into(),
        };
        let weights = vec![
            compute_weight(&topic("a"), &a, 2020, &config).unwrap(),
            compute_weight(&topic("b"), &b, 2020, &config).unwrap(),
        ];
        let plan = DistributionPlanner::default().plan(total, &weights, None).unwrap();
        let by_topic = HashMap::from([("a".to_string(), a), ("b".to_string(), b)]);
        let slots = SlotResolver::new(config.rules(2020), DifficultyMix::default())
            .resolve(&plan, &by_topic);

        prop_assert_eq!(slots.len(), total as usize);
        let mut seen = HashSet::new();
        for (i, slot) in slots.iter().enumerate() {
            prop_assert_eq!(slot.index, i);
            if let Some(record) = slot.seed_record() {
                prop_assert!(record.year <= 2020);
                prop_assert!(seen.insert((record.topic_id.clone(), record.id.clone())));
                prop_assert_eq!(&record.topic_id, &slot.topic_id);
            }
        }
    }

    #[test]
    fn only_later_duplicates_are_flagged(texts in prop::collection::vec("[a-c]{1,2}", 1..20)) {
        let questions: Vec<GeneratedQuestion> = texts
            .iter()
            .map(|t| GeneratedQuestion {
                concept: "Circuits".into(),
                difficulty: "Easy".into(),
                question: t.clone(),
            })
            .collect();
        let results = Verifier::new(["Circuits"], VerifierConfig::default()).verify(&questions);

        let mut seen = HashSet::new();
        for (text, result) in texts.iter().zip(&results) {
            let first = seen.insert(text.clone());
            prop_assert_eq!(result.valid, first);
        }
    }
}
