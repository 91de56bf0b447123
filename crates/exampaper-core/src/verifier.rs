//! Post-generation verification of a question batch.
//!
//! Checks run in a fixed order and the first failure is reported:
//! empty text, duplicate text, unknown difficulty, unknown concept. An
//! optional quality lint (length, forbidden phrases, multi-part questions)
//! runs after those and is off by default.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{Difficulty, GeneratedQuestion, VerifyResult};

/// Optional quality lint applied after the structural checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    pub min_words: Option<usize>,
    pub max_words: Option<usize>,
    /// Case-insensitive phrases that must not appear (e.g. "solution").
    pub forbidden_phrases: Vec<String>,
    /// Reject text that looks like several questions in one.
    pub reject_multi_part: bool,
}

/// Verifies generated questions against a subject's topic names.
#[derive(Debug, Clone)]
pub struct Verifier {
    known_topics: HashSet<String>,
    config: VerifierConfig,
}

impl Verifier {
    pub fn new<I, S>(known_topics: I, config: VerifierConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_topics: known_topics.into_iter().map(Into::into).collect(),
            config,
        }
    }

    /// One result per question, in input order. Only later copies of a
    /// duplicated text are flagged; the first occurrence is judged on its own.
    pub fn verify(&self, questions: &[GeneratedQuestion]) -> Vec<VerifyResult> {
        let mut first_seen: HashMap<&str, usize> = HashMap::new();

        questions
            .iter()
            .enumerate()
            .map(|(i, q)| {
                let text = q.question.trim();
                if text.is_empty() {
                    return VerifyResult::invalid("question text is empty");
                }
                if let Some(&first) = first_seen.get(text) {
                    return VerifyResult::invalid(format!(
                        "duplicate of question {}",
                        first + 1
                    ));
                }
                first_seen.insert(text, i);

                if q.difficulty.parse::<Difficulty>().is_err() {
                    return VerifyResult::invalid(format!(
                        "unknown difficulty '{}'",
                        q.difficulty
                    ));
                }
                if !self.known_topics.contains(q.concept.trim()) {
                    return VerifyResult::invalid(format!("unknown concept '{}'", q.concept));
                }
                match self.lint(text) {
                    Some(reason) => VerifyResult::invalid(reason),
                    None => VerifyResult::ok(),
                }
            })
            .collect()
    }

    fn lint(&self, text: &str) -> Option<String> {
        let words = text.split_whitespace().count();
        if let Some(min) = self.config.min_words {
            if words < min {
                return Some(format!("question too short ({words} words, minimum {min})"));
            }
        }
        if let Some(max) = self.config.max_words {
            if words > max {
                return Some(format!("question too long ({words} words, maximum {max})"));
            }
        }

        let lower = text.to_lowercase();
        if let Some(phrase) = self
            .config
            .forbidden_phrases
            .iter()
            .find(|p| !p.is_empty() && lower.contains(&p.to_lowercase()))
        {
            return Some(format!("contains forbidden phrase '{phrase}'"));
        }

        if self.config.reject_multi_part && looks_multi_part(&lower) {
            return Some("multiple questions detected".into());
        }
        None
    }
}

/// More than two question marks, or an enumerator like "(a)" / "( b )".
fn looks_multi_part(text: &str) -> bool {
    if text.matches('?').count() > 2 {
        return true;
    }
    let chars: Vec<char> = text.chars().collect();
    chars.iter().enumerate().any(|(i, &c)| {
        if c != '(' {
            return false;
        }
        let mut rest = chars[i + 1..].iter().skip_while(|c| c.is_whitespace());
        match rest.next() {
            Some(letter) if letter.is_ascii_lowercase() => {
                matches!(rest.find(|c| !c.is_whitespace()), Some(')'))
            }
            _ => false,
        }
    })
}

/// One verified question, as returned by the verification entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionVerification {
    #[serde(flatten)]
    pub question: GeneratedQuestion,
    #[serde(flatten)]
    pub result: VerifyResult,
}

/// Per-question verdicts plus valid/invalid counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub results: Vec<QuestionVerification>,
}

impl VerificationReport {
    pub fn from_results(questions: &[GeneratedQuestion], results: Vec<VerifyResult>) -> Self {
        let results: Vec<QuestionVerification> = questions
            .iter()
            .cloned()
            .zip(results)
            .map(|(question, result)| QuestionVerification { question, result })
            .collect();
        let valid = results.iter().filter(|r| r.result.valid).count();
        Self {
            total: results.len(),
            valid,
            invalid: results.len() - valid,
            results,
        }
    }

    /// Verify `questions` and wrap the verdicts in a report.
    pub fn run(verifier: &Verifier, questions: &[GeneratedQuestion]) -> Self {
        Self::from_results(questions, verifier.verify(questions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(concept: &str, difficulty: &str, text: &str) -> GeneratedQuestion {
        GeneratedQuestion {
            concept: concept.into(),
            difficulty: difficulty.into(),
            question: text.into(),
        }
    }

    fn verifier() -> Verifier {
        Verifier::new(["Network Theorems", "Transformers"], VerifierConfig::default())
    }

    #[test]
    fn valid_question_passes() {
        let results = verifier().verify(&[q(
            "Network Theorems",
            "Medium",
            "Find the Thevenin resistance seen by the load.",
        )]);
        assert_eq!(results, vec![VerifyResult::ok()]);
    }

    #[test]
    fn empty_text_rejected() {
        let results = verifier().verify(&[q("Transformers", "Easy", "   ")]);
        assert!(!results[0].valid);
        assert_eq!(results[0].reason.as_deref(), Some("question text is empty"));
    }

    #[test]
    fn second_duplicate_rejected() {
        let text = "What is the turns ratio of an ideal transformer?";
        let results = verifier().verify(&[
            q("Transformers", "Easy", text),
            q("Transformers", "Easy", "Define regulation."),
            q("Transformers", "Hard", text),
        ]);
        assert!(results[0].valid);
        assert!(results[1].valid);
        assert!(!results[2].valid);
        assert_eq!(results[2].reason.as_deref(), Some("duplicate of question 1"));
    }

    #[test]
    fn unknown_difficulty_rejected() {
        let results = verifier().verify(&[q("Transformers", "Impossible", "Define regulation.")]);
        assert!(results[0].reason.as_deref().unwrap().contains("difficulty"));
    }

    #[test]
    fn difficulty_is_case_insensitive() {
        let results = verifier().verify(&[q("Transformers", "hard", "Define regulation.")]);
        assert!(results[0].valid);
    }

    #[test]
    fn unknown_concept_rejected() {
        let results = verifier().verify(&[q("Optics", "Easy", "Define focal length.")]);
        assert!(results[0].reason.as_deref().unwrap().contains("concept"));
    }

    #[test]
    fn first_failing_check_wins() {
        // unknown difficulty and unknown concept: difficulty is checked first
        let results = verifier().verify(&[q("Optics", "Impossible", "Define focal length.")]);
        assert!(results[0].reason.as_deref().unwrap().contains("difficulty"));
    }

    #[test]
    fn lint_is_off_by_default() {
        let results = verifier().verify(&[q("Transformers", "Easy", "Explain the solution?")]);
        assert!(results[0].valid);
    }

    #[test]
    fn lint_checks_when_enabled() {
        let v = Verifier::new(
            ["Transformers"],
            VerifierConfig {
                min_words: Some(3),
                max_words: Some(12),
                forbidden_phrases: vec!["solution".into()],
                reject_multi_part: true,
            },
        );
        let results = v.verify(&[
            q("Transformers", "Easy", "Define regulation."),
            q("Transformers", "Easy", "Give the full Solution for this core loss problem."),
            q("Transformers", "Easy", "Find (a) the core loss and (b) the efficiency."),
            q(
                "Transformers",
                "Easy",
                "one two three four five six seven eight nine ten eleven twelve thirteen",
            ),
            q("Transformers", "Easy", "Find the efficiency at half load."),
        ]);
        assert!(results[0].reason.as_deref().unwrap().contains("too short"));
        assert!(results[1].reason.as_deref().unwrap().contains("forbidden"));
        assert!(results[2].reason.as_deref().unwrap().contains("multiple"));
        assert!(results[3].reason.as_deref().unwrap().contains("too long"));
        assert!(results[4].valid);
    }

    #[test]
    fn multi_part_detection() {
        assert!(looks_multi_part("what? why? how?"));
        assert!(looks_multi_part("find ( b ) the current"));
        assert!(!looks_multi_part("find the current (in amperes)"));
        assert!(!looks_multi_part("what is the gain?"));
    }

    #[test]
    fn report_counts() {
        let questions = vec![
            q("Transformers", "Easy", "Define regulation."),
            q("Transformers", "Easy", ""),
        ];
        let report = VerificationReport::run(&verifier(), &questions);
        assert_eq!(report.total, 2);
        assert_eq!(report.valid, 1);
        assert_eq!(report.invalid, 1);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["results"][0]["concept"], "Transformers");
        assert_eq!(json["results"][1]["valid"], false);
    }
}
