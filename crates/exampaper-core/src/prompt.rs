//! Prompt rendering for question generators and cleanup of their output.

use crate::model::{Difficulty, Slot, SlotSeed};

/// System prompt sent alongside every generation request.
pub const SYSTEM_PROMPT: &str = "You are a strict university examiner. Respond ONLY with the question text. Do not include solutions, hints, marks or commentary.";

/// Inclusive word range the prompt asks for.
pub const TARGET_WORDS: (usize, usize) = (45, 120);

/// What a question of each difficulty should demand from the candidate.
pub fn difficulty_guideline(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => {
            "Single-step conceptual recall or simple numeric substitution. \
             Provide one clear data point or condition so the question is answerable."
        }
        Difficulty::Medium => {
            "Two or three reasoning steps, blending theory with calculation. \
             State any required assumptions explicitly."
        }
        Difficulty::Hard => {
            "Multi-step reasoning or analysis of interacting phenomena. \
             Include realistic parameter values and constraints."
        }
    }
}

/// Render the user prompt for one slot.
///
/// Reused slots quote the historical pattern (when its wording is known) and
/// ask for a paraphrase with fresh values; synthesized slots ask for a new
/// question on the concept.
pub fn build_prompt(subject_name: &str, slot: &Slot) -> String {
    let subject = if subject_name.trim().is_empty() {
        "Engineering"
    } else {
        subject_name.trim()
    };
    let (min_words, max_words) = TARGET_WORDS;

    let mut prompt = format!(
        "You are an expert {subject} question setter.\n\n\
         TASK:\nGenerate ONE exam-quality {subject} question.\n\n\
         CONSTRAINTS:\n\
         - Concept: {concept}\n\
         - Difficulty: {difficulty}\n\
         - {guideline}\n\
         - Target length: {min_words}-{max_words} words, self-contained with all givens.\n\
         - Do NOT include the solution or an explanation.\n\
         - Do NOT include multiple questions or sub-parts.\n\
         - Do NOT mention marks.\n",
        concept = slot.topic_name,
        difficulty = slot.difficulty,
        guideline = difficulty_guideline(slot.difficulty),
    );

    match &slot.seed {
        SlotSeed::Reuse { record } => match record.text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => {
                prompt.push_str(&format!(
                    "\nPREVIOUSLY ASKED ({year}):\n{text}\n\
                     Paraphrase this pattern with new values; do not copy it.\n",
                    year = record.year,
                ));
            }
            _ => {
                prompt.push_str(&format!(
                    "\nThis concept was asked in {year}; follow a similar pattern with new values.\n",
                    year = record.year,
                ));
            }
        },
        SlotSeed::Synthesize => {
            prompt.push_str("\nThis concept has no recent history; write a fresh question.\n");
        }
    }

    prompt.push_str("\nOUTPUT:\nReturn ONLY the question text.\n\nQUESTION:");
    prompt
}

/// Strip the wrapping models like to add around a bare answer: code fences,
/// a leading "Question:" label and enclosing quotes.
pub fn clean_output(raw: &str) -> String {
    let mut text = raw.trim();

    if text.starts_with("```") {
        text = text.trim_start_matches('`');
        // drop an info string such as ```text
        text = match text.find('\n') {
            Some(newline) => &text[newline + 1..],
            None => text,
        };
        text = text.trim_end().trim_end_matches('`').trim();
    }

    if let Some(colon) = text.find(':') {
        if text[..colon].trim().eq_ignore_ascii_case("question") {
            text = text[colon + 1..].trim();
        }
    }

    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            text = text[1..text.len() - 1].trim();
        }
    }

    text.to_string()
}
