//! Answer matching for typed transcriptions.
//!
//! The submission and every accepted form go through the same
//! normalization (case fold, whitespace collapse, trim) and must then be
//! equal. There is no partial credit.

use serde::{Deserialize, Serialize};

use crate::model::{AcceptedAnswers, Card};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Correct,
    Incorrect,
}

impl Verdict {
    #[must_use]
    pub fn is_correct(self) -> bool {
        matches!(self, Verdict::Correct)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Correct => "correct",
            Verdict::Incorrect => "incorrect",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "correct" => Some(Verdict::Correct),
            "incorrect" => Some(Verdict::Incorrect),
            _ => None,
        }
    }
}

/// Case-fold, collapse whitespace runs to one space, and trim.
#[must_use]
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}

/// Score a submission against an accepted-answer set.
#[must_use]
pub fn score_answers(answers: &AcceptedAnswers, submitted: &str) -> Verdict {
    let submitted = normalize(submitted);
    if answers.iter().any(|form| normalize(form) == submitted) {
        Verdict::Correct
    } else {
        Verdict::Incorrect
    }
}

/// Score a submission against a card's accepted answers.
#[must_use]
pub fn score(card: &Card, submitted: &str) -> Verdict {
    score_answers(card.answers(), submitted)
}

/// Letter-mask hint shown with a prompt: `"hello world"` becomes `"h.... ....d"`.
///
/// Each word keeps one dot per letter; the first letter of the answer and the
/// last one are revealed. Returns `None` for a blank answer.
#[must_use]
pub fn letter_hint(answer: &str) -> Option<String> {
    let words: Vec<&str> = answer.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }
    let letters: Vec<char> = answer.chars().filter(|c| c.is_alphabetic()).collect();
    let (first, last) = match (letters.first(), letters.last()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => {
            let trimmed = answer.trim();
            (trimmed.chars().next()?, trimmed.chars().last()?)
        }
    };

    let mut masked: Vec<Vec<char>> = words
        .iter()
        .map(|word| {
            let count = match word.chars().filter(|c| c.is_alphabetic()).count() {
                0 => word.chars().count().max(1),
                n => n,
            };
            vec!['.'; count]
        })
        .collect();

    if let Some(first_word) = masked.first_mut() {
        first_word[0] = first;
    }
    if let Some(last_word) = masked.last_mut() {
        let end = last_word.len() - 1;
        last_word[end] = last;
    }

    Some(
        masked
            .into_iter()
            .map(|chars| chars.into_iter().collect::<String>())
            .collect::<Vec<_>>()
            .join(" "),
    )
}
