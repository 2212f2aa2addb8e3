//! Textual similarity between a prompt and workflow metadata.
//!
//! Sørensen–Dice coefficient over sets of normalized word tokens with common
//! stop words removed. Scores are in `[0.0, 1.0]`.

use std::collections::BTreeSet;

use regex::Regex;

use crate::error::{ResolutionError, Result};

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "any", "are", "as", "at", "be", "by", "do", "every", "for", "from", "get",
    "i", "in", "into", "is", "it", "me", "my", "of", "on", "or", "our", "please", "that", "the",
    "them", "then", "this", "to", "up", "want", "we", "when", "with", "you", "your",
];

/// Tokenizer and scorer.
#[derive(Debug, Clone)]
pub struct Similarity {
    word: Regex,
}

impl Similarity {
    pub fn new() -> Result<Self> {
        let word = Regex::new(r"[a-z0-9]+")
            .map_err(|e| ResolutionError::Internal(format!("invalid token pattern: {e}")))?;
        Ok(Self { word })
    }

    /// Lowercased content words, with a trailing plural `s` dropped.
    pub fn tokens(&self, text: &str) -> BTreeSet<String> {
        let lower = text.to_lowercase();
        self.word
            .find_iter(&lower)
            .map(|m| m.as_str())
            .filter(|w| !STOP_WORDS.contains(w))
            .map(normalize)
            .collect()
    }

    /// Sørensen–Dice coefficient of the two token sets.
    pub fn score(&self, a: &str, b: &str) -> f64 {
        let a = self.tokens(a);
        let b = self.tokens(b);
        if a.is_empty() && b.is_empty() {
            return 0.0;
        }
        let shared = a.intersection(&b).count();
        (2 * shared) as f64 / (a.len() + b.len()) as f64
    }
}

fn normalize(word: &str) -> String {
    match word.strip_suffix('s') {
        Some(stem) if stem.len() >= 3 && !stem.ends_with('s') => stem.to_string(),
        _ => word.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_scores_one() {
        let sim = Similarity::new().unwrap();
        assert_eq!(sim.score("Email to Calendar", "email calendar"), 1.0);
    }

    #[test]
    fn disjoint_text_scores_zero() {
        let sim = Similarity::new().unwrap();
        assert_eq!(sim.score("slack digest", "github commits"), 0.0);
        assert_eq!(sim.score("", "  "), 0.0);
    }

    #[test]
    fn plurals_and_stop_words_are_normalized() {
        let sim = Similarity::new().unwrap();
        let tokens = sim.tokens("Turn my unread Emails into the calendar events");
        let expected: BTreeSet<String> = ["turn", "unread", "email", "calendar", "event"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(tokens, expected);
        assert!(sim.tokens("process access").contains("access"));
    }

    #[test]
    fn partial_overlap() {
        let sim = Similarity::new().unwrap();
        // {email, calendar} vs {email, drive, attachment}: 2*1 / (2+3)
        let score = sim.score("email calendar", "email drive attachments");
        assert!((score - 0.4).abs() < 1e-9);
    }
}
