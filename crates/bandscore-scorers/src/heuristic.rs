//! Local feature-based scorer.
//!
//! Scores a response from surface features (length, vocabulary spread,
//! overlap with the task prompt and a handful of mechanical grammar checks)
//! with a fixed linear model on a raw 0–5 scale, then re-derives the score
//! on the configured native scale. No network, no model files.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;

use bandscore_core::scale::ScoreScale;
use bandscore_core::traits::{BackendVerdict, ScoreRequest, ScoringBackend};

/// Words ignored when measuring prompt overlap.
const STOPWORDS: &[&str] = &[
    "about", "after", "also", "because", "been", "being", "could", "does", "from", "have",
    "into", "more", "most", "other", "should", "some", "such", "than", "that", "their", "them",
    "then", "there", "these", "they", "this", "those", "very", "what", "when", "which", "while",
    "with", "would", "your",
];

/// Relevance assumed when the slot carries no prompt.
const NEUTRAL_RELEVANCE: f64 = 0.5;

/// Surface features of one response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub word_count: usize,
    /// Distinct words over total words.
    pub lexical_ratio: f64,
    /// Share of the prompt's content words that the response reuses.
    pub relevance: f64,
    pub grammar_issues: usize,
    /// `min(1, word_count / 60)`.
    pub content_score: f64,
}

impl Diagnostics {
    pub fn analyze(prompt: Option<&str>, text: &str) -> Self {
        let words: Vec<String> = text.split_whitespace().map(normalize_word).collect();
        let word_count = words.len();
        let distinct: HashSet<&str> = words.iter().map(String::as_str).collect();
        let lexical_ratio = distinct.len() as f64 / word_count.max(1) as f64;

        let relevance = match prompt.map(content_words) {
            Some(prompt_words) if !prompt_words.is_empty() => {
                let answer_words = content_words(text);
                prompt_words.intersection(&answer_words).count() as f64 / prompt_words.len() as f64
            }
            _ => NEUTRAL_RELEVANCE,
        };

        Self {
            word_count,
            lexical_ratio,
            relevance,
            grammar_issues: count_grammar_issues(text),
            content_score: (word_count as f64 / 60.0).min(1.0),
        }
    }

    /// Linear estimate on the raw 0–5 scale.
    pub fn raw_score(&self) -> f64 {
        if self.word_count == 0 {
            return 0.0;
        }
        let vocabulary = (self.lexical_ratio / 0.6).min(1.0);
        let grammar = (1.0 - 0.15 * self.grammar_issues as f64).max(0.0);
        let combined = 0.35 * self.content_score
            + 0.25 * vocabulary
            + 0.25 * self.relevance
            + 0.15 * grammar;
        (5.0 * combined).clamp(0.0, 5.0)
    }

    /// The four diagnostic lines followed by any pro tips.
    pub fn feedback(&self) -> Vec<String> {
        let relevance = if self.relevance >= 0.6 {
            "The response stays on topic and addresses the prompt directly."
        } else if self.relevance >= 0.35 {
            "The response is partially relevant but could focus more on the key points."
        } else {
            "The response deviates significantly from the prompt."
        };
        let coherence = if self.word_count >= 50 {
            "Ideas are logically connected and the flow is clear."
        } else if self.word_count >= 30 {
            "The response has a basic structure but could use better transitions."
        } else {
            "The response lacks sufficient depth for a coherent evaluation."
        };
        let vocabulary = if self.lexical_ratio >= 0.5 {
            "A good variety of words is used appropriately."
        } else if self.lexical_ratio >= 0.3 {
            "Vocabulary is adequate, though some repetition is noted."
        } else {
            "Vocabulary usage is quite limited and repetitive."
        };
        let grammar = if self.grammar_issues <= 2 {
            "Grammatical accuracy is generally good with few errors."
        } else if self.grammar_issues <= 5 {
            "There are some grammatical mistakes, but they do not hinder comprehension."
        } else {
            "Frequent grammatical errors impact readability."
        };

        let mut lines = vec![
            format!("Relevance: {relevance}"),
            format!("Coherence: {coherence}"),
            format!("Vocabulary: {vocabulary}"),
            format!("Grammar: {grammar}"),
        ];
        if self.word_count < 150 {
            lines.push("Tip: Increase your response length to at least 150 words.".into());
        }
        if self.lexical_ratio < 0.5 {
            lines.push("Tip: Use a wider range of vocabulary to avoid repetition.".into());
        }
        if self.grammar_issues > 3 {
            lines.push("Tip: Review grammar rules such as subject-verb agreement.".into());
        }
        lines
    }
}

fn normalize_word(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
        .to_lowercase()
}

fn content_words(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(normalize_word)
        .filter(|w| w.len() > 3 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Mechanical checks: uncapitalized sentence starts, lowercase "i" and
/// immediately repeated words.
fn count_grammar_issues(text: &str) -> usize {
    let mut issues = 0;

    for sentence in text.split(['.', '!', '?']) {
        if let Some(first) = sentence.trim_start().chars().next() {
            if first.is_lowercase() {
                issues += 1;
            }
        }
    }

    let raw: Vec<&str> = text.split_whitespace().collect();
    issues += raw.iter().filter(|w| **w == "i" || w.starts_with("i'")).count();
    issues += raw
        .windows(2)
        .filter(|pair| {
            let (a, b) = (normalize_word(pair[0]), normalize_word(pair[1]));
            !a.is_empty() && a == b
        })
        .count();

    issues
}

/// Local scorer reporting on a configurable native scale.
pub struct HeuristicScorer {
    scale: ScoreScale,
}

impl Default for HeuristicScorer {
    fn default() -> Self {
        Self::new(ScoreScale::ZeroToNine)
    }
}

impl HeuristicScorer {
    pub fn new(scale: ScoreScale) -> Self {
        Self { scale }
    }

    /// Score synchronously; the trait method just wraps this.
    pub fn evaluate(&self, request: &ScoreRequest) -> BackendVerdict {
        let diagnostics = Diagnostics::analyze(request.prompt.as_deref(), &request.text);
        let native_score = self
            .scale
            .convert_from(ScoreScale::ZeroToFive, diagnostics.raw_score());
        tracing::debug!(
            words = diagnostics.word_count,
            relevance = diagnostics.relevance,
            grammar_issues = diagnostics.grammar_issues,
            native_score,
            "heuristic score"
        );
        BackendVerdict {
            native_score,
            feedback: diagnostics.feedback(),
        }
    }
}

#[async_trait]
impl ScoringBackend for HeuristicScorer {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn scale(&self) -> ScoreScale {
        self.scale
    }

    async fn score(&self, request: &ScoreRequest) -> anyhow::Result<BackendVerdict> {
        Ok(self.evaluate(request))
    }
}
