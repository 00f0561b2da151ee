//! Sentiment labels, the classification prompt, and parsing of the model's reply.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::chunker::{estimate_tokens, Chunk};
use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "positive" => Some(Sentiment::Positive),
            "negative" => Some(Sentiment::Negative),
            "neutral" => Some(Sentiment::Neutral),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One review with the label and confidence the model assigned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledReview {
    /// Position of the review in the request's input.
    pub index: usize,
    pub text: String,
    pub sentiment: Sentiment,
    pub score: f32,
    /// Set when the chunk failed and the review fell back to neutral/0.0.
    pub degraded: bool,
}

impl LabeledReview {
    pub fn degraded(index: usize, text: String) -> Self {
        Self {
            index,
            text,
            sentiment: Sentiment::Neutral,
            score: 0.0,
            degraded: true,
        }
    }
}

const INSTRUCTIONS: &str = "Analyze the sentiment of each of the following reviews and classify each as positive, negative, or neutral. Also provide a confidence score between 0 and 1 for each. Return one line per review in the format '<number>. <classification>,<score>', using the same number as the review, and nothing else.";

/// Tokens the fixed part of the prompt costs, before any review is listed.
pub fn prompt_overhead() -> usize {
    // "Reviews:", "Results:" and blank lines around them
    estimate_tokens(INSTRUCTIONS) + 8
}

/// Single-message prompt listing the chunk's reviews as `1. ...`, `2. ...`.
pub fn build_prompt(chunk: &Chunk) -> String {
    let listing = chunk
        .reviews
        .iter()
        .enumerate()
        .map(|(i, review)| format!("{}. {}", i + 1, single_line(review)))
        .collect::<Vec<_>>()
        .join("\n");

    format!("{}\n\nReviews:\n{}\n\nResults:", INSTRUCTIONS, listing)
}

fn single_line(review: &str) -> String {
    review.split_whitespace().collect::<Vec<_>>().join(" ")
}

static MARKER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\s\*#>-]*(\d+)\s*[.)]\s*(.*)$").expect("marker regex")
});

static LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(positive|negative|neutral)\b").expect("label regex"));

static LABEL_SCORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(positive|negative|neutral)\b[\s,:;=(]*(-?(?:\d+(?:\.\d+)?|\.\d+))")
        .expect("label score regex")
});

static FIRST_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]+").expect("word regex"));

static SCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?(?:\d+(?:\.\d+)?|\.\d+)").expect("score regex"));

/// Parse a reply into one `(label, score)` per review, in review order.
///
/// Lines without a leading index marker are ignored. Every index in
/// `1..=expected` must appear exactly once.
pub fn parse_reply(reply: &str, expected: usize) -> Result<Vec<(Sentiment, f32)>, ParseError> {
    if reply.trim().is_empty() {
        return Err(ParseError::EmptyReply);
    }

    let mut slots: Vec<Option<(Sentiment, f32)>> = vec![None; expected];

    for line in reply.lines() {
        let Some(caps) = MARKER_LINE.captures(line) else {
            continue;
        };
        let Ok(index) = caps[1].parse::<usize>() else {
            continue;
        };
        if index == 0 || index > expected {
            return Err(ParseError::UnexpectedIndex { index, expected });
        }
        let entry = parse_entry(index, &caps[2])?;
        let slot = &mut slots[index - 1];
        if slot.is_some() {
            return Err(ParseError::DuplicateIndex(index));
        }
        *slot = Some(entry);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| slot.ok_or(ParseError::MissingIndex(i + 1)))
        .collect()
}

fn parse_entry(index: usize, body: &str) -> Result<(Sentiment, f32), ParseError> {
    // a label directly followed by its score wins over label words echoed from the review
    let (label, raw) = match LABEL_SCORE.captures_iter(body).last() {
        Some(caps) => (caps[1].to_string(), caps[2].to_string()),
        None => {
            let Some(label) = LABEL.find_iter(body).last() else {
                let label = FIRST_WORD
                    .find(body)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                return Err(ParseError::UnknownLabel { index, label });
            };
            let rest = body[label.end()..].trim();
            let raw = SCORE.find(rest).map(|m| m.as_str()).unwrap_or(rest);
            (label.as_str().to_string(), raw.to_string())
        }
    };
    // both patterns only match the three known words
    let sentiment = Sentiment::parse(&label).unwrap_or(Sentiment::Neutral);

    let malformed = || ParseError::MalformedScore {
        index,
        raw: raw.clone(),
    };
    let score: f32 = raw.parse().map_err(|_| malformed())?;
    if !(0.0..=1.0).contains(&score) {
        return Err(malformed());
    }

    Ok((sentiment, score))
}
