//! Category proportions and representative comments over labeled reviews.

use serde::Serialize;
use utoipa::ToSchema;

use crate::sentiment::{LabeledReview, Sentiment};

/// Response payload of both analysis endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AggregateResult {
    #[schema(example = 0.6)]
    pub positive: f64,
    #[schema(example = 0.3)]
    pub negative: f64,
    #[schema(example = 0.1)]
    pub neutral: f64,
    pub top_positive: Vec<String>,
    pub top_negative: Vec<String>,
    pub top_neutral: Vec<String>,
    /// Chunks that fell back to neutral, one line each.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Fold labeled reviews into proportions and top-N lists.
///
/// Proportions are over every review, degraded ones counted as neutral.
/// Degraded reviews are never picked as representative comments, so a
/// `top_<category>` list only draws from reviews the model actually labeled
/// and `top_neutral` may be shorter than `top_n` even when enough neutral
/// reviews exist. Ranking is by descending score, ties going to the lower
/// input index, so the result does not depend on the order `results` arrive in.
pub fn aggregate(results: &[LabeledReview], top_n: usize) -> AggregateResult {
    let total = results.len();
    let proportion = |sentiment: Sentiment| {
        if total == 0 {
            return 0.0;
        }
        let count = results.iter().filter(|r| r.sentiment == sentiment).count();
        count as f64 / total as f64
    };

    AggregateResult {
        positive: proportion(Sentiment::Positive),
        negative: proportion(Sentiment::Negative),
        neutral: proportion(Sentiment::Neutral),
        top_positive: top_comments(results, Sentiment::Positive, top_n),
        top_negative: top_comments(results, Sentiment::Negative, top_n),
        top_neutral: top_comments(results, Sentiment::Neutral, top_n),
        warnings: Vec::new(),
    }
}

fn top_comments(results: &[LabeledReview], sentiment: Sentiment, top_n: usize) -> Vec<String> {
    let mut candidates: Vec<&LabeledReview> = results
        .iter()
        .filter(|r| r.sentiment == sentiment && !r.degraded)
        .collect();

    candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));

    candidates
        .into_iter()
        .take(top_n)
        .map(|r| r.text.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled(index: usize, text: &str, sentiment: Sentiment, score: f32) -> LabeledReview {
        LabeledReview {
            index,
            text: text.to_string(),
            sentiment,
            score,
            degraded: false,
        }
    }

    fn sample() -> Vec<LabeledReview> {
        vec![
            labeled(0, "love it", Sentiment::Positive, 0.7),
            labeled(1, "broke quickly", Sentiment::Negative, 0.9),
            labeled(2, "superb", Sentiment::Positive, 0.95),
            labeled(3, "fine", Sentiment::Neutral, 0.5),
            labeled(4, "works well", Sentiment::Positive, 0.7),
            labeled(5, "great value", Sentiment::Positive, 0.8),
            labeled(6, "as described", Sentiment::Neutral, 0.6),
        ]
    }

    #[test]
    fn test_proportions_sum_to_one() {
        let result = aggregate(&sample(), 3);
        let sum = result.positive + result.negative + result.neutral;
        assert!((sum - 1.0).abs() < 1e-9);
        assert!((result.positive - 4.0 / 7.0).abs() < 1e-9);
        assert!((result.negative - 1.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_top_n_ranked_by_score_then_index() {
        let result = aggregate(&sample(), 3);
        assert_eq!(result.top_positive, vec!["superb", "great value", "love it"]);
        assert_eq!(result.top_negative, vec!["broke quickly"]);
        assert_eq!(result.top_neutral, vec!["as described", "fine"]);
    }

    #[test]
    fn test_top_lists_bounded() {
        let input = sample();
        for n in 0..5 {
            let result = aggregate(&input, n);
            for (list, sentiment) in [
                (&result.top_positive, Sentiment::Positive),
                (&result.top_negative, Sentiment::Negative),
                (&result.top_neutral, Sentiment::Neutral),
            ] {
                let available = input.iter().filter(|r| r.sentiment == sentiment).count();
                assert!(list.len() <= n);
                assert!(list.len() <= available);
            }
        }
    }

    #[test]
    fn test_selection_independent_of_arrival_order() {
        let forward = sample();
        let mut reversed = sample();
        reversed.reverse();
        let mut rotated = sample();
        rotated.rotate_left(3);

        let expected = aggregate(&forward, 3);
        assert_eq!(aggregate(&reversed, 3), expected);
        assert_eq!(aggregate(&rotated, 3), expected);
    }

    #[test]
    fn test_degraded_counted_but_not_selected() {
        let mut input = vec![labeled(0, "good", Sentiment::Positive, 0.9)];
        input.push(LabeledReview::degraded(1, "lost in a failed chunk".to_string()));

        let result = aggregate(&input, 3);
        assert!((result.neutral - 0.5).abs() < 1e-9);
        assert!(result.top_neutral.is_empty());
        assert_eq!(result.top_positive, vec!["good"]);

        input.push(labeled(2, "it is fine", Sentiment::Neutral, 0.4));
        let result = aggregate(&input, 3);
        assert_eq!(result.top_neutral, vec!["it is fine"]);
    }

    #[test]
    fn test_empty_results() {
        let result = aggregate(&[], 3);
        assert_eq!(result.positive, 0.0);
        assert_eq!(result.negative, 0.0);
        assert_eq!(result.neutral, 0.0);
        assert!(result.top_positive.is_empty());
    }

    #[test]
    fn test_warnings_omitted_when_empty() {
        let value = serde_json::to_value(aggregate(&sample(), 3)).unwrap();
        assert!(value.get("warnings").is_none());
        assert!(value.get("top_positive").is_some());
    }
}
