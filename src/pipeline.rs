//! Review analysis: chunk, classify each chunk with retries, aggregate.

use std::sync::Arc;

use futures::{stream, StreamExt, TryStreamExt};
use tracing::Instrument;

use crate::aggregate::{aggregate, AggregateResult};
use crate::chunker::{chunk_reviews, single_chunk, Chunk, ChunkLimits};
use crate::config::PipelineConfig;
use crate::error::{AnalysisError, InputError, RetryError, UpstreamError};
use crate::llm::CompletionClient;
use crate::retry::RetryPolicy;
use crate::sentiment::{build_prompt, parse_reply, prompt_overhead, LabeledReview};

/// What became of one chunk.
struct ChunkOutcome {
    chunk: usize,
    labeled: Vec<LabeledReview>,
    warning: Option<String>,
}

pub struct Analyzer {
    client: Arc<dyn CompletionClient>,
    retry: RetryPolicy,
    config: PipelineConfig,
}

impl Analyzer {
    pub fn new(client: Arc<dyn CompletionClient>, retry: RetryPolicy, config: PipelineConfig) -> Self {
        Self {
            client,
            retry,
            config,
        }
    }

    /// Classify `reviews` and fold them into proportions and top comments.
    ///
    /// A chunk whose reply cannot be parsed or whose retries run out is
    /// degraded to neutral and reported in `warnings`, as long as at least one
    /// other chunk was classified; if every chunk degrades the analysis fails
    /// with `UpstreamUnavailable`. A rejected credential aborts the whole
    /// analysis and drops any chunk calls still in flight.
    pub async fn analyze(&self, reviews: Vec<String>) -> Result<AggregateResult, AnalysisError> {
        if reviews.is_empty() {
            return Err(InputError::EmptyBatch.into());
        }

        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("analysis", %request_id, reviews = reviews.len());

        async move {
            let chunks = self.split(reviews);
            tracing::info!(
                chunks = chunks.len(),
                max_attempts = self.retry.max_attempts(),
                "🧠 Classifying reviews"
            );

            let mut outcomes: Vec<ChunkOutcome> =
                stream::iter(chunks.into_iter().map(Ok::<Chunk, AnalysisError>))
                    .map_ok(|chunk| self.process_chunk(chunk))
                    .try_buffer_unordered(self.config.max_concurrency.max(1))
                    .try_collect()
                    .await?;

            // chunk completion order is arbitrary
            outcomes.sort_by_key(|o| o.chunk);

            let mut labeled = Vec::new();
            let mut warnings = Vec::new();
            for outcome in outcomes {
                labeled.extend(outcome.labeled);
                warnings.extend(outcome.warning);
            }

            // nothing was classified, an all-neutral answer would be made up
            if labeled.iter().all(|r| r.degraded) {
                let reason = warnings.first().cloned().unwrap_or_default();
                tracing::error!(chunks = warnings.len(), "❌ Every chunk degraded");
                return Err(AnalysisError::UpstreamUnavailable(reason));
            }

            let mut result = aggregate(&labeled, self.config.top_n);
            result.warnings = warnings;
            tracing::info!(
                positive = result.positive,
                negative = result.negative,
                neutral = result.neutral,
                degraded_chunks = result.warnings.len(),
                "Analysis complete"
            );
            Ok(result)
        }
        .instrument(span)
        .await
    }

    fn split(&self, reviews: Vec<String>) -> Vec<Chunk> {
        if !self.config.chunking_enabled {
            return single_chunk(reviews);
        }
        chunk_reviews(
            reviews,
            ChunkLimits {
                max_tokens: self.config.chunk_token_limit,
                overhead: prompt_overhead(),
                max_reviews: self.config.max_reviews_per_chunk,
            },
        )
    }

    async fn process_chunk(&self, chunk: Chunk) -> Result<ChunkOutcome, AnalysisError> {
        tracing::debug!(
            chunk = chunk.index,
            reviews = chunk.reviews.len(),
            tokens = chunk.estimated_tokens(prompt_overhead()),
            "Sending chunk"
        );
        let prompt = build_prompt(&chunk);
        let prompt = prompt.as_str();
        let client = self.client.as_ref();

        let reply = self
            .retry
            .run(chunk.index, move |_attempt| client.complete(prompt))
            .await;

        let warning = match reply {
            Ok(reply) => match parse_reply(&reply, chunk.reviews.len()) {
                Ok(labels) => {
                    let labeled = chunk
                        .reviews
                        .into_iter()
                        .zip(labels)
                        .enumerate()
                        .map(|(i, (text, (sentiment, score)))| LabeledReview {
                            index: chunk.offset + i,
                            text,
                            sentiment,
                            score,
                            degraded: false,
                        })
                        .collect();
                    return Ok(ChunkOutcome {
                        chunk: chunk.index,
                        labeled,
                        warning: None,
                    });
                }
                Err(err) => {
                    tracing::warn!(chunk = chunk.index, error = %err, "⚠️ Unparseable reply, degrading chunk");
                    format!("unparseable model reply: {}", err)
                }
            },
            Err(RetryError::Fatal(UpstreamError::Auth(status))) => {
                tracing::error!(chunk = chunk.index, status, "🔐 Upstream rejected credential");
                return Err(AnalysisError::UpstreamAuth);
            }
            Err(err) => {
                tracing::warn!(chunk = chunk.index, error = %err, "⚠️ Chunk request failed, degrading chunk");
                err.to_string()
            }
        };

        let count = chunk.reviews.len();
        let first = chunk.offset + 1;
        let labeled = chunk
            .reviews
            .into_iter()
            .enumerate()
            .map(|(i, text)| LabeledReview::degraded(chunk.offset + i, text))
            .collect();

        Ok(ChunkOutcome {
            chunk: chunk.index,
            labeled,
            warning: Some(format!(
                "reviews {}-{} defaulted to neutral: {}",
                first,
                first + count - 1,
                warning
            )),
        })
    }
}
