//! Token-bounded grouping of reviews.
//!
//! Token counts are estimated from character length (about four characters
//! per token), which tracks the hosted model's tokenizer closely enough to
//! stay inside its context window without shipping a tokenizer.

/// Approximate characters per model token.
const CHARS_PER_TOKEN: usize = 4;

/// Estimated token cost of `text`. Never zero for non-empty text.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    (chars + CHARS_PER_TOKEN - 1) / CHARS_PER_TOKEN
}

/// Contiguous run of reviews sent in one model request.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Position of this chunk in the chunk sequence.
    pub index: usize,
    /// Global index of the first review in the chunk.
    pub offset: usize,
    pub reviews: Vec<String>,
}

impl Chunk {
    /// Estimated prompt size: fixed overhead plus every review.
    pub fn estimated_tokens(&self, overhead: usize) -> usize {
        overhead + self.reviews.iter().map(|r| estimate_tokens(r)).sum::<usize>()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkLimits {
    /// Ceiling on `overhead + sum(review tokens)` per chunk.
    pub max_tokens: usize,
    /// Tokens consumed by the prompt template itself.
    pub overhead: usize,
    /// Ceiling on reviews per chunk, so the reply fits the output budget.
    pub max_reviews: usize,
}

/// Partition `reviews` into chunks, preserving order.
///
/// A review that alone exceeds the budget becomes a singleton chunk rather
/// than being dropped.
pub fn chunk_reviews(reviews: Vec<String>, limits: ChunkLimits) -> Vec<Chunk> {
    let max_reviews = limits.max_reviews.max(1);
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_tokens = limits.overhead;
    let mut offset = 0;

    for review in reviews {
        let tokens = estimate_tokens(&review);
        let over_budget = current_tokens + tokens > limits.max_tokens;
        if !current.is_empty() && (over_budget || current.len() >= max_reviews) {
            let taken = std::mem::take(&mut current);
            let len = taken.len();
            chunks.push(Chunk {
                index: chunks.len(),
                offset,
                reviews: taken,
            });
            offset += len;
            current_tokens = limits.overhead;
        }
        current_tokens += tokens;
        current.push(review);
    }

    if !current.is_empty() {
        chunks.push(Chunk {
            index: chunks.len(),
            offset,
            reviews: current,
        });
    }

    chunks
}

/// Whole batch as one chunk, used when chunking is switched off.
pub fn single_chunk(reviews: Vec<String>) -> Vec<Chunk> {
    if reviews.is_empty() {
        return Vec::new();
    }
    vec![Chunk {
        index: 0,
        offset: 0,
        reviews,
    }]
}
