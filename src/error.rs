use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Rejected input: nothing to analyze or a file we cannot read.
#[derive(Error, Debug, PartialEq)]
pub enum InputError {
    #[error("No reviews provided")]
    EmptyBatch,
    #[error("The uploaded file contains no reviews")]
    EmptyFile,
    #[error("Invalid file format. Please upload XLSX or CSV file")]
    UnsupportedFormat,
    #[error("Missing multipart field 'file'")]
    MissingFile,
    #[error("Could not read uploaded file: {0}")]
    Unreadable(String),
    #[error("Request body is too large")]
    TooLarge,
    #[error("Malformed request body: {0}")]
    MalformedBody(String),
}

/// Failure of a single completion attempt against the model API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("rate limit reached: {0}")]
    RateLimited(String),
    #[error("network error: {0}")]
    Transport(String),
    #[error("upstream request timed out")]
    Timeout,
    #[error("upstream server error {0}")]
    Server(u16),
    #[error("upstream rejected the credential ({0})")]
    Auth(u16),
    #[error("upstream rejected the request ({0}): {1}")]
    BadRequest(u16, String),
    #[error("upstream returned an unusable body: {0}")]
    InvalidBody(String),
}

impl UpstreamError {
    /// Rate limits and network hiccups are worth another attempt; everything else is not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            UpstreamError::RateLimited(_)
                | UpstreamError::Transport(_)
                | UpstreamError::Timeout
                | UpstreamError::Server(_)
        )
    }
}

/// The model's reply did not line up with the numbered reviews we sent.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("reply is empty")]
    EmptyReply,
    #[error("missing result for review {0}")]
    MissingIndex(usize),
    #[error("result for review {0} appears more than once")]
    DuplicateIndex(usize),
    #[error("result index {index} is outside 1..={expected}")]
    UnexpectedIndex { index: usize, expected: usize },
    #[error("unknown label {label:?} for review {index}")]
    UnknownLabel { index: usize, label: String },
    #[error("malformed score {raw:?} for review {index}")]
    MalformedScore { index: usize, raw: String },
}

/// Outcome of a retried call that never produced a value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetryError {
    #[error("request exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: UpstreamError },
    #[error("{0}")]
    Fatal(UpstreamError),
}

/// Request-level failure surfaced to HTTP clients.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("Sentiment provider rejected the configured credential")]
    UpstreamAuth,
    #[error("Sentiment provider failed for every review: {0}")]
    UpstreamUnavailable(String),
    #[error("Analysis did not finish within {0:?}")]
    Timeout(Duration),
}

#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub detail: String,
}

impl AnalysisError {
    pub fn status(&self) -> StatusCode {
        match self {
            AnalysisError::Input(InputError::TooLarge) => StatusCode::PAYLOAD_TOO_LARGE,
            AnalysisError::Input(_) => StatusCode::BAD_REQUEST,
            AnalysisError::UpstreamAuth => StatusCode::BAD_GATEWAY,
            AnalysisError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AnalysisError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("❌ Analysis failed: {}", self);
        } else {
            tracing::info!("Rejected request: {}", self);
        }
        (
            status,
            Json(ErrorBody {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}
