use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection, Multipart, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::aggregate::AggregateResult;
use crate::error::{AnalysisError, ErrorBody, InputError};
use crate::input;
use crate::pipeline::Analyzer;

pub struct AppState {
    pub analyzer: Analyzer,
    pub request_timeout: Duration,
    pub model: String,
    pub credential_configured: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewBatch {
    #[schema(example = json!(["Great product!", "Poor quality", "Average experience"]))]
    pub reviews: Vec<String>,
}

/// Multipart form accepted by `/analyze_file`.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// CSV or XLSX file; reviews in the first column.
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub credential_configured: bool,
}

/// Analyze reviews from an uploaded CSV or XLSX file
#[utoipa::path(
    post,
    path = "/analyze_file",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Sentiment proportions and representative comments", body = AggregateResult),
        (status = 400, description = "Unsupported, unreadable, or empty file", body = ErrorBody),
        (status = 413, description = "Upload exceeds the body limit", body = ErrorBody),
        (status = 502, description = "Sentiment provider rejected the credential", body = ErrorBody),
        (status = 503, description = "Sentiment provider failed for every chunk", body = ErrorBody),
        (status = 504, description = "Analysis timed out", body = ErrorBody)
    ),
    tag = "sentiment"
)]
pub async fn analyze_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<AggregateResult>, AnalysisError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        // reject before buffering the body
        input::FileKind::from_file_name(&file_name)?;
        let bytes = field
            .bytes()
            .await
            .map_err(multipart_error)?;
        upload = Some((file_name, bytes.to_vec()));
        break;
    }

    let (file_name, bytes) = upload.ok_or(InputError::MissingFile)?;
    tracing::info!(file = %file_name, bytes = bytes.len(), "📄 Received upload");

    let reviews = input::reviews_from_upload(&file_name, &bytes)?;
    run_analysis(&state, reviews).await.map(Json)
}

/// Analyze a JSON batch of review texts
#[utoipa::path(
    post,
    path = "/analyze_batch",
    request_body = ReviewBatch,
    responses(
        (status = 200, description = "Sentiment proportions and representative comments", body = AggregateResult),
        (status = 400, description = "Empty review list or malformed JSON", body = ErrorBody),
        (status = 413, description = "Body exceeds the body limit", body = ErrorBody),
        (status = 502, description = "Sentiment provider rejected the credential", body = ErrorBody),
        (status = 503, description = "Sentiment provider failed for every chunk", body = ErrorBody),
        (status = 504, description = "Analysis timed out", body = ErrorBody)
    ),
    tag = "sentiment"
)]
pub async fn analyze_batch(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ReviewBatch>, JsonRejection>,
) -> Result<Json<AggregateResult>, AnalysisError> {
    let Json(batch) = payload.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            InputError::TooLarge
        } else {
            InputError::MalformedBody(rejection.body_text())
        }
    })?;
    tracing::info!(reviews = batch.reviews.len(), "📨 Received batch");
    let reviews = input::reviews_from_batch(batch.reviews)?;
    run_analysis(&state, reviews).await.map(Json)
}

/// Liveness and provider configuration
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "sentiment"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.model.clone(),
        credential_configured: state.credential_configured,
    })
}

fn multipart_error(err: MultipartError) -> InputError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        InputError::TooLarge
    } else {
        InputError::Unreadable(err.body_text())
    }
}

/// All-or-nothing under the request deadline: on expiry the in-flight
/// chunk calls are dropped and no partial result is returned.
async fn run_analysis(
    state: &AppState,
    reviews: Vec<String>,
) -> Result<AggregateResult, AnalysisError> {
    tokio::time::timeout(state.request_timeout, state.analyzer.analyze(reviews))
        .await
        .map_err(|_| AnalysisError::Timeout(state.request_timeout))?
}
