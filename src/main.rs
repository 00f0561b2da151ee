mod aggregate;
mod api;
mod chunker;
mod config;
mod error;
mod input;
mod llm;
mod pipeline;
mod retry;
mod sentiment;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use dotenv::dotenv;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{Config, CorsOrigins, ServerConfig};

#[derive(OpenApi)]
#[openapi(
    paths(api::analyze_file, api::analyze_batch, api::health),
    components(
        schemas(
            api::ReviewBatch,
            api::UploadForm,
            api::HealthResponse,
            aggregate::AggregateResult,
            error::ErrorBody
        )
    ),
    tags(
        (name = "sentiment", description = "Review Sentiment Analysis API")
    )
)]
struct ApiDoc;

fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    let allow_origin = match origins {
        CorsOrigins::Any => AllowOrigin::from(Any),
        CorsOrigins::List(list) => AllowOrigin::list(
            list.iter()
                .filter_map(|o| match o.parse::<HeaderValue>() {
                    Ok(v) => Some(v),
                    Err(_) => {
                        tracing::warn!("⚠️ Skipping invalid CORS origin {:?}", o);
                        None
                    }
                }),
        ),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

fn app(state: Arc<api::AppState>, server: &ServerConfig) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/analyze_file", post(api::analyze_file))
        .route("/analyze_batch", post(api::analyze_batch))
        .route("/health", get(api::health))
        .fallback_service(ServeDir::new(&server.static_dir)) // Serve the upload page
        .layer(DefaultBodyLimit::max(server.max_upload_bytes))
        .layer(cors_layer(&server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    tracing::debug!(?config, "Loaded configuration");
    if config.llm.api_key.is_none() {
        tracing::warn!("⚠️ GROQ_API_KEY is not set; analysis requests will fail with 502");
    }

    let client = llm::GroqClient::new(config.llm.clone())?;
    let credential_configured = client.has_credential();
    let analyzer = pipeline::Analyzer::new(
        Arc::new(client),
        retry::RetryPolicy::new(&config.retry, retry::tokio_sleeper()),
        config.pipeline.clone(),
    );

    let state = Arc::new(api::AppState {
        analyzer,
        request_timeout: config.server.request_timeout,
        model: config.llm.model.clone(),
        credential_configured,
    });

    let listener = tokio::net::TcpListener::bind(config.server.bind_addr).await?;
    tracing::info!("🚀 Listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state, &config.server)).await?;

    Ok(())
}
