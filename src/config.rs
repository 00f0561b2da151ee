//! Runtime configuration loaded once from the environment (and `.env`).

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Chunking, fan-out and selection knobs for the analysis pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunking_enabled: bool,
    /// Estimated tokens a single prompt may carry (context window minus reply reserve).
    pub chunk_token_limit: usize,
    pub max_reviews_per_chunk: usize,
    pub max_concurrency: usize,
    pub top_n: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunking_enabled: true,
            chunk_token_limit: 32768 - 2000,
            max_reviews_per_chunk: 100,
            max_concurrency: 4,
            top_n: 3,
        }
    }
}

/// Backoff settings for one chunk's completion call.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            jitter: true,
        }
    }
}

/// Connection settings for the hosted completion API.
#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
    pub max_output_tokens: u32,
    pub timeout: Duration,
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            model: "mixtral-8x7b-32768".to_string(),
            max_output_tokens: 2000,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Which origins the CORS layer lets through.
#[derive(Debug, Clone, PartialEq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub static_dir: String,
    pub cors_origins: CorsOrigins,
    pub max_upload_bytes: usize,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub retry: RetryConfig,
    pub server: ServerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let max_context = env_or("MAX_CONTEXT_TOKENS", 32768usize);
        let reserve = env_or("RESERVE_TOKENS", 2000usize);
        if reserve >= max_context {
            anyhow::bail!(
                "RESERVE_TOKENS ({}) must be smaller than MAX_CONTEXT_TOKENS ({})",
                reserve,
                max_context
            );
        }

        let llm_defaults = LlmConfig::default();
        let llm = LlmConfig {
            api_key: std::env::var("GROQ_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            api_url: std::env::var("LLM_API_URL").unwrap_or(llm_defaults.api_url),
            model: std::env::var("LLM_MODEL").unwrap_or(llm_defaults.model),
            max_output_tokens: env_or("LLM_MAX_OUTPUT_TOKENS", 2000u32),
            timeout: Duration::from_secs(env_or("LLM_TIMEOUT_SECS", 60u64)),
        };

        let pipeline = PipelineConfig {
            chunking_enabled: env_flag("CHUNKING_ENABLED", true),
            chunk_token_limit: max_context - reserve,
            max_reviews_per_chunk: env_or("MAX_REVIEWS_PER_CHUNK", 100usize).max(1),
            max_concurrency: env_or("MAX_CONCURRENCY", 4usize).max(1),
            top_n: env_or("TOP_N", 3usize),
        };

        let base_ms = env_or("RETRY_BASE_MS", 1000u64);
        let retry = RetryConfig {
            enabled: env_flag("RETRY_ENABLED", true),
            max_attempts: env_or("MAX_RETRIES", 5u32).max(1),
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(env_or("RETRY_MAX_MS", 30_000u64).max(base_ms)),
            jitter: env_flag("RETRY_JITTER", true),
        };

        let bind = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let server = ServerConfig {
            bind_addr: bind
                .parse()
                .with_context(|| format!("invalid BIND_ADDR: {}", bind))?,
            static_dir: std::env::var("STATIC_DIR").unwrap_or_else(|_| "static".to_string()),
            cors_origins: parse_origins(
                &std::env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string()),
            ),
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", 10 * 1024 * 1024usize),
            request_timeout: Duration::from_secs(env_or("REQUEST_TIMEOUT_SECS", 120u64)),
        };

        Ok(Self {
            llm,
            pipeline,
            retry,
            server,
        })
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!("⚠️ Ignoring unparseable {}={:?}, using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => parse_flag(&raw).unwrap_or_else(|| {
            tracing::warn!("⚠️ Ignoring unparseable {}={:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_origins(raw: &str) -> CorsOrigins {
    let origins: Vec<String> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        CorsOrigins::Any
    } else {
        CorsOrigins::List(origins)
    }
}
