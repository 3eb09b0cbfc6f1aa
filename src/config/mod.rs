use std::env;
use std::str::FromStr;

use crate::error::AppError;
use crate::modes::{ReasoningConfig, ReasoningStrategy};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub langbase: LangbaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    /// Defaults applied to every reasoning run.
    pub reasoning: ReasoningConfig,
}

/// Langbase API configuration
#[derive(Debug, Clone)]
pub struct LangbaseConfig {
    pub api_key: String,
    pub base_url: String,
    /// Pipe every completion call is routed through.
    pub pipe_name: String,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Parse an environment variable, falling back to `default` when unset or invalid.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let langbase = LangbaseConfig {
            api_key: env::var("LANGBASE_API_KEY").map_err(|_| AppError::Config {
                message: "LANGBASE_API_KEY is required".to_string(),
            })?,
            base_url: env::var("LANGBASE_BASE_URL")
                .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
            pipe_name: env::var("LANGBASE_PIPE")
                .unwrap_or_else(|_| "reasoning-orchestrator-v1".to_string()),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let defaults = RequestConfig::default();
        let request = RequestConfig {
            timeout_ms: env_or("REQUEST_TIMEOUT_MS", defaults.timeout_ms),
            max_retries: env_or("MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: env_or("RETRY_DELAY_MS", defaults.retry_delay_ms),
        };

        Ok(Config {
            langbase,
            logging,
            request,
            reasoning: reasoning_from_env()?,
        })
    }
}

/// Reasoning defaults from `REASONING_*` variables.
fn reasoning_from_env() -> Result<ReasoningConfig, AppError> {
    let d = ReasoningConfig::default();

    let mut config = ReasoningConfig::default()
        .with_max_iterations(env_or("REASONING_MAX_ITERATIONS", d.max_iterations))
        .with_max_rounds(env_or("REASONING_MAX_ROUNDS", d.max_rounds))
        .with_max_depth(env_or("REASONING_MAX_DEPTH", d.max_depth))
        .with_branch_factor(env_or("REASONING_BRANCH_FACTOR", d.branch_factor))
        .with_beam_width(env_or("REASONING_BEAM_WIDTH", d.beam_width))
        .with_debater_count(env_or("REASONING_DEBATER_COUNT", d.debater_count))
        .with_confidence_floor(env_or("REASONING_CONFIDENCE_FLOOR", d.confidence_floor))
        .with_call_timeout_ms(env_or("REASONING_CALL_TIMEOUT_MS", d.call_timeout_ms));

    if let Ok(name) = env::var("REASONING_STRATEGY") {
        if !name.trim().is_empty() {
            let strategy = name
                .parse::<ReasoningStrategy>()
                .map_err(|message| AppError::Config { message })?;
            config = config.with_strategy(strategy);
        }
    }

    Ok(config)
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}
