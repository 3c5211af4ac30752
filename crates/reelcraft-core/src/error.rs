use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Failure of the language-model call. Always recovered by the heuristic analysis.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Missing API key: {env_var} environment variable is not set")]
    MissingApiKey { env_var: String },

    #[error("{provider} rejected the credentials ({status})")]
    Unauthorized { provider: String, status: StatusCode },

    #[error("{provider} rate limit exceeded")]
    RateLimited { provider: String },

    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: String,
        status: StatusCode,
        body: String,
    },

    #[error("API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed analysis response: {reason}")]
    Malformed { reason: String },
}

/// Failure of one stock-footage search.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Missing API key: {env_var} environment variable is not set")]
    MissingApiKey { env_var: String },

    #[error("Search service rejected the credentials ({status})")]
    Unauthorized { status: StatusCode },

    #[error("Search service rate limit exceeded")]
    RateLimited,

    #[error("Search service returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Search request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search response could not be decoded: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to acquire clip {source_id} from {url}: {reason}")]
    Acquire {
        source_id: String,
        url: String,
        reason: String,
    },

    #[error("ffmpeg is required for encoding, but was not found on PATH")]
    FfmpegNotFound,

    #[error("Encoding failed: {message}")]
    Encode {
        message: String,
        stderr: Option<String>,
    },

    #[error("Encoder did not produce {0}")]
    MissingOutput(PathBuf),

    #[error("Render plan has no segments")]
    EmptyPlan,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal stage failures, reported by the orchestrator as `success = false`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No footage found for any of {keywords} keywords ({failed} searches failed)")]
    ResolutionFailure { keywords: usize, failed: usize },

    #[error("Insufficient footage: no usable clip to build a timeline")]
    InsufficientFootage,

    #[error("Render failed: {0}")]
    Render(#[from] RenderError),
}

/// Invalid configuration or call options; these are programmer errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Missing required API keys: {}", .0.join(", "))]
    MissingApiKeys(Vec<String>),

    #[error("Unknown {kind} preset: {name}")]
    UnknownPreset { kind: &'static str, name: String },

    #[error("Failed to create directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ReelcraftError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReelcraftError>;
