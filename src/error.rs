use std::path::PathBuf;

use thiserror::Error;

/// Structural parse failures. Fatal for the document being parsed.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unsupported document format for {filename}")]
    UnsupportedFormat { filename: String },

    #[error("document {filename} is corrupt: {reason}")]
    Corrupt { filename: String, reason: String },

    #[error("failed to launch converter '{program}' for {filename}")]
    ConverterUnavailable {
        program: String,
        filename: String,
        #[source]
        source: std::io::Error,
    },

    #[error("converter '{program}' failed for {filename} (status {status}): {stderr}")]
    ConversionFailed {
        program: String,
        filename: String,
        status: String,
        stderr: String,
    },

    #[error("converted output for {filename} is not valid UTF-8")]
    InvalidEncoding { filename: String },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChunkError {
    #[error(
        "chunk window resolves to {max_chars} characters \
         (max_tokens={max_tokens}, chars_per_token={chars_per_token})"
    )]
    InvalidWindow {
        max_chars: i64,
        max_tokens: usize,
        chars_per_token: f64,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Reasons an auto-correction attempt was discarded.
#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error("LLM completion failed")]
    Llm(#[from] LlmError),

    #[error("LLM completion timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("correction abandoned because the job was cancelled")]
    Cancelled,

    #[error("corrected steps are not valid JSON")]
    MalformedResponse(#[from] serde_json::Error),

    #[error("corrected step {step_number} has an empty {field}")]
    EmptyField {
        step_number: usize,
        field: &'static str,
    },

    #[error("corrected scenario has {actual} steps, expected {expected}")]
    StepCountChanged { expected: usize, actual: usize },

    #[error("corrected steps still drift from the specification (steps {problematic_steps:?})")]
    StillDrifting { problematic_steps: Vec<usize> },

    #[error("corrected steps fail clarity checks: {issues:?}")]
    ClarityRegression { issues: Vec<String> },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config value {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}
