use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "specfidelity.toml";

/// Process-wide tunables, loaded once at start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub chunking: ChunkingConfig,
    pub fidelity: FidelityConfig,
    pub validation: ValidationConfig,
    pub correction: CorrectionConfig,
    pub vocabulary: VocabularyConfig,
    pub converter: ConverterConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_target_tokens: usize,
    pub chunk_max_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub chars_per_token: f64,
    pub max_context_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_target_tokens: 1500,
            chunk_max_tokens: 2000,
            chunk_overlap_tokens: 200,
            chars_per_token: 4.0,
            max_context_tokens: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FidelityConfig {
    pub threshold: f64,
    pub critical_ratio: f64,
    pub similarity_cutoff: f64,
}

impl Default for FidelityConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            critical_ratio: 0.6,
            similarity_cutoff: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_action_length: usize,
    pub placeholder_markers: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_action_length: 10,
            placeholder_markers: ["TODO", "TBD", "[insert", "...", "xxx"]
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    pub enabled: bool,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            temperature: 0.2,
            max_tokens: 4000,
            timeout_ms: 60_000,
        }
    }
}

impl CorrectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Optional overrides for the embedded word lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularyConfig {
    pub stopword_paths: Vec<PathBuf>,
    pub generic_terms_path: Option<PathBuf>,
    pub action_verbs_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    pub pandoc_program: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            pandoc_program: "pandoc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Loads `path` when given, else `specfidelity.toml` in the working
    /// directory if present, else built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = match path {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
                fallback.exists().then_some(fallback)
            }
        };

        let config = match resolved {
            Some(path) => {
                let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                let config = Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?;
                info!(path = %path.display(), "loaded pipeline config");
                config
            }
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_ratio("fidelity.threshold", self.fidelity.threshold)?;
        check_ratio("fidelity.critical_ratio", self.fidelity.critical_ratio)?;
        check_ratio("fidelity.similarity_cutoff", self.fidelity.similarity_cutoff)?;

        if !(self.chunking.chars_per_token.is_finite() && self.chunking.chars_per_token > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "chunking.chars_per_token",
                reason: format!("must be positive, got {}", self.chunking.chars_per_token),
            });
        }
        if self.chunking.chunk_max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                key: "chunking.chunk_max_tokens",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.chunking.chunk_target_tokens > self.chunking.chunk_max_tokens {
            return Err(ConfigError::InvalidValue {
                key: "chunking.chunk_target_tokens",
                reason: format!(
                    "target {} exceeds max {}",
                    self.chunking.chunk_target_tokens, self.chunking.chunk_max_tokens
                ),
            });
        }

        Ok(())
    }
}

fn check_ratio(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key,
            reason: format!("expected a ratio in [0, 1], got {value}"),
        })
    }
}
