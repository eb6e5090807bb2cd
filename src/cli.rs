use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::ChunkingConfig;

#[derive(Parser, Debug)]
#[command(
    name = "specfidelity",
    version,
    about = "Specification parsing, chunking and test scenario fidelity checks"
)]
pub struct Cli {
    /// Pipeline configuration (TOML). Defaults to ./specfidelity.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse a document into its section tree.
    Parse(ParseArgs),
    /// Parse and chunk a document for LLM context windows.
    Chunk(ChunkArgs),
    /// Measure concept drift of a text against a source specification.
    Analyze(AnalyzeArgs),
    /// Validate generated test scenarios against their source specification.
    Validate(ValidateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ParseArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, default_value = ".cache/specfidelity")]
    pub out_dir: PathBuf,

    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ChunkArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, default_value = ".cache/specfidelity")]
    pub out_dir: PathBuf,

    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    /// Overrides the content-derived document id.
    #[arg(long)]
    pub document_id: Option<String>,

    #[arg(long)]
    pub target_tokens: Option<usize>,

    #[arg(long)]
    pub max_tokens: Option<usize>,

    #[arg(long)]
    pub overlap_tokens: Option<usize>,

    #[arg(long)]
    pub chars_per_token: Option<f64>,
}

impl ChunkArgs {
    pub fn apply_overrides(&self, config: &ChunkingConfig) -> ChunkingConfig {
        ChunkingConfig {
            chunk_target_tokens: self.target_tokens.unwrap_or(config.chunk_target_tokens),
            chunk_max_tokens: self.max_tokens.unwrap_or(config.chunk_max_tokens),
            chunk_overlap_tokens: self.overlap_tokens.unwrap_or(config.chunk_overlap_tokens),
            chars_per_token: self.chars_per_token.unwrap_or(config.chars_per_token),
            max_context_tokens: config.max_context_tokens,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Source specification text file.
    #[arg(long)]
    pub source: PathBuf,

    /// Text to compare against the source.
    #[arg(long, conflicts_with = "target_file", required_unless_present = "target_file")]
    pub target: Option<String>,

    #[arg(long)]
    pub target_file: Option<PathBuf>,

    #[arg(long)]
    pub threshold: Option<f64>,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// JSON array of generated test scenarios.
    #[arg(long)]
    pub scenarios: PathBuf,

    /// Normalized source input (JSON with `normalized_text` and `metadata`).
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, default_value = ".cache/specfidelity")]
    pub out_dir: PathBuf,

    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long)]
    pub job_id: Option<String>,

    #[arg(long, default_value_t = false)]
    pub no_correction: bool,
}
