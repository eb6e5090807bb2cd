use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::ParseArgs;
use crate::config::PipelineConfig;
use crate::structure::{PandocConverter, StructuralParser};
use crate::util::{document_id_for, write_json_pretty};

pub async fn run(args: ParseArgs, config: &PipelineConfig) -> Result<()> {
    let (buffer, filename) = read_document(&args.input)?;
    let document_id = document_id_for(&buffer);

    let parser = build_parser(config);
    let parsed = parser
        .parse_document(&buffer, &filename)
        .await
        .with_context(|| format!("failed to parse {}", args.input.display()))?;

    let output_path = args
        .output
        .unwrap_or_else(|| args.out_dir.join("parsed").join(format!("{document_id}.json")));
    write_json_pretty(&output_path, &parsed)?;

    info!(path = %output_path.display(), "wrote parsed document");
    info!(
        document_id = %document_id,
        sections = parsed.sections.len(),
        chars = parsed.raw_text.chars().count(),
        "parse completed"
    );
    Ok(())
}

/// Reads a document and returns its bytes with the file name used for
/// format detection.
pub fn read_document(path: &Path) -> Result<(Vec<u8>, String)> {
    let buffer = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("invalid UTF-8 filename: {}", path.display()))?;
    Ok((buffer, filename))
}

pub fn build_parser(config: &PipelineConfig) -> StructuralParser {
    let converter = PandocConverter::new(config.converter.pandoc_program.as_str());
    StructuralParser::new(Arc::new(converter))
}
