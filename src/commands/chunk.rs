use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use super::parse::{build_parser, read_document};
use crate::chunker::{ChunkOptions, DocumentChunker, should_chunk_document};
use crate::cli::ChunkArgs;
use crate::config::PipelineConfig;
use crate::model::{ChunkRunCounts, ChunkRunManifest, RunPaths};
use crate::text::Vocabulary;
use crate::util::{document_id_for, now_utc_string, utc_compact_string, write_json_pretty};

pub async fn run(args: ChunkArgs, config: &PipelineConfig) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));
    let chunking = args.apply_overrides(&config.chunking);

    info!(input = %args.input.display(), run_id = %run_id, "starting chunk run");

    let (buffer, filename) = read_document(&args.input)?;
    let document_id = args
        .document_id
        .clone()
        .unwrap_or_else(|| document_id_for(&buffer));

    let parser = build_parser(config);
    let parsed = parser
        .parse_document(&buffer, &filename)
        .await
        .with_context(|| format!("failed to parse {}", args.input.display()))?;

    let source_chars = parsed.raw_text.chars().count();
    let exceeds_context = should_chunk_document(source_chars, &chunking);
    if exceeds_context {
        info!(
            document_id = %document_id,
            chars = source_chars,
            max_context_tokens = chunking.max_context_tokens,
            "document exceeds context budget"
        );
    } else {
        info!(
            document_id = %document_id,
            chars = source_chars,
            "document fits context budget; chunking per section"
        );
    }

    let vocabulary = Vocabulary::load(&config.vocabulary)?;
    let options = ChunkOptions::from(&chunking);
    let section_count = parsed.sections.len();
    let chunk_document_id = document_id.clone();
    let chunk_filename = filename.clone();
    let chunked = tokio::task::spawn_blocking(move || {
        DocumentChunker::new(&vocabulary, options).chunk_document(
            &parsed.sections,
            &parsed.raw_text,
            &chunk_document_id,
            &chunk_filename,
        )
    })
    .await
    .context("chunking task did not complete")?
    .with_context(|| format!("failed to chunk {}", args.input.display()))?;

    let mut warnings = Vec::new();
    if chunked.total_chunks == 0 {
        warn!(document_id = %document_id, "document produced no chunks");
        warnings.push(format!("{filename} produced no chunks"));
    }

    let output_path = args.output.clone().unwrap_or_else(|| {
        args.out_dir
            .join("chunks")
            .join(format!("{document_id}.json"))
    });
    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        args.out_dir
            .join("manifests")
            .join(format!("chunk_run_{}.json", utc_compact_string(started_ts)))
    });

    write_json_pretty(&output_path, &chunked)?;
    info!(path = %output_path.display(), "wrote chunked document");

    let manifest = ChunkRunManifest {
        manifest_version: 1,
        run_id,
        status: "completed".to_string(),
        started_at,
        updated_at: now_utc_string(),
        command: render_chunk_command(&args),
        document_id,
        paths: RunPaths {
            input_path: args.input.display().to_string(),
            output_path: output_path.display().to_string(),
            manifest_path: manifest_path.display().to_string(),
        },
        counts: ChunkRunCounts {
            source_chars,
            sections: section_count,
            chunks: chunked.total_chunks,
            total_estimated_tokens: chunked.total_estimated_tokens,
            exceeds_context,
        },
        warnings,
    };
    write_json_pretty(&manifest_path, &manifest)?;

    info!(path = %manifest_path.display(), "wrote chunk run manifest");
    info!(
        chunks = chunked.total_chunks,
        tokens = chunked.total_estimated_tokens,
        "chunk run completed"
    );
    Ok(())
}

fn render_chunk_command(args: &ChunkArgs) -> String {
    let mut command = vec![
        "specfidelity".to_string(),
        "chunk".to_string(),
        "--input".to_string(),
        args.input.display().to_string(),
        "--out-dir".to_string(),
        args.out_dir.display().to_string(),
    ];

    if let Some(path) = &args.output {
        command.push("--output".to_string());
        command.push(path.display().to_string());
    }
    if let Some(path) = &args.manifest_path {
        command.push("--manifest-path".to_string());
        command.push(path.display().to_string());
    }
    if let Some(document_id) = &args.document_id {
        command.push("--document-id".to_string());
        command.push(document_id.clone());
    }
    if let Some(tokens) = args.target_tokens {
        command.push("--target-tokens".to_string());
        command.push(tokens.to_string());
    }
    if let Some(tokens) = args.max_tokens {
        command.push("--max-tokens".to_string());
        command.push(tokens.to_string());
    }
    if let Some(tokens) = args.overlap_tokens {
        command.push("--overlap-tokens".to_string());
        command.push(tokens.to_string());
    }
    if let Some(ratio) = args.chars_per_token {
        command.push("--chars-per-token".to_string());
        command.push(ratio.to_string());
    }

    command.join(" ")
}
