use std::fs;
use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::AnalyzeArgs;
use crate::config::PipelineConfig;
use crate::fidelity::FidelityAnalyzer;
use crate::model::NewConceptsAnalysis;
use crate::text::{LevenshteinScorer, Vocabulary};

pub fn run(args: AnalyzeArgs, config: &PipelineConfig) -> Result<()> {
    let analysis = analyze(&args, config)?;

    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, &analysis)
        .context("failed to serialize analysis json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn analyze(args: &AnalyzeArgs, config: &PipelineConfig) -> Result<NewConceptsAnalysis> {
    let source = fs::read_to_string(&args.source)
        .with_context(|| format!("failed to read {}", args.source.display()))?;
    let target = match (&args.target, &args.target_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => bail!("either --target or --target-file is required"),
    };

    let threshold = args.threshold.unwrap_or(config.fidelity.threshold);
    if !(0.0..=1.0).contains(&threshold) {
        bail!("threshold must be within [0, 1], got {threshold}");
    }

    let vocabulary = Vocabulary::load(&config.vocabulary)?;
    let analyzer = FidelityAnalyzer::new(&vocabulary, &LevenshteinScorer, &config.fidelity);
    let analysis = analyzer.analyze_new_concepts(&source, &target, threshold);

    info!(
        ratio = analysis.new_concept_ratio,
        new_keywords = analysis.new_keywords.len(),
        total_keywords = analysis.total_keywords,
        has_new_concepts = analysis.has_new_concepts,
        "analyzed concept drift"
    );
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_reads_source_and_inline_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("spec.txt");
        fs::write(
            &source,
            "User enters email and password and clicks Login. System shows dashboard.",
        )
        .expect("write source");

        let args = AnalyzeArgs {
            source,
            target: Some("Scan fingerprint and click Login".to_string()),
            target_file: None,
            threshold: None,
        };
        let analysis = analyze(&args, &PipelineConfig::default()).expect("analysis runs");
        assert!(analysis.has_new_concepts);
        assert!(analysis.new_keywords.contains(&"fingerprint".to_string()));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("spec.txt");
        fs::write(&source, "Login page").expect("write source");

        let args = AnalyzeArgs {
            source,
            target: Some("Login".to_string()),
            target_file: None,
            threshold: Some(1.5),
        };
        assert!(analyze(&args, &PipelineConfig::default()).is_err());
    }
}
