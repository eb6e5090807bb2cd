use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::cli::ValidateArgs;
use crate::config::PipelineConfig;
use crate::corrector::AutoCorrector;
use crate::llm::OpenAiClient;
use crate::model::{GeneratedTestScenario, NormalizedInput, RunPaths, ValidationRunManifest};
use crate::text::{LevenshteinScorer, Vocabulary};
use crate::util::{now_utc_string, read_json, utc_compact_string, write_json_pretty};
use crate::validator::{JobContext, ScenarioValidator};

pub async fn run(args: ValidateArgs, config: &PipelineConfig) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));
    let job_id = args
        .job_id
        .clone()
        .unwrap_or_else(|| format!("job-{}", utc_compact_string(started_ts)));

    info!(run_id = %run_id, job_id = %job_id, "starting validation run");

    let mut warnings = Vec::new();
    let raw_scenarios: Vec<Value> = read_json(&args.scenarios)?;
    let scenarios = decode_scenarios(raw_scenarios, &mut warnings);
    let input: NormalizedInput = read_json(&args.input)?;
    let vocabulary = Vocabulary::load(&config.vocabulary)?;

    let corrector = build_corrector(&args, config, &mut warnings);

    let (job, cancel) = JobContext::new(job_id.clone(), config.correction.timeout());
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current scenario");
            cancel.cancel();
        }
    });

    let validator = ScenarioValidator::new(
        &vocabulary,
        &LevenshteinScorer,
        &config.fidelity,
        &config.validation,
        corrector.as_ref(),
    );
    let outcome = validator.validate_scenarios(scenarios, &input, &job).await;
    interrupt.abort();

    if outcome.cancelled {
        warnings.push(format!(
            "job cancelled with {} scenarios unprocessed",
            outcome.summary.unprocessed
        ));
    }

    let output_path = args.output.clone().unwrap_or_else(|| {
        args.out_dir
            .join("validated")
            .join(format!("{job_id}.json"))
    });
    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        args.out_dir
            .join("manifests")
            .join(format!("validation_run_{}.json", utc_compact_string(started_ts)))
    });

    write_json_pretty(&output_path, &outcome.scenarios)?;
    info!(path = %output_path.display(), "wrote validated scenarios");

    let manifest = ValidationRunManifest {
        manifest_version: 1,
        run_id,
        job_id,
        status: if outcome.cancelled { "cancelled" } else { "completed" }.to_string(),
        started_at,
        updated_at: now_utc_string(),
        command: render_validate_command(&args),
        correction_enabled: corrector.is_some(),
        paths: RunPaths {
            input_path: args.scenarios.display().to_string(),
            output_path: output_path.display().to_string(),
            manifest_path: manifest_path.display().to_string(),
        },
        summary: outcome.summary.clone(),
        warnings,
    };
    write_json_pretty(&manifest_path, &manifest)?;

    let flagged = outcome
        .scenarios
        .iter()
        .filter(|scenario| scenario.validation_notes.has_critical_flag())
        .count();

    info!(path = %manifest_path.display(), "wrote validation run manifest");
    info!(
        validated = outcome.summary.validated,
        flagged,
        needs_review = outcome.summary.needs_review,
        auto_corrected = outcome.summary.auto_corrected,
        correction_failed = outcome.summary.correction_failed,
        "validation run completed"
    );
    Ok(())
}

/// Entries that are not objects are kept as empty scenarios so they still
/// reach a review status in their original position.
fn decode_scenarios(raw: Vec<Value>, warnings: &mut Vec<String>) -> Vec<GeneratedTestScenario> {
    raw.into_iter()
        .enumerate()
        .map(|(index, value)| {
            GeneratedTestScenario::from_value(value).unwrap_or_else(|error| {
                warn!(index, error = %error, "scenario entry is not an object");
                warnings.push(format!("scenario entry {index} is not an object: {error}"));
                GeneratedTestScenario::default()
            })
        })
        .collect()
}

fn build_corrector(
    args: &ValidateArgs,
    config: &PipelineConfig,
    warnings: &mut Vec<String>,
) -> Option<AutoCorrector> {
    if args.no_correction || !config.correction.enabled {
        info!("auto-correction disabled");
        return None;
    }

    match OpenAiClient::from_env(&config.llm) {
        Some(client) => {
            info!(
                model = %config.llm.model,
                base_url = %config.llm.base_url,
                "auto-correction enabled"
            );
            Some(AutoCorrector::new(Arc::new(client), &config.correction))
        }
        None => {
            warn!(
                env = %config.llm.api_key_env,
                "LLM API key not set; auto-correction disabled"
            );
            warnings.push(format!(
                "{} not set; critical drift was flagged but not corrected",
                config.llm.api_key_env
            ));
            None
        }
    }
}

fn render_validate_command(args: &ValidateArgs) -> String {
    let mut command = vec![
        "specfidelity".to_string(),
        "validate".to_string(),
        "--scenarios".to_string(),
        args.scenarios.display().to_string(),
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
    if let Some(job_id) = &args.job_id {
        command.push("--job-id".to_string());
        command.push(job_id.clone());
    }
    if args.no_correction {
        command.push("--no-correction".to_string());
    }

    command.join(" ")
}
