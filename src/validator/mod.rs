mod rules;

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use self::rules::{
    fidelity_findings, required_field_issues, required_step_issues, step_clarity_issues,
    traceability_issues,
};
use crate::config::{FidelityConfig, ValidationConfig};
use crate::corrector::{AutoCorrector, CORRECTION_REMARK};
use crate::error::CorrectionError;
use crate::fidelity::{FidelityAnalyzer, SourceKeywords};
use crate::model::{
    GeneratedTestScenario, NormalizedInput, TestStep, ValidationStatus, ValidationSummary,
};
use crate::text::{SimilarityScorer, Vocabulary};

/// Identity and cancellation state of one validation job.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: String,
    pub llm_timeout: Duration,
    cancel: watch::Receiver<bool>,
}

/// Cancels the job it was created with. Dropping it without calling
/// [`CancelHandle::cancel`] leaves the job running.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

impl JobContext {
    pub fn new(job_id: impl Into<String>, llm_timeout: Duration) -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        let context = Self {
            job_id: job_id.into(),
            llm_timeout,
            cancel: receiver,
        };
        (context, CancelHandle(sender))
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once the job is cancelled; never resolves if the handle was
    /// dropped first.
    pub async fn cancelled(&self) {
        let mut receiver = self.cancel.clone();
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationRun {
    /// Every input scenario, in input order.
    pub scenarios: Vec<GeneratedTestScenario>,
    pub summary: ValidationSummary,
    pub cancelled: bool,
}

#[derive(Debug, Default)]
struct CorrectionOutcome {
    attempted: bool,
    accepted: bool,
}

pub struct ScenarioValidator<'a> {
    vocabulary: &'a Vocabulary,
    scorer: &'a dyn SimilarityScorer,
    fidelity: &'a FidelityConfig,
    validation: &'a ValidationConfig,
    corrector: Option<&'a AutoCorrector>,
}

impl<'a> ScenarioValidator<'a> {
    pub fn new(
        vocabulary: &'a Vocabulary,
        scorer: &'a dyn SimilarityScorer,
        fidelity: &'a FidelityConfig,
        validation: &'a ValidationConfig,
        corrector: Option<&'a AutoCorrector>,
    ) -> Self {
        Self {
            vocabulary,
            scorer,
            fidelity,
            validation,
            corrector,
        }
    }

    /// Validates scenarios one at a time in input order. A cancelled job
    /// finishes the scenario in flight and returns the rest untouched.
    pub async fn validate_scenarios(
        &self,
        scenarios: Vec<GeneratedTestScenario>,
        input: &NormalizedInput,
        job: &JobContext,
    ) -> ValidationRun {
        let analyzer = FidelityAnalyzer::new(self.vocabulary, self.scorer, self.fidelity);
        let source = analyzer.source_keywords(&input.normalized_text);

        let mut summary = ValidationSummary {
            total: scenarios.len(),
            ..ValidationSummary::default()
        };
        let mut output = Vec::with_capacity(scenarios.len());
        let mut remaining = scenarios.into_iter();
        let mut cancelled = false;

        for mut scenario in remaining.by_ref() {
            if job.is_cancelled() {
                cancelled = true;
                output.push(scenario);
                break;
            }

            if scenario.validation_status == Some(ValidationStatus::Dismissed) {
                debug!(
                    job_id = %job.job_id,
                    test_id = %scenario.test_id,
                    "skipping dismissed scenario"
                );
                summary.dismissed += 1;
                output.push(scenario);
                continue;
            }

            let correction = self
                .validate_scenario(&mut scenario, &analyzer, &source, input, job)
                .await;
            if correction.accepted {
                summary.auto_corrected += 1;
            } else if correction.attempted {
                summary.correction_failed += 1;
            }
            match scenario.validation_status {
                Some(ValidationStatus::Validated) => summary.validated += 1,
                _ => summary.needs_review += 1,
            }
            output.push(scenario);
        }

        output.extend(remaining);
        summary.unprocessed =
            summary.total - summary.validated - summary.needs_review - summary.dismissed;

        if cancelled {
            warn!(
                job_id = %job.job_id,
                unprocessed = summary.unprocessed,
                "validation cancelled"
            );
        }
        info!(
            job_id = %job.job_id,
            total = summary.total,
            validated = summary.validated,
            needs_review = summary.needs_review,
            auto_corrected = summary.auto_corrected,
            "validation finished"
        );

        ValidationRun {
            scenarios: output,
            summary,
            cancelled,
        }
    }

    async fn validate_scenario(
        &self,
        scenario: &mut GeneratedTestScenario,
        analyzer: &FidelityAnalyzer<'_>,
        source: &SourceKeywords,
        input: &NormalizedInput,
        job: &JobContext,
    ) -> CorrectionOutcome {
        let mut base_issues = required_field_issues(scenario);
        base_issues.extend(traceability_issues(
            scenario,
            input.metadata.parent_jira_issue_id.as_deref(),
        ));
        let mut step_issues = required_step_issues(&scenario.test_steps);
        step_issues.extend(step_clarity_issues(
            &scenario.test_steps,
            self.vocabulary,
            self.validation,
        ));

        let report = analyzer.analyze_steps(source, &scenario.test_steps, self.fidelity.threshold);
        let (fidelity_issue, flag) = fidelity_findings(&report, self.fidelity.critical_ratio);

        let mut outcome = CorrectionOutcome::default();
        step_issues.extend(fidelity_issue);

        if let Some(flag) = flag {
            let problematic_steps = flag.problematic_steps.clone();
            scenario.validation_notes.flags.push(flag);

            if let Some(corrector) = self.corrector {
                outcome.attempted = true;
                let attempt = corrector
                    .correct_steps(
                        &input.normalized_text,
                        &scenario.test_steps,
                        &problematic_steps,
                        job,
                    )
                    .await
                    .and_then(|steps| self.recheck(steps, analyzer, source));

                match attempt {
                    Ok(steps) => {
                        info!(
                            job_id = %job.job_id,
                            test_id = %scenario.test_id,
                            steps = steps.len(),
                            "auto-correction accepted"
                        );
                        scenario.test_steps = steps;
                        scenario.validation_notes.remarks = vec![CORRECTION_REMARK.to_string()];
                        step_issues.clear();
                        outcome.accepted = true;
                    }
                    Err(error) => {
                        warn!(
                            job_id = %job.job_id,
                            test_id = %scenario.test_id,
                            error = %error,
                            "auto-correction discarded"
                        );
                    }
                }
            }
        }

        let mut issues = base_issues;
        issues.extend(step_issues);
        let status = if issues.is_empty() {
            ValidationStatus::Validated
        } else {
            ValidationStatus::NeedsReview
        };

        info!(
            job_id = %job.job_id,
            test_id = %scenario.test_id,
            status = status.as_str(),
            issues = issues.len(),
            "validated scenario"
        );
        scenario.validation_notes.issues = issues;
        scenario.validation_status = Some(status);
        if status == ValidationStatus::NeedsReview {
            debug!(test_id = %scenario.test_id, notes = %scenario.validation_notes, "review notes");
        }
        outcome
    }

    /// Corrected steps must be free of drift and pass the clarity rule.
    fn recheck(
        &self,
        steps: Vec<TestStep>,
        analyzer: &FidelityAnalyzer<'_>,
        source: &SourceKeywords,
    ) -> Result<Vec<TestStep>, CorrectionError> {
        let report = analyzer.analyze_steps(source, &steps, self.fidelity.threshold);
        let (drift_issue, _) = fidelity_findings(&report, self.fidelity.critical_ratio);
        if drift_issue.is_some() {
            return Err(CorrectionError::StillDrifting {
                problematic_steps: report.problematic_steps,
            });
        }

        let issues = step_clarity_issues(&steps, self.vocabulary, self.validation);
        if !issues.is_empty() {
            return Err(CorrectionError::ClarityRegression { issues });
        }

        Ok(steps)
    }
}

#[cfg(test)]
mod tests;
