use std::sync::Arc;

use async_trait::async_trait;

use super::*;
use crate::config::CorrectionConfig;
use crate::error::LlmError;
use crate::fidelity::StepDriftReport;
use crate::llm::{ChatMessage, Completion, CompletionOptions, LlmClient};
use crate::model::{InputMetadata, Traceability, ValidationNotes};
use crate::text::LevenshteinScorer;

const LOGIN_SPEC: &str =
    "User enters email and password and clicks Login. System shows dashboard.";

struct FixedClient(String);

#[async_trait]
impl LlmClient for FixedClient {
    async fn generate_completion(
        &self,
        _messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        Ok(Completion {
            content: self.0.clone(),
        })
    }
}

struct FailingClient;

#[async_trait]
impl LlmClient for FailingClient {
    async fn generate_completion(
        &self,
        _messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        Err(LlmError::RequestFailed {
            provider: "fake".to_string(),
            status: 503,
            message: "unavailable".to_string(),
        })
    }
}

/// Cancels its job from inside the completion call.
struct CancellingClient(CancelHandle);

#[async_trait]
impl LlmClient for CancellingClient {
    async fn generate_completion(
        &self,
        _messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        self.0.cancel();
        Err(LlmError::InvalidResponse {
            provider: "fake".to_string(),
            reason: "job cancelled".to_string(),
        })
    }
}

struct Fixture {
    vocabulary: Vocabulary,
    fidelity: FidelityConfig,
    validation: ValidationConfig,
}

impl Fixture {
    fn new() -> Self {
        Self {
            vocabulary: Vocabulary::default(),
            fidelity: FidelityConfig::default(),
            validation: ValidationConfig::default(),
        }
    }

    fn validator<'a>(&'a self, corrector: Option<&'a AutoCorrector>) -> ScenarioValidator<'a> {
        ScenarioValidator::new(
            &self.vocabulary,
            &LevenshteinScorer,
            &self.fidelity,
            &self.validation,
            corrector,
        )
    }
}

fn corrector(client: impl LlmClient + 'static) -> AutoCorrector {
    AutoCorrector::new(Arc::new(client), &CorrectionConfig::default())
}

fn step(number: usize, action: &str, expected_result: &str) -> TestStep {
    TestStep {
        step_number: number,
        action: action.to_string(),
        input: String::new(),
        expected_result: Some(expected_result.to_string()),
        ..TestStep::default()
    }
}

fn scenario(test_id: &str, test_steps: Vec<TestStep>) -> GeneratedTestScenario {
    GeneratedTestScenario {
        test_id: test_id.to_string(),
        test_name: Some("Login with valid credentials".to_string()),
        description: Some("User signs in and reaches the dashboard".to_string()),
        test_type: Some("functional".to_string()),
        scenario_classification: Some("happy_path".to_string()),
        priority: Some("high".to_string()),
        preconditions: vec!["User account exists".to_string()],
        test_steps,
        automation_status: Some("ready_for_automation".to_string()),
        test_repository_folder: Some("Auth/Login".to_string()),
        validation_status: None,
        validation_notes: ValidationNotes::default(),
        traceability: Traceability {
            source_confluence_page_id: Some("123456".to_string()),
            generated_at: Some("2024-05-01T10:00:00Z".to_string()),
        },
        parent_jira_issue_id: Some("PROJ-42".to_string()),
    }
}

fn grounded_scenario(test_id: &str) -> GeneratedTestScenario {
    scenario(
        test_id,
        vec![
            step(1, "Enter email and password", "Email and password are entered"),
            step(2, "Click the Login button", "Dashboard is shown"),
        ],
    )
}

fn biometric_scenario(test_id: &str) -> GeneratedTestScenario {
    scenario(
        test_id,
        vec![step(1, "Scan fingerprint and click Login", "Biometric vault unlocks")],
    )
}

fn input() -> NormalizedInput {
    NormalizedInput {
        normalized_text: LOGIN_SPEC.to_string(),
        metadata: InputMetadata {
            parent_jira_issue_id: Some("PROJ-42".to_string()),
        },
    }
}

fn job() -> (JobContext, CancelHandle) {
    JobContext::new("job-test", Duration::from_secs(5))
}

#[tokio::test]
async fn grounded_login_scenario_is_validated() {
    let fixture = Fixture::new();
    let (job, _handle) = job();

    let run = fixture
        .validator(None)
        .validate_scenarios(vec![grounded_scenario("TC-1")], &input(), &job)
        .await;

    let scenario = &run.scenarios[0];
    assert_eq!(scenario.validation_status, Some(ValidationStatus::Validated));
    assert!(scenario.validation_notes.issues.is_empty(), "{:?}", scenario.validation_notes);
    assert!(scenario.validation_notes.flags.is_empty());
    assert_eq!(run.summary.validated, 1);
    assert!(!run.cancelled);
}

#[tokio::test]
async fn biometric_drift_with_failed_correction_needs_review() {
    let fixture = Fixture::new();
    let corrector = corrector(FailingClient);
    let (job, _handle) = job();

    let run = fixture
        .validator(Some(&corrector))
        .validate_scenarios(vec![biometric_scenario("TC-2")], &input(), &job)
        .await;

    let scenario = &run.scenarios[0];
    assert_eq!(scenario.validation_status, Some(ValidationStatus::NeedsReview));
    assert_eq!(scenario.validation_notes.issues.len(), 1);
    let issue = &scenario.validation_notes.issues[0];
    assert!(
        issue.starts_with("Steps 1 introduce concepts not found in the source specification"),
        "{issue}"
    );
    assert!(issue.contains("fingerprint"));
    assert!(issue.contains("biometric"));
    assert_eq!(scenario.validation_notes.flags.len(), 1);
    assert!(scenario.validation_notes.has_critical_flag());
    assert_eq!(scenario.validation_notes.flags[0].problematic_steps, vec![1]);
    assert_eq!(scenario.test_steps[0].action, "Scan fingerprint and click Login");
    assert_eq!(run.summary.correction_failed, 1);
    assert_eq!(run.summary.needs_review, 1);
}

#[tokio::test]
async fn accepted_correction_replaces_steps_and_validates() {
    let fixture = Fixture::new();
    let corrector = corrector(FixedClient(
        r#"{"test_steps":[{"step_number":1,"action":"Click the Login button","input":"","expected_result":"Dashboard is shown"}]}"#
            .to_string(),
    ));
    let (job, _handle) = job();
    let mut drifting = biometric_scenario("TC-3");
    drifting.validation_notes.remarks = vec!["Generated from page 123456".to_string()];

    let run = fixture
        .validator(Some(&corrector))
        .validate_scenarios(vec![drifting], &input(), &job)
        .await;

    let scenario = &run.scenarios[0];
    assert_eq!(scenario.validation_status, Some(ValidationStatus::Validated));
    assert_eq!(scenario.test_steps[0].action, "Click the Login button");
    assert!(scenario.validation_notes.issues.is_empty());
    assert_eq!(scenario.validation_notes.remarks, vec![CORRECTION_REMARK]);
    // The flag that triggered correction stays on record.
    assert_eq!(scenario.validation_notes.flags.len(), 1);
    assert!(scenario.validation_notes.has_critical_flag());
    assert_eq!(run.summary.auto_corrected, 1);
}

#[tokio::test]
async fn accepted_correction_keeps_non_step_issues() {
    let fixture = Fixture::new();
    let corrector = corrector(FixedClient(
        r#"{"test_steps":[{"action":"Click the Login button","expected_result":"Dashboard is shown"}]}"#
            .to_string(),
    ));
    let (job, _handle) = job();
    let mut drifting = biometric_scenario("TC-4");
    drifting.priority = None;

    let run = fixture
        .validator(Some(&corrector))
        .validate_scenarios(vec![drifting], &input(), &job)
        .await;

    let scenario = &run.scenarios[0];
    assert_eq!(scenario.validation_status, Some(ValidationStatus::NeedsReview));
    assert_eq!(scenario.validation_notes.issues, vec!["Missing priority"]);
    assert_eq!(scenario.test_steps[0].action, "Click the Login button");
    assert_eq!(run.summary.auto_corrected, 1);
}

#[tokio::test]
async fn correction_with_unclear_steps_is_rejected() {
    let fixture = Fixture::new();
    let corrector = corrector(FixedClient(
        r#"{"test_steps":[{"action":"Login now","expected_result":"Dashboard is shown"}]}"#
            .to_string(),
    ));
    let (job, _handle) = job();

    let run = fixture
        .validator(Some(&corrector))
        .validate_scenarios(vec![biometric_scenario("TC-5")], &input(), &job)
        .await;

    let scenario = &run.scenarios[0];
    assert_eq!(scenario.validation_status, Some(ValidationStatus::NeedsReview));
    assert_eq!(scenario.test_steps[0].action, "Scan fingerprint and click Login");
    assert!(scenario.validation_notes.remarks.is_empty());
    assert_eq!(run.summary.correction_failed, 1);
}

#[tokio::test]
async fn correction_that_still_drifts_is_rejected() {
    let fixture = Fixture::new();
    let corrector = corrector(FixedClient(
        r#"{"test_steps":[{"action":"Click the fingerprint scanner","expected_result":"Biometric vault unlocks"}]}"#
            .to_string(),
    ));
    let (job, _handle) = job();

    let run = fixture
        .validator(Some(&corrector))
        .validate_scenarios(vec![biometric_scenario("TC-6")], &input(), &job)
        .await;

    assert_eq!(
        run.scenarios[0].validation_status,
        Some(ValidationStatus::NeedsReview)
    );
    assert_eq!(run.summary.correction_failed, 1);
}

#[tokio::test]
async fn moderate_drift_is_an_issue_without_correction() {
    let fixture = Fixture::new();
    let corrector = corrector(FailingClient);
    let (job, _handle) = job();
    let moderate = scenario(
        "TC-7",
        vec![step(1, "Enter email and fingerprint", "Dashboard shows vault")],
    );

    let run = fixture
        .validator(Some(&corrector))
        .validate_scenarios(vec![moderate], &input(), &job)
        .await;

    let scenario = &run.scenarios[0];
    assert_eq!(scenario.validation_status, Some(ValidationStatus::NeedsReview));
    assert!(scenario.validation_notes.flags.is_empty());
    assert_eq!(scenario.validation_notes.issues.len(), 1);
    assert_eq!(run.summary.correction_failed, 0);
}

#[tokio::test]
async fn drift_without_corrector_is_flagged_for_review() {
    let fixture = Fixture::new();
    let (job, _handle) = job();

    let run = fixture
        .validator(None)
        .validate_scenarios(vec![biometric_scenario("TC-8")], &input(), &job)
        .await;

    let scenario = &run.scenarios[0];
    assert_eq!(scenario.validation_status, Some(ValidationStatus::NeedsReview));
    assert!(scenario.validation_notes.has_critical_flag());
    assert_eq!(run.summary.correction_failed, 0);
}

#[test]
fn critical_flag_requires_ratio_strictly_above_limit() {
    let at_limit = StepDriftReport {
        analyses: Vec::new(),
        problematic_steps: vec![2],
        max_ratio: 0.6,
    };
    let (issue, flag) = fidelity_findings(&at_limit, 0.6);
    assert!(issue.is_some());
    assert!(flag.is_none());

    let above = StepDriftReport {
        max_ratio: 0.61,
        ..at_limit
    };
    let (_, flag) = fidelity_findings(&above, 0.6);
    let flag = flag.expect("0.61 raises a flag");
    assert_eq!(flag.problematic_steps, vec![2]);
    assert_eq!(flag.ratio, 0.61);
}

#[tokio::test]
async fn critical_drift_is_flagged_when_threshold_is_above_critical_ratio() {
    let mut fixture = Fixture::new();
    fixture.fidelity.threshold = 0.9;
    fixture.fidelity.critical_ratio = 0.6;
    let corrector = corrector(FailingClient);
    let (job, _handle) = job();

    let run = fixture
        .validator(Some(&corrector))
        .validate_scenarios(vec![biometric_scenario("TC-11")], &input(), &job)
        .await;

    let scenario = &run.scenarios[0];
    assert_eq!(scenario.validation_status, Some(ValidationStatus::NeedsReview));
    assert_eq!(scenario.validation_notes.flags.len(), 1);
    assert_eq!(scenario.validation_notes.flags[0].problematic_steps, vec![1]);
    assert!(
        scenario
            .validation_notes
            .issues
            .iter()
            .any(|issue| issue.starts_with("Steps 1 introduce"))
    );
    assert_eq!(run.summary.correction_failed, 1);
}

#[tokio::test]
async fn null_and_mistyped_step_fields_reach_needs_review() {
    let fixture = Fixture::new();
    let (job, _handle) = job();
    let mut raw = serde_json::to_value(grounded_scenario("TC-12")).expect("serialize scenario");
    raw["test_steps"][0]["input"] = serde_json::Value::Null;
    raw["test_steps"][1]["expected_result"] = serde_json::json!(42);
    let decoded = GeneratedTestScenario::from_value(raw).expect("lenient decode");

    let run = fixture
        .validator(None)
        .validate_scenarios(vec![decoded], &input(), &job)
        .await;

    let scenario = &run.scenarios[0];
    assert_eq!(scenario.validation_status, Some(ValidationStatus::NeedsReview));
    assert_eq!(
        scenario.validation_notes.issues,
        vec!["Step 2: expected_result is not a string"]
    );
    assert_eq!(run.summary.needs_review, 1);
}

#[test]
fn required_fields_report_each_gap() {
    let sparse = GeneratedTestScenario {
        test_id: "TC-9".to_string(),
        test_type: Some("exploratory".to_string()),
        test_steps: vec![TestStep {
            step_number: 1,
            action: String::new(),
            input: String::new(),
            expected_result: None,
            ..TestStep::default()
        }],
        ..GeneratedTestScenario::default()
    };

    let issues = required_field_issues(&sparse);
    assert!(issues.contains(&"Missing test_name".to_string()));
    assert!(issues.contains(&"Missing preconditions".to_string()));
    assert!(issues.iter().any(|issue| issue.starts_with("Invalid test_type 'exploratory'")));
    assert!(required_field_issues(&grounded_scenario("TC-10")).is_empty());

    let step_issues = required_step_issues(&sparse.test_steps);
    assert_eq!(
        step_issues,
        vec!["Step 1: missing action", "Step 1: missing expected_result"]
    );
}

#[test]
fn clarity_flags_short_actions_and_placeholders() {
    let vocabulary = Vocabulary::default();
    let steps = vec![
        step(1, "Click OK", "Dialog closes"),
        step(2, "Observe the page", "Result is TBD"),
        step(3, "Select the report [insert name]", "Report opens"),
        step(4, "Click the Login button", " "),
    ];

    let issues = step_clarity_issues(&steps, &vocabulary, &ValidationConfig::default());
    assert!(issues.contains(&"Step 1: action is shorter than 10 characters".to_string()));
    assert!(issues.contains(&"Step 2: action contains no action verb".to_string()));
    assert!(issues.contains(&"Step 2: contains placeholder text".to_string()));
    assert!(issues.contains(&"Step 3: contains placeholder text".to_string()));
    assert!(issues.contains(&"Step 4: expected_result is empty".to_string()));
}

#[test]
fn traceability_accepts_naive_timestamps_and_checks_parent() {
    let mut traced = grounded_scenario("TC-11");
    traced.traceability.generated_at = Some("2024-05-01T10:00:00".to_string());
    assert!(traceability_issues(&traced, Some("PROJ-42")).is_empty());

    traced.traceability.generated_at = Some("2024-05-01".to_string());
    assert!(traceability_issues(&traced, Some("PROJ-42")).is_empty());

    traced.traceability.generated_at = Some("yesterday".to_string());
    traced.parent_jira_issue_id = Some("PROJ-7".to_string());
    traced.traceability.source_confluence_page_id = None;
    let issues = traceability_issues(&traced, Some("PROJ-42"));
    assert_eq!(issues.len(), 3);
    assert!(issues[0].contains("PROJ-7"));
}

#[tokio::test]
async fn every_processed_scenario_ends_terminal_in_input_order() {
    let fixture = Fixture::new();
    let corrector = corrector(FailingClient);
    let (job, _handle) = job();
    let scenarios = vec![
        grounded_scenario("TC-A"),
        biometric_scenario("TC-B"),
        GeneratedTestScenario {
            test_id: "TC-C".to_string(),
            ..GeneratedTestScenario::default()
        },
    ];

    let run = fixture
        .validator(Some(&corrector))
        .validate_scenarios(scenarios, &input(), &job)
        .await;

    let ids = run
        .scenarios
        .iter()
        .map(|scenario| scenario.test_id.as_str())
        .collect::<Vec<&str>>();
    assert_eq!(ids, vec!["TC-A", "TC-B", "TC-C"]);
    for scenario in &run.scenarios {
        assert!(matches!(
            scenario.validation_status,
            Some(ValidationStatus::Validated | ValidationStatus::NeedsReview)
        ));
    }
    assert_eq!(run.summary.total, 3);
    assert_eq!(run.summary.validated + run.summary.needs_review, 3);
    assert_eq!(run.summary.unprocessed, 0);
}

#[tokio::test]
async fn dismissed_scenarios_are_left_alone() {
    let fixture = Fixture::new();
    let (job, _handle) = job();
    let mut dismissed = biometric_scenario("TC-D");
    dismissed.validation_status = Some(ValidationStatus::Dismissed);

    let run = fixture
        .validator(None)
        .validate_scenarios(vec![dismissed.clone()], &input(), &job)
        .await;

    assert_eq!(run.scenarios[0], dismissed);
    assert_eq!(run.summary.dismissed, 1);
}

#[tokio::test]
async fn cancelled_job_returns_scenarios_untouched() {
    let fixture = Fixture::new();
    let (job, handle) = job();
    handle.cancel();
    let scenarios = vec![grounded_scenario("TC-E"), grounded_scenario("TC-F")];

    let run = fixture
        .validator(None)
        .validate_scenarios(scenarios.clone(), &input(), &job)
        .await;

    assert!(run.cancelled);
    assert_eq!(run.scenarios, scenarios);
    assert_eq!(run.summary.unprocessed, 2);
}

#[tokio::test]
async fn cancellation_during_correction_stops_after_current_scenario() {
    let fixture = Fixture::new();
    let (job, handle) = job();
    let corrector = corrector(CancellingClient(handle));
    let untouched = grounded_scenario("TC-H");

    let run = fixture
        .validator(Some(&corrector))
        .validate_scenarios(vec![biometric_scenario("TC-G"), untouched.clone()], &input(), &job)
        .await;

    assert!(run.cancelled);
    assert_eq!(
        run.scenarios[0].validation_status,
        Some(ValidationStatus::NeedsReview)
    );
    assert_eq!(run.scenarios[1], untouched);
    assert_eq!(run.summary.needs_review, 1);
    assert_eq!(run.summary.unprocessed, 1);
}
