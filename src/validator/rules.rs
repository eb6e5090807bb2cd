use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::config::ValidationConfig;
use crate::fidelity::StepDriftReport;
use crate::model::{GeneratedTestScenario, NOT_AN_OBJECT, TestStep, ValidationDetail};
use crate::text::Vocabulary;

const TEST_TYPES: &[&str] = &["functional", "regression", "smoke"];
const CLASSIFICATIONS: &[&str] = &["happy_path", "negative", "edge_case"];
const PRIORITIES: &[&str] = &["critical", "high", "medium", "low"];
const AUTOMATION_STATUSES: &[&str] = &["ready_for_automation", "automation_not_needed"];

pub(crate) fn required_field_issues(scenario: &GeneratedTestScenario) -> Vec<String> {
    let mut issues = Vec::new();

    require_text(&mut issues, "test_name", scenario.test_name.as_deref());
    require_text(&mut issues, "description", scenario.description.as_deref());
    require_choice(&mut issues, "test_type", scenario.test_type.as_deref(), TEST_TYPES);
    require_choice(
        &mut issues,
        "scenario_classification",
        scenario.scenario_classification.as_deref(),
        CLASSIFICATIONS,
    );
    require_choice(&mut issues, "priority", scenario.priority.as_deref(), PRIORITIES);
    require_choice(
        &mut issues,
        "automation_status",
        scenario.automation_status.as_deref(),
        AUTOMATION_STATUSES,
    );
    require_text(
        &mut issues,
        "test_repository_folder",
        scenario.test_repository_folder.as_deref(),
    );

    if scenario.preconditions.iter().all(|item| item.trim().is_empty()) {
        issues.push("Missing preconditions".to_string());
    }

    if scenario.test_steps.is_empty() {
        issues.push("Missing test_steps".to_string());
    }

    issues
}

/// Per-step required fields. Kept apart from the scenario fields because an
/// accepted correction replaces the steps they describe.
pub(crate) fn required_step_issues(steps: &[TestStep]) -> Vec<String> {
    let mut issues = Vec::new();

    for (index, step) in steps.iter().enumerate() {
        let number = index + 1;
        if step.mistyped.contains(&NOT_AN_OBJECT) {
            issues.push(format!("Step {number}: not an object"));
            continue;
        }
        for field in &step.mistyped {
            issues.push(format!("Step {number}: {field} is not a string"));
        }
        if step.action.trim().is_empty() && !step.mistyped.contains(&"action") {
            issues.push(format!("Step {number}: missing action"));
        }
        if step.expected_result.is_none() && !step.mistyped.contains(&"expected_result") {
            issues.push(format!("Step {number}: missing expected_result"));
        }
    }

    issues
}

fn require_text(issues: &mut Vec<String>, field: &str, value: Option<&str>) {
    if value.is_none_or(|value| value.trim().is_empty()) {
        issues.push(format!("Missing {field}"));
    }
}

fn require_choice(issues: &mut Vec<String>, field: &str, value: Option<&str>, allowed: &[&str]) {
    match value.map(str::trim) {
        None | Some("") => issues.push(format!("Missing {field}")),
        Some(value) if !allowed.contains(&value) => issues.push(format!(
            "Invalid {field} '{value}' (expected one of: {})",
            allowed.join(", ")
        )),
        Some(_) => {}
    }
}

pub(crate) fn step_clarity_issues(
    steps: &[TestStep],
    vocabulary: &Vocabulary,
    config: &ValidationConfig,
) -> Vec<String> {
    let markers = config
        .placeholder_markers
        .iter()
        .map(|marker| marker.to_lowercase())
        .collect::<Vec<String>>();
    let mut issues = Vec::new();

    for (index, step) in steps.iter().enumerate() {
        let number = index + 1;
        let action = step.action.trim();

        // An empty action is already a required-field issue.
        if !action.is_empty() {
            if action.chars().count() < config.min_action_length {
                issues.push(format!(
                    "Step {number}: action is shorter than {} characters",
                    config.min_action_length
                ));
            }
            if !vocabulary.contains_action_verb(action) {
                issues.push(format!("Step {number}: action contains no action verb"));
            }
        }

        if step
            .expected_result
            .as_deref()
            .is_some_and(|expected| expected.trim().is_empty())
        {
            issues.push(format!("Step {number}: expected_result is empty"));
        }

        let texts = [
            step.action.as_str(),
            step.input.as_str(),
            step.expected_result.as_deref().unwrap_or_default(),
        ];
        let has_placeholder = texts.iter().any(|text| {
            let lowered = text.to_lowercase();
            markers.iter().any(|marker| lowered.contains(marker.as_str()))
        });
        if has_placeholder {
            issues.push(format!("Step {number}: contains placeholder text"));
        }
    }

    issues
}

/// Fidelity issue string for the drifting steps, plus a critical flag when
/// the worst step is strictly above `critical_ratio`.
///
/// A step drifts when it is above either limit; the two are not ordered.
pub(crate) fn fidelity_findings(
    report: &StepDriftReport,
    critical_ratio: f64,
) -> (Option<String>, Option<ValidationDetail>) {
    let mut drifting = report.problematic_steps.clone();
    for (index, analysis) in report.analyses.iter().enumerate() {
        if analysis.new_concept_ratio > critical_ratio && !drifting.contains(&(index + 1)) {
            drifting.push(index + 1);
        }
    }
    drifting.sort_unstable();
    if drifting.is_empty() {
        return (None, None);
    }

    let steps = drifting
        .iter()
        .map(usize::to_string)
        .collect::<Vec<String>>()
        .join(", ");
    let mut new_keywords: Vec<&str> = Vec::new();
    for analysis in drifting
        .iter()
        .filter_map(|number| report.analyses.get(number - 1))
    {
        for keyword in &analysis.new_keywords {
            if !new_keywords.contains(&keyword.as_str()) {
                new_keywords.push(keyword);
            }
        }
    }

    let mut issue = format!(
        "Steps {steps} introduce concepts not found in the source specification (max drift {:.2})",
        report.max_ratio
    );
    if !new_keywords.is_empty() {
        issue.push_str(": ");
        issue.push_str(&new_keywords.join(", "));
    }
    let flag = (report.max_ratio > critical_ratio)
        .then(|| ValidationDetail::auto_correction_needed(report.max_ratio, drifting));

    (Some(issue), flag)
}

pub(crate) fn traceability_issues(
    scenario: &GeneratedTestScenario,
    expected_parent: Option<&str>,
) -> Vec<String> {
    let mut issues = Vec::new();

    if let Some(expected) = expected_parent
        && scenario.parent_jira_issue_id.as_deref() != Some(expected)
    {
        issues.push(format!(
            "parent_jira_issue_id {} does not match {expected}",
            scenario.parent_jira_issue_id.as_deref().unwrap_or("<missing>")
        ));
    }

    require_text(
        &mut issues,
        "traceability.source_confluence_page_id",
        scenario.traceability.source_confluence_page_id.as_deref(),
    );

    match scenario.traceability.generated_at.as_deref().map(str::trim) {
        None | Some("") => issues.push("Missing traceability.generated_at".to_string()),
        Some(value) if !is_timestamp(value) => {
            issues.push(format!("Invalid traceability.generated_at '{value}'"))
        }
        Some(_) => {}
    }

    issues
}

fn is_timestamp(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}
