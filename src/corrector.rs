use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::CorrectionConfig;
use crate::error::CorrectionError;
use crate::llm::{ChatMessage, CompletionOptions, LlmClient, ResponseFormat};
use crate::model::TestStep;
use crate::validator::JobContext;

pub const CORRECTION_REMARK: &str =
    "Test steps were rewritten automatically to use only the vocabulary of the source specification.";

const SYSTEM_PROMPT: &str = "You are a QA engineer correcting generated test steps. \
Rewrite the steps so they describe only behaviour stated in the specification, \
using the specification's own vocabulary. Keep the same number of steps in the same order. \
Every step needs a non-empty action and expected_result. \
Answer with a JSON object of the form \
{\"test_steps\":[{\"step_number\":1,\"action\":\"\",\"input\":\"\",\"expected_result\":\"\"}]} and nothing else.";

#[derive(Serialize)]
struct PromptStep<'a> {
    step_number: usize,
    action: &'a str,
    input: &'a str,
    expected_result: &'a str,
}

#[derive(Deserialize)]
struct CorrectedSteps {
    test_steps: Vec<TestStep>,
}

/// Single-shot LLM rewrite of drifting test steps.
pub struct AutoCorrector {
    client: Arc<dyn LlmClient>,
    options: CompletionOptions,
}

impl AutoCorrector {
    pub fn new(client: Arc<dyn LlmClient>, config: &CorrectionConfig) -> Self {
        Self {
            client,
            options: CompletionOptions {
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                response_format: Some(ResponseFormat::JsonObject),
            },
        }
    }

    /// Asks for corrected steps and checks their shape. The caller re-runs
    /// its own rules on the result before accepting it.
    pub async fn correct_steps(
        &self,
        source_text: &str,
        steps: &[TestStep],
        problematic_steps: &[usize],
        job: &JobContext,
    ) -> Result<Vec<TestStep>, CorrectionError> {
        if job.is_cancelled() {
            return Err(CorrectionError::Cancelled);
        }

        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_user_prompt(source_text, steps, problematic_steps)?),
        ];
        debug!(job_id = %job.job_id, steps = steps.len(), "requesting step correction");

        let call = tokio::time::timeout(
            job.llm_timeout,
            self.client.generate_completion(&messages, &self.options),
        );
        let completion = tokio::select! {
            result = call => match result {
                Ok(completion) => completion?,
                Err(_) => {
                    return Err(CorrectionError::Timeout {
                        timeout_ms: job.llm_timeout.as_millis() as u64,
                    });
                }
            },
            _ = job.cancelled() => return Err(CorrectionError::Cancelled),
        };

        let corrected = parse_corrected_steps(&completion.content, steps)?;
        info!(job_id = %job.job_id, steps = corrected.len(), "received corrected steps");
        Ok(corrected)
    }
}

fn build_user_prompt(
    source_text: &str,
    steps: &[TestStep],
    problematic_steps: &[usize],
) -> Result<String, CorrectionError> {
    let prompt_steps = steps
        .iter()
        .map(|step| PromptStep {
            step_number: step.step_number,
            action: &step.action,
            input: &step.input,
            expected_result: step.expected_result.as_deref().unwrap_or_default(),
        })
        .collect::<Vec<PromptStep<'_>>>();
    let steps_json = serde_json::to_string_pretty(&prompt_steps)?;
    let flagged = problematic_steps
        .iter()
        .map(usize::to_string)
        .collect::<Vec<String>>()
        .join(", ");

    Ok(format!(
        "Specification:\n{source_text}\n\n\
         Current test steps:\n{steps_json}\n\n\
         Steps {flagged} mention concepts that do not appear in the specification. \
         Return all {count} steps corrected.",
        count = steps.len()
    ))
}

fn parse_corrected_steps(
    raw: &str,
    original: &[TestStep],
) -> Result<Vec<TestStep>, CorrectionError> {
    let parsed: CorrectedSteps = serde_json::from_str(strip_code_fence(raw))?;
    let mut steps = parsed.test_steps;

    if steps.len() != original.len() {
        return Err(CorrectionError::StepCountChanged {
            expected: original.len(),
            actual: steps.len(),
        });
    }

    for (position, (step, previous)) in steps.iter_mut().zip(original).enumerate() {
        let step_number = position + 1;
        if step.action.trim().is_empty() {
            return Err(CorrectionError::EmptyField {
                step_number,
                field: "action",
            });
        }
        if step
            .expected_result
            .as_deref()
            .is_none_or(|expected| expected.trim().is_empty())
        {
            return Err(CorrectionError::EmptyField {
                step_number,
                field: "expected_result",
            });
        }
        step.step_number = previous.step_number;
    }

    Ok(steps)
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|character: char| character.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::LlmError;
    use crate::llm::Completion;

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

    struct SlowClient;

    #[async_trait]
    impl LlmClient for SlowClient {
        async fn generate_completion(
            &self,
            _messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> Result<Completion, LlmError> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Err(LlmError::InvalidResponse {
                provider: "fake".to_string(),
                reason: "too late".to_string(),
            })
        }
    }

    fn original_steps() -> Vec<TestStep> {
        vec![TestStep {
            step_number: 3,
            action: "Scan fingerprint".to_string(),
            input: String::new(),
            expected_result: Some("Vault unlocks".to_string()),
            ..TestStep::default()
        }]
    }

    fn corrector(client: impl LlmClient + 'static) -> AutoCorrector {
        AutoCorrector::new(Arc::new(client), &CorrectionConfig::default())
    }

    #[tokio::test]
    async fn fenced_json_is_accepted_and_numbering_kept() {
        let (job, _handle) = JobContext::new("job-1", Duration::from_secs(5));
        let reply = "```json\n{\"test_steps\":[{\"step_number\":1,\"action\":\"Click the Login button\",\"input\":\"\",\"expected_result\":\"Dashboard is shown\"}]}\n```";

        let steps = corrector(FixedClient(reply.to_string()))
            .correct_steps("spec", &original_steps(), &[1], &job)
            .await
            .expect("correction parses");

        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].step_number, 3);
        assert_eq!(steps[0].action, "Click the Login button");
    }

    #[tokio::test]
    async fn changed_step_count_is_rejected() {
        let (job, _handle) = JobContext::new("job-2", Duration::from_secs(5));
        let reply = r#"{"test_steps":[]}"#;

        let error = corrector(FixedClient(reply.to_string()))
            .correct_steps("spec", &original_steps(), &[1], &job)
            .await
            .expect_err("empty step list must fail");
        assert!(matches!(
            error,
            CorrectionError::StepCountChanged {
                expected: 1,
                actual: 0
            }
        ));
    }

    #[tokio::test]
    async fn empty_expected_result_is_rejected() {
        let (job, _handle) = JobContext::new("job-3", Duration::from_secs(5));
        let reply = r#"{"test_steps":[{"action":"Click the Login button","expected_result":"  "}]}"#;

        let error = corrector(FixedClient(reply.to_string()))
            .correct_steps("spec", &original_steps(), &[1], &job)
            .await
            .expect_err("blank expected result must fail");
        assert!(matches!(
            error,
            CorrectionError::EmptyField {
                field: "expected_result",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn non_json_reply_is_malformed() {
        let (job, _handle) = JobContext::new("job-4", Duration::from_secs(5));

        let error = corrector(FixedClient("Sure! Here are the steps.".to_string()))
            .correct_steps("spec", &original_steps(), &[1], &job)
            .await
            .expect_err("prose reply must fail");
        assert!(matches!(error, CorrectionError::MalformedResponse(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_completion_times_out() {
        let (job, _handle) = JobContext::new("job-5", Duration::from_secs(1));

        let error = corrector(SlowClient)
            .correct_steps("spec", &original_steps(), &[1], &job)
            .await
            .expect_err("slow client must time out");
        assert!(matches!(error, CorrectionError::Timeout { timeout_ms: 1000 }));
    }

    #[tokio::test]
    async fn cancellation_interrupts_pending_completion() {
        let (job, handle) = JobContext::new("job-6", Duration::from_secs(600));
        let corrector = corrector(SlowClient);
        let steps = original_steps();

        let (result, ()) = tokio::join!(
            corrector.correct_steps("spec", &steps, &[1], &job),
            async { handle.cancel() }
        );
        assert!(matches!(result, Err(CorrectionError::Cancelled)));
    }

    #[test]
    fn prompt_lists_flagged_steps_and_source() {
        let prompt = build_user_prompt("Login spec body", &original_steps(), &[1])
            .expect("prompt builds");
        assert!(prompt.contains("Login spec body"));
        assert!(prompt.contains("Steps 1 mention"));
        assert!(prompt.contains("\"action\": \"Scan fingerprint\""));
    }
}
