//! Self-critique mode - Reflexion-style attempt, validate, critique, retry.
//!
//! Every failed attempt is critiqued against the whole attempt history, and
//! the accumulated critiques are handed to the next attempt. No critique is
//! generated after the final attempt since nothing would consume it.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{parse_json_object, preview, ModeCore, ReasoningStrategy, ReasoningTask, RunContext};
use crate::backend::{
    CompletionBackend, CompletionRequest, Message, TaskAttempt, Validation, Validator,
};
use crate::error::{EngineResult, ReasoningError};
use crate::prompts::{ATTEMPT_PROMPT, CRITIQUE_PROMPT, VALIDATOR_PROMPT};
use crate::trace::{ReasoningResult, ReasoningTrace, ThoughtStage};

/// Confidence when the validator passes without a graded score.
const DEFAULT_PASS_CONFIDENCE: f64 = 0.9;
/// Confidence when every attempt failed.
const EXHAUSTED_CONFIDENCE: f64 = 0.3;

/// Memory entry for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflexionRecord {
    /// 1-based attempt number.
    pub attempt_number: usize,
    /// What the attempt produced.
    pub outcome: String,
    /// Validator explanation of the failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critique: Option<String>,
}

/// Render the attempt history for a prompt.
pub(crate) fn render_memory(memory: &[ReflexionRecord]) -> String {
    memory
        .iter()
        .map(|r| {
            let mut block = format!(
                "Attempt {}:\n{}",
                r.attempt_number,
                preview(&r.outcome, 1_000)
            );
            if let Some(feedback) = &r.feedback {
                block.push_str(&format!("\nValidator feedback: {}", feedback));
            }
            if let Some(critique) = &r.critique {
                block.push_str(&format!("\nCritique: {}", critique));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Self-critique engine.
///
/// Trace layout: each attempt is recorded as an `act` step and each critique
/// as a `critique` step. No critique follows the final attempt, so a run that
/// uses every attempt holds `max_iterations` `act` steps and
/// `max_iterations - 1` `critique` steps.
#[derive(Clone)]
pub struct ReflexionMode {
    /// Backend access plus timeout/cancellation.
    core: ModeCore,
    attempt: Arc<dyn TaskAttempt>,
    validator: Arc<dyn Validator>,
    max_iterations: usize,
}

#[derive(Default)]
struct ReflexionState {
    trace: ReasoningTrace,
    memory: Vec<ReflexionRecord>,
    last_output: String,
}

impl ReflexionMode {
    /// Create a new self-critique engine for one run
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        attempt: Arc<dyn TaskAttempt>,
        validator: Arc<dyn Validator>,
        ctx: &RunContext,
    ) -> Self {
        Self {
            core: ModeCore::new(backend, ctx),
            attempt,
            validator,
            max_iterations: ctx.config.max_iterations.max(1),
        }
    }

    /// Run attempts until one passes or the cap is reached. Never fails.
    pub async fn run(&self, task: &ReasoningTask) -> ReasoningResult {
        let start = Instant::now();
        let strategy = ReasoningStrategy::Reflexive;
        let mut state = ReflexionState::default();

        let outcome = self.drive(task, &mut state).await;
        let latency_ms = start.elapsed().as_millis();

        match outcome {
            Ok((answer, confidence)) => {
                info!(
                    strategy = %strategy,
                    attempts = state.memory.len() + 1,
                    confidence = confidence,
                    latency_ms = latency_ms,
                    "Self-critique reasoning succeeded"
                );
                ReasoningResult::success(strategy, answer, confidence, state.trace)
            }
            Err(ReasoningError::Cancelled) => ReasoningResult::cancelled(strategy, state.trace),
            Err(bound @ ReasoningError::BoundExceeded { .. }) => {
                warn!(
                    strategy = %strategy,
                    attempts = state.memory.len(),
                    latency_ms = latency_ms,
                    "All attempts failed validation"
                );
                state.trace.record(ThoughtStage::Halt, bound.to_string());
                ReasoningResult::partial(
                    strategy,
                    state.last_output,
                    EXHAUSTED_CONFIDENCE,
                    state.trace,
                )
            }
            Err(e) => {
                warn!(strategy = %strategy, error = %e, "Self-critique reasoning aborted");
                ReasoningResult::degraded(strategy, state.last_output, state.trace, e)
            }
        }
    }

    async fn drive(
        &self,
        task: &ReasoningTask,
        state: &mut ReflexionState,
    ) -> EngineResult<(String, f64)> {
        for attempt_number in 1..=self.max_iterations {
            let output = match self
                .core
                .guarded(self.attempt.attempt(task, &state.memory))
                .await
            {
                Ok(output) => output,
                Err(ReasoningError::Cancelled) => return Err(ReasoningError::Cancelled),
                Err(e) => {
                    warn!(attempt = attempt_number, error = %e, "Attempt failed to run");
                    format!("Attempt failed: {}", e)
                }
            };
            state.last_output = output.clone();

            let validation = self.validate(&output, task).await?;
            state.trace.record(
                ThoughtStage::Act,
                format!(
                    "Attempt {} {}: {}",
                    attempt_number,
                    if validation.passed { "passed" } else { "failed" },
                    preview(&output, 500)
                ),
            );

            if validation.passed {
                let confidence = validation.graded_score.unwrap_or(DEFAULT_PASS_CONFIDENCE);
                return Ok((output, confidence));
            }

            debug!(
                attempt = attempt_number,
                feedback = ?validation.feedback,
                "Attempt failed validation"
            );
            state.memory.push(ReflexionRecord {
                attempt_number,
                outcome: output,
                feedback: validation.feedback,
                critique: None,
            });

            if attempt_number == self.max_iterations {
                break;
            }

            let critique = self.critique(task, &state.memory).await?;
            state.trace.record(ThoughtStage::Critique, critique.clone());
            if let Some(record) = state.memory.last_mut() {
                record.critique = Some(critique);
            }
        }

        Err(ReasoningError::BoundExceeded {
            bound: "Attempt".to_string(),
            limit: self.max_iterations,
        })
    }

    /// Validate under the call guard; an unreachable validator fails the attempt.
    async fn validate(&self, output: &str, task: &ReasoningTask) -> EngineResult<Validation> {
        match self
            .core
            .guarded(async { Ok(self.validator.check(output, task).await) })
            .await
        {
            Ok(validation) => Ok(validation),
            Err(ReasoningError::Cancelled) => Err(ReasoningError::Cancelled),
            Err(e) => Ok(Validation::fail(format!("Validator unavailable: {}", e))),
        }
    }

    async fn critique(
        &self,
        task: &ReasoningTask,
        memory: &[ReflexionRecord],
    ) -> EngineResult<String> {
        let messages = vec![
            Message::system(CRITIQUE_PROMPT),
            Message::user(format!(
                "Task:\n{}\n\nHistory:\n{}",
                task.render(),
                render_memory(memory)
            )),
        ];
        let completion = self.core.complete(CompletionRequest::new(messages)).await?;
        Ok(completion.text.trim().to_string())
    }
}

// ============================================================================
// Backend-driven collaborators
// ============================================================================

/// [`TaskAttempt`] that asks the completion backend for an answer.
#[derive(Clone)]
pub struct BackendAttempt {
    backend: Arc<dyn CompletionBackend>,
}

impl BackendAttempt {
    /// Create an attempt function over `backend`
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl TaskAttempt for BackendAttempt {
    async fn attempt(
        &self,
        task: &ReasoningTask,
        memory: &[ReflexionRecord],
    ) -> EngineResult<String> {
        let mut messages = vec![Message::system(ATTEMPT_PROMPT), Message::user(task.render())];
        if !memory.is_empty() {
            messages.push(Message::user(format!(
                "Lessons from earlier attempts:\n\n{}",
                render_memory(memory)
            )));
        }
        let completion = self
            .backend
            .complete(&CompletionRequest::new(messages))
            .await?;
        Ok(completion.text)
    }
}

/// [`Validator`] that asks the completion backend to grade an answer.
#[derive(Clone)]
pub struct BackendValidator {
    backend: Arc<dyn CompletionBackend>,
}

/// Grading response shape.
#[derive(Debug, Deserialize)]
struct GradeResponse {
    #[serde(default)]
    passed: bool,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    feedback: Option<String>,
}

impl BackendValidator {
    /// Create a validator over `backend`
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    fn parse_grade(completion: &str) -> Validation {
        let grade = parse_json_object(completion)
            .and_then(|v| serde_json::from_value::<GradeResponse>(v).ok());

        match grade {
            Some(grade) => {
                let validation = Validation {
                    passed: grade.passed,
                    graded_score: None,
                    feedback: grade.feedback.filter(|f| !f.trim().is_empty()),
                };
                match grade.score {
                    Some(score) if score.is_finite() => validation.with_score(score),
                    _ => validation,
                }
            }
            None => {
                warn!(
                    completion_preview = %preview(completion, 200),
                    "Validator response was not valid JSON"
                );
                Validation::fail("Validator response was not valid JSON")
            }
        }
    }
}

#[async_trait]
impl Validator for BackendValidator {
    async fn check(&self, attempt_output: &str, task: &ReasoningTask) -> Validation {
        let messages = vec![
            Message::system(VALIDATOR_PROMPT),
            Message::user(format!(
                "Task:\n{}\n\nAnswer:\n{}",
                task.render(),
                attempt_output
            )),
        ];
        match self.backend.complete(&CompletionRequest::new(messages)).await {
            Ok(completion) => Self::parse_grade(&completion.text),
            Err(e) => Validation::fail(format!("Validator unavailable: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Completion, MockCompletionBackend, MockTaskAttempt, MockValidator};
    use crate::modes::ReasoningConfig;
    use tokio_util::sync::CancellationToken;

    fn ctx(max_iterations: usize) -> RunContext {
        RunContext::new(
            ReasoningConfig::default().with_max_iterations(max_iterations),
            CancellationToken::new(),
        )
    }

    fn numbered_attempts() -> MockTaskAttempt {
        let mut attempt = MockTaskAttempt::new();
        attempt
            .expect_attempt()
            .returning(|_, memory| Ok(format!("answer v{}", memory.len() + 1)));
        attempt
    }

    fn validator_passing_on(pass_on: usize, score: Option<f64>) -> MockValidator {
        let mut validator = MockValidator::new();
        let mut calls = 0;
        validator.expect_check().returning(move |_, _| {
            calls += 1;
            if calls == pass_on {
                match score {
                    Some(s) => Validation::pass().with_score(s),
                    None => Validation::pass(),
                }
            } else {
                Validation::fail(format!("attempt {} incomplete", calls))
            }
        });
        validator
    }

    fn critic_backend(times: usize) -> MockCompletionBackend {
        let mut backend = MockCompletionBackend::new();
        let mut n = 0;
        backend.expect_complete().times(times).returning(move |_| {
            n += 1;
            Ok(Completion::text(format!("critique {}", n)))
        });
        backend
    }

    #[tokio::test]
    async fn test_passes_on_third_attempt_with_two_critiques() {
        let mode = ReflexionMode::new(
            Arc::new(critic_backend(2)),
            Arc::new(numbered_attempts()),
            Arc::new(validator_passing_on(3, None)),
            &ctx(3),
        );
        let result = mode.run(&ReasoningTask::new("write a haiku")).await;

        assert!(result.succeeded);
        assert_eq!(result.final_answer, "answer v3");
        assert!((result.confidence - 0.9).abs() < f64::EPSILON);
        assert_eq!(result.trace.count(ThoughtStage::Critique), 2);
        assert_eq!(result.trace.count(ThoughtStage::Act), 3);
    }

    #[tokio::test]
    async fn test_graded_score_becomes_confidence() {
        let mode = ReflexionMode::new(
            Arc::new(critic_backend(0)),
            Arc::new(numbered_attempts()),
            Arc::new(validator_passing_on(1, Some(0.72))),
            &ctx(3),
        );
        let result = mode.run(&ReasoningTask::new("t")).await;

        assert!(result.succeeded);
        assert!((result.confidence - 0.72).abs() < 1e-9);
        assert_eq!(result.trace.count(ThoughtStage::Critique), 0);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_return_last_output() {
        let mode = ReflexionMode::new(
            Arc::new(critic_backend(2)),
            Arc::new(numbered_attempts()),
            Arc::new(validator_passing_on(usize::MAX, None)),
            &ctx(3),
        );
        let result = mode.run(&ReasoningTask::new("t")).await;

        assert!(!result.succeeded);
        assert!((result.confidence - 0.3).abs() < f64::EPSILON);
        assert_eq!(result.final_answer, "answer v3");
        assert_eq!(result.trace.count(ThoughtStage::Act), 3);
        assert_eq!(result.trace.count(ThoughtStage::Critique), 2);
    }

    #[tokio::test]
    async fn test_critique_sees_full_history() {
        let mut backend = MockCompletionBackend::new();
        let mut seq = mockall::Sequence::new();
        backend
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Completion::text("first critique")));
        backend
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req: &CompletionRequest| {
                let history = &req.messages[1].content;
                history.contains("Attempt 1:")
                    && history.contains("Critique: first critique")
                    && history.contains("Attempt 2:")
            })
            .returning(|_| Ok(Completion::text("second critique")));

        let mut attempt = MockTaskAttempt::new();
        attempt
            .expect_attempt()
            .withf(|_, memory: &[ReflexionRecord]| {
                memory.iter().all(|r| r.critique.is_some())
            })
            .returning(|_, memory| Ok(format!("answer v{}", memory.len() + 1)));

        let mode = ReflexionMode::new(
            Arc::new(backend),
            Arc::new(attempt),
            Arc::new(validator_passing_on(3, None)),
            &ctx(3),
        );
        let result = mode.run(&ReasoningTask::new("t")).await;
        assert!(result.succeeded);
    }

    #[tokio::test]
    async fn test_critique_backend_error_degrades() {
        let mut backend = MockCompletionBackend::new();
        backend
            .expect_complete()
            .times(1)
            .returning(|_| Err(ReasoningError::backend("rate limited")));

        let mode = ReflexionMode::new(
            Arc::new(backend),
            Arc::new(numbered_attempts()),
            Arc::new(validator_passing_on(usize::MAX, None)),
            &ctx(3),
        );
        let result = mode.run(&ReasoningTask::new("t")).await;

        assert!(!result.succeeded);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.final_answer, "answer v1");
        assert_eq!(result.trace.last().map(|s| s.stage), Some(ThoughtStage::Halt));
    }

    #[tokio::test]
    async fn test_failing_attempt_counts_as_failed() {
        let mut attempt = MockTaskAttempt::new();
        let mut n = 0;
        attempt.expect_attempt().returning(move |_, _| {
            n += 1;
            if n == 1 {
                Err(ReasoningError::Timeout { timeout_ms: 10 })
            } else {
                Ok("recovered".to_string())
            }
        });

        let mut validator = MockValidator::new();
        validator
            .expect_check()
            .returning(|output, _| {
                if output == "recovered" {
                    Validation::pass()
                } else {
                    Validation::fail("no output")
                }
            });

        let mode = ReflexionMode::new(
            Arc::new(critic_backend(1)),
            Arc::new(attempt),
            Arc::new(validator),
            &ctx(3),
        );
        let result = mode.run(&ReasoningTask::new("t")).await;
        assert!(result.succeeded);
        assert_eq!(result.final_answer, "recovered");
    }

    #[test]
    fn test_parse_grade_full() {
        let v = BackendValidator::parse_grade(
            r#"{"passed": true, "score": 0.85, "feedback": "good"}"#,
        );
        assert!(v.passed);
        assert_eq!(v.graded_score, Some(0.85));
        assert_eq!(v.feedback.as_deref(), Some("good"));
    }

    #[test]
    fn test_parse_grade_clamps_and_defaults() {
        let v = BackendValidator::parse_grade(r#"Result: {"score": 4.0}"#);
        assert!(!v.passed);
        assert_eq!(v.graded_score, Some(1.0));
        assert!(v.feedback.is_none());
    }

    #[test]
    fn test_parse_grade_invalid_json_fails() {
        let v = BackendValidator::parse_grade("looks fine to me");
        assert!(!v.passed);
        assert!(v.feedback.unwrap().contains("not valid JSON"));
    }

    #[test]
    fn test_render_memory() {
        let memory = vec![ReflexionRecord {
            attempt_number: 1,
            outcome: "draft".to_string(),
            feedback: Some("too short".to_string()),
            critique: Some("expand section 2".to_string()),
        }];
        assert_eq!(
            render_memory(&memory),
            "Attempt 1:\ndraft\nValidator feedback: too short\nCritique: expand section 2"
        );
    }

    #[tokio::test]
    async fn test_backend_attempt_injects_lessons() {
        let mut backend = MockCompletionBackend::new();
        backend
            .expect_complete()
            .times(1)
            .withf(|req: &CompletionRequest| {
                req.messages.len() == 3
                    && req.messages[2].content.contains("Critique: cite sources")
            })
            .returning(|_| Ok(Completion::text("improved")));

        let attempt = BackendAttempt::new(Arc::new(backend));
        let memory = vec![ReflexionRecord {
            attempt_number: 1,
            outcome: "v1".to_string(),
            feedback: None,
            critique: Some("cite sources".to_string()),
        }];
        let out = attempt.attempt(&ReasoningTask::new("t"), &memory).await.unwrap();
        assert_eq!(out, "improved");
    }
}
