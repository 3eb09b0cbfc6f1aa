//! Iterative tool-use mode - ReAct-style think → act → observe loop.
//!
//! Each iteration sends the accumulated conversation to the backend. Tool
//! requests are executed one at a time, in request order, and their results
//! (including failures) are fed back as observations. A response without tool
//! requests is the final answer.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::{preview, ModeCore, ReasoningStrategy, ReasoningTask, RunContext};
use crate::backend::{
    CompletionBackend, CompletionRequest, Message, ToolCall, ToolDeclaration, ToolExecutor,
    ToolOutcome,
};
use crate::error::{EngineResult, ReasoningError};
use crate::prompts::REACT_SYSTEM_PROMPT;
use crate::trace::{ReasoningResult, ReasoningTrace, ThoughtStage};

/// Confidence reported for a final answer.
const ANSWER_CONFIDENCE: f64 = 0.8;
/// Upper bound on confidence when the iteration cap is hit.
const PARTIAL_CONFIDENCE_CAP: f64 = 0.5;

/// Iterative tool-use engine.
#[derive(Clone)]
pub struct ReactMode {
    /// Backend access plus timeout/cancellation.
    core: ModeCore,
    /// Sandbox that runs requested tools.
    tools: Arc<dyn ToolExecutor>,
    max_iterations: usize,
}

/// Mutable state of one loop run.
#[derive(Default)]
struct LoopState {
    trace: ReasoningTrace,
    last_text: Option<String>,
    iterations: usize,
}

impl ReactMode {
    /// Create a new iterative tool-use engine for one run
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        tools: Arc<dyn ToolExecutor>,
        ctx: &RunContext,
    ) -> Self {
        Self {
            core: ModeCore::new(backend, ctx),
            tools,
            max_iterations: ctx.config.max_iterations.max(1),
        }
    }

    /// Run the loop to completion. Never fails.
    pub async fn run(&self, task: &ReasoningTask) -> ReasoningResult {
        let start = Instant::now();
        let strategy = ReasoningStrategy::Iterative;
        let mut state = LoopState::default();

        let outcome = self.drive(task, &mut state).await;
        let latency_ms = start.elapsed().as_millis();

        match outcome {
            Ok(answer) => {
                info!(
                    strategy = %strategy,
                    iterations = state.iterations,
                    latency_ms = latency_ms,
                    "Iterative reasoning completed"
                );
                ReasoningResult::success(strategy, answer, ANSWER_CONFIDENCE, state.trace)
            }
            Err(ReasoningError::Cancelled) => {
                info!(strategy = %strategy, iterations = state.iterations, "Iterative reasoning cancelled");
                ReasoningResult::cancelled(strategy, state.trace)
            }
            Err(bound @ ReasoningError::BoundExceeded { .. }) => {
                warn!(
                    strategy = %strategy,
                    iterations = state.iterations,
                    latency_ms = latency_ms,
                    "Iteration cap reached without a final answer"
                );
                state.trace.record(ThoughtStage::Halt, bound.to_string());
                let partial = state.last_text.unwrap_or_default();
                let confidence = if partial.trim().is_empty() {
                    0.0
                } else {
                    PARTIAL_CONFIDENCE_CAP
                };
                ReasoningResult::partial(strategy, partial, confidence, state.trace)
            }
            Err(e) => {
                warn!(strategy = %strategy, error = %e, "Iterative reasoning aborted");
                let partial = state.last_text.unwrap_or_default();
                ReasoningResult::degraded(strategy, partial, state.trace, e)
            }
        }
    }

    async fn drive(&self, task: &ReasoningTask, state: &mut LoopState) -> EngineResult<String> {
        let declarations = self.advertised_tools(task);
        let mut messages = self.build_messages(task, &declarations);

        for iteration in 1..=self.max_iterations {
            state.iterations = iteration;
            debug!(iteration = iteration, "Thinking");

            let request = CompletionRequest::new(messages.clone()).with_tools(declarations.clone());
            let completion = self.core.complete(request).await?;

            let thought = if completion.text.trim().is_empty() {
                "(no reasoning text)".to_string()
            } else {
                state.last_text = Some(completion.text.clone());
                completion.text.clone()
            };
            state.trace.record(ThoughtStage::Think, thought);

            if !completion.has_tool_calls() {
                return Ok(completion.text);
            }

            messages.push(Message::assistant_with_calls(
                completion.text.clone(),
                completion.tool_calls.clone(),
            ));

            for call in &completion.tool_calls {
                self.core.ensure_active()?;
                let observation = self.act(task, call, &mut state.trace).await?;
                state.trace.record(ThoughtStage::Observe, observation.clone());
                messages.push(Message::tool(&call.id, observation));
            }
        }

        Err(ReasoningError::BoundExceeded {
            bound: "Iteration".to_string(),
            limit: self.max_iterations,
        })
    }

    /// Execute one tool call and return the observation text.
    async fn act(
        &self,
        task: &ReasoningTask,
        call: &ToolCall,
        trace: &mut ReasoningTrace,
    ) -> EngineResult<String> {
        trace.record(
            ThoughtStage::Act,
            format!("{}({})", call.name, call.arguments),
        );

        let outcome = if task.allows_tool(&call.name) {
            self.core
                .execute_tool(self.tools.as_ref(), &call.name, &call.arguments)
                .await?
        } else {
            ToolOutcome::failed(
                ReasoningError::Tool {
                    tool_name: call.name.clone(),
                    message: "tool is not available for this task".to_string(),
                }
                .to_string(),
            )
        };

        if !outcome.success {
            warn!(
                tool = %call.name,
                error = %outcome.error.as_deref().unwrap_or_default(),
                "Tool call failed; continuing with error observation"
            );
        } else {
            debug!(tool = %call.name, output = %preview(&outcome.output, 120), "Tool call succeeded");
        }

        Ok(outcome.observation())
    }

    fn advertised_tools(&self, task: &ReasoningTask) -> Vec<ToolDeclaration> {
        self.tools
            .declarations()
            .into_iter()
            .filter(|d| task.allows_tool(&d.name))
            .collect()
    }

    fn build_messages(&self, task: &ReasoningTask, tools: &[ToolDeclaration]) -> Vec<Message> {
        let names = if tools.is_empty() {
            "none".to_string()
        } else {
            tools
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };

        vec![
            Message::system(REACT_SYSTEM_PROMPT.replace("{tools}", &names)),
            Message::user(task.render()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        Completion, MockCompletionBackend, MockToolExecutor, ToolDeclaration,
    };
    use crate::modes::ReasoningConfig;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn declaration(name: &str) -> ToolDeclaration {
        ToolDeclaration {
            name: name.to_string(),
            description: format!("{} tool", name),
            parameters: json!({"type": "object"}),
        }
    }

    fn executor_with(names: &'static [&'static str]) -> MockToolExecutor {
        let mut tools = MockToolExecutor::new();
        tools
            .expect_declarations()
            .returning(move || names.iter().map(|n| declaration(n)).collect());
        tools
    }

    fn search_call(id: &str) -> Completion {
        Completion::with_tool_calls(
            format!("I should search ({})", id),
            vec![ToolCall::new(id, "search", json!({"q": "rust"}))],
        )
    }

    fn ctx(max_iterations: usize) -> RunContext {
        RunContext::new(
            ReasoningConfig::default().with_max_iterations(max_iterations),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_tool_then_answer_takes_two_iterations() {
        let mut backend = MockCompletionBackend::new();
        let mut seq = mockall::Sequence::new();
        backend
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(search_call("c1")));
        backend
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Completion::text("Rust is a systems language.")));

        let mut tools = executor_with(&["search"]);
        tools
            .expect_execute()
            .times(1)
            .returning(|_, _| ToolOutcome::ok("search results"));

        let mode = ReactMode::new(Arc::new(backend), Arc::new(tools), &ctx(5));
        let result = mode.run(&ReasoningTask::new("What is Rust?")).await;

        assert!(result.succeeded);
        assert_eq!(result.final_answer, "Rust is a systems language.");
        assert_eq!(result.trace.count(ThoughtStage::Think), 2);
        let stages: Vec<_> = result.trace.steps().iter().map(|s| s.stage).collect();
        assert_eq!(
            stages,
            vec![
                ThoughtStage::Think,
                ThoughtStage::Act,
                ThoughtStage::Observe,
                ThoughtStage::Think
            ]
        );
    }

    #[tokio::test]
    async fn test_iteration_cap_yields_partial_result() {
        let mut backend = MockCompletionBackend::new();
        backend
            .expect_complete()
            .times(3)
            .returning(|_| Ok(search_call("again")));

        let mut tools = executor_with(&["search"]);
        tools
            .expect_execute()
            .times(3)
            .returning(|_, _| ToolOutcome::ok("nothing new"));

        let mode = ReactMode::new(Arc::new(backend), Arc::new(tools), &ctx(3));
        let result = mode.run(&ReasoningTask::new("loop forever")).await;

        assert!(!result.succeeded);
        assert!(result.confidence <= 0.5);
        assert_eq!(result.final_answer, "I should search (again)");
        assert_eq!(result.trace.count(ThoughtStage::Think), 3);
    }

    #[tokio::test]
    async fn test_tool_failure_becomes_observation() {
        let mut backend = MockCompletionBackend::new();
        let mut seq = mockall::Sequence::new();
        backend
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(search_call("c1")));
        backend
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req: &CompletionRequest| {
                req.messages
                    .last()
                    .map(|m| m.content.starts_with("Error: index offline"))
                    .unwrap_or(false)
            })
            .returning(|_| Ok(Completion::text("Answer without search")));

        let mut tools = executor_with(&["search"]);
        tools
            .expect_execute()
            .times(1)
            .returning(|_, _| ToolOutcome::failed("index offline"));

        let mode = ReactMode::new(Arc::new(backend), Arc::new(tools), &ctx(5));
        let result = mode.run(&ReasoningTask::new("q")).await;

        assert!(result.succeeded);
        let observation = result.trace.steps_in(ThoughtStage::Observe).next().unwrap();
        assert_eq!(observation.content, "Error: index offline");
    }

    #[tokio::test]
    async fn test_disallowed_tool_is_not_executed() {
        let mut backend = MockCompletionBackend::new();
        let mut seq = mockall::Sequence::new();
        backend
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|req: &CompletionRequest| {
                req.tools.len() == 1 && req.tools[0].name == "read_file"
            })
            .returning(|_| {
                Ok(Completion::with_tool_calls(
                    "",
                    vec![ToolCall::new("c1", "shell", json!({"cmd": "rm -rf /"}))],
                ))
            });
        backend
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Completion::text("done")));

        let mut tools = executor_with(&["read_file", "shell"]);
        tools.expect_execute().times(0);

        let task = ReasoningTask::new("inspect").with_tool("read_file");
        let mode = ReactMode::new(Arc::new(backend), Arc::new(tools), &ctx(5));
        let result = mode.run(&task).await;

        assert!(result.succeeded);
        let observation = result.trace.steps_in(ThoughtStage::Observe).next().unwrap();
        assert!(observation.content.contains("Tool shell failed"));
    }

    #[tokio::test]
    async fn test_backend_error_yields_degraded_result() {
        let mut backend = MockCompletionBackend::new();
        backend
            .expect_complete()
            .times(1)
            .returning(|_| Err(ReasoningError::backend("503 from upstream")));

        let mode = ReactMode::new(Arc::new(backend), Arc::new(executor_with(&[])), &ctx(5));
        let result = mode.run(&ReasoningTask::new("q")).await;

        assert!(!result.succeeded);
        assert_eq!(result.confidence, 0.0);
        let last = result.trace.last().unwrap();
        assert_eq!(last.stage, ThoughtStage::Halt);
        assert!(last.content.contains("503 from upstream"));
    }

    #[tokio::test]
    async fn test_cancellation_stops_further_calls() {
        let ctx = ctx(10);
        let token = ctx.cancel.clone();

        let mut backend = MockCompletionBackend::new();
        backend.expect_complete().times(1).returning(move |_| {
            token.cancel();
            Ok(search_call("c1"))
        });

        let mut tools = executor_with(&["search"]);
        tools.expect_execute().times(0);

        let mode = ReactMode::new(Arc::new(backend), Arc::new(tools), &ctx);
        let result = mode.run(&ReasoningTask::new("q")).await;

        assert!(!result.succeeded);
        assert!(result.final_answer.is_empty());
        assert_eq!(result.trace.last().map(|s| s.stage), Some(ThoughtStage::Halt));
    }
}
