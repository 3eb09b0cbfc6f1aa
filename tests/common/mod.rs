//! Shared stubs for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reasoning_orchestrator::backend::{
    Completion, CompletionBackend, CompletionRequest, Evaluator, ToolDeclaration, ToolExecutor,
    ToolOutcome, Validation, Validator,
};
use reasoning_orchestrator::error::{EngineResult, ReasoningError};
use reasoning_orchestrator::ReasoningTask;

type Script = dyn Fn(usize, &CompletionRequest) -> EngineResult<Completion> + Send + Sync;

/// Backend answering each call through a closure of (call index, request).
pub struct ScriptedBackend {
    script: Box<Script>,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    pub fn new(
        script: impl Fn(usize, &CompletionRequest) -> EngineResult<Completion> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Backend that always answers `text`.
    pub fn constant(text: &'static str) -> Arc<Self> {
        Self::new(move |_, _| Ok(Completion::text(text)))
    }

    /// Backend that always fails.
    pub fn failing(message: &'static str) -> Arc<Self> {
        Self::new(move |_, _| Err(ReasoningError::backend(message)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, request: &CompletionRequest) -> EngineResult<Completion> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        (self.script)(index, request)
    }
}

/// Executor that records calls and answers every tool with `output`.
pub struct RecordingTools {
    names: Vec<&'static str>,
    output: &'static str,
    executed: Mutex<Vec<String>>,
}

impl RecordingTools {
    pub fn new(names: Vec<&'static str>, output: &'static str) -> Arc<Self> {
        Arc::new(Self {
            names,
            output,
            executed: Mutex::new(Vec::new()),
        })
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for RecordingTools {
    fn declarations(&self) -> Vec<ToolDeclaration> {
        self.names
            .iter()
            .map(|name| ToolDeclaration {
                name: name.to_string(),
                description: format!("{} tool", name),
                parameters: serde_json::json!({"type": "object"}),
            })
            .collect()
    }

    async fn execute(&self, name: &str, _arguments: &serde_json::Value) -> ToolOutcome {
        self.executed.lock().unwrap().push(name.to_string());
        ToolOutcome::ok(self.output)
    }
}

/// Validator that passes from attempt `pass_on` (1-based) onwards.
pub struct PassOnAttempt {
    pass_on: usize,
    seen: AtomicUsize,
}

impl PassOnAttempt {
    pub fn new(pass_on: usize) -> Arc<Self> {
        Arc::new(Self {
            pass_on,
            seen: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Validator for PassOnAttempt {
    async fn check(&self, _attempt_output: &str, _task: &ReasoningTask) -> Validation {
        let attempt = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt >= self.pass_on {
            Validation::pass()
        } else {
            Validation::fail(format!("attempt {} incomplete", attempt))
        }
    }
}

/// Evaluator scoring candidates from a lookup table (0.1 when absent).
pub struct TableEvaluator(pub Vec<(&'static str, f64)>);

#[async_trait]
impl Evaluator for TableEvaluator {
    async fn score(&self, candidate: &str, _task: &ReasoningTask) -> f64 {
        self.0
            .iter()
            .find(|(c, _)| *c == candidate)
            .map(|(_, s)| *s)
            .unwrap_or(0.1)
    }
}

/// Completion asking for one call of `tool`.
pub fn tool_request(id: &str, tool: &str) -> Completion {
    Completion::with_tool_calls(
        "I need more information",
        vec![reasoning_orchestrator::backend::ToolCall::new(
            id,
            tool,
            serde_json::json!({}),
        )],
    )
}

/// Whether `request` is the debate judge call.
pub fn is_judge(request: &CompletionRequest) -> bool {
    request
        .messages
        .first()
        .map(|m| m.content.contains("impartial judge"))
        .unwrap_or(false)
}
