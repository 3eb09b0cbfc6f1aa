//! Collaborator seams consumed by the reasoning engines.
//!
//! The engines never talk to a model, a sandbox or a grader directly; they go
//! through these traits so each strategy can be driven by stubs in tests and
//! by [`crate::langbase::LangbaseBackend`] in production.

mod types;

pub use types::*;

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::modes::{ReasoningTask, ReflexionRecord};

#[cfg(test)]
use mockall::automock;

/// Text-completion backend that may request tool invocations.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Answer a conversation. Fails with [`crate::error::ReasoningError::Backend`]
    /// on network, auth or rate-limit problems.
    async fn complete(&self, request: &CompletionRequest) -> EngineResult<Completion>;
}

/// Side-effecting tool sandbox.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tools this executor can run.
    fn declarations(&self) -> Vec<ToolDeclaration>;

    /// Run a tool. Never fails; failure is reported through [`ToolOutcome`].
    async fn execute(&self, name: &str, arguments: &serde_json::Value) -> ToolOutcome;
}

/// Scores a candidate approach for tree search.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Score in [0,1]; higher is better.
    async fn score(&self, candidate: &str, task: &ReasoningTask) -> f64;
}

/// Checks the output of one self-critique attempt.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Validator: Send + Sync {
    async fn check(&self, attempt_output: &str, task: &ReasoningTask) -> Validation;
}

/// Produces one attempt at a task, given the critiques gathered so far.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TaskAttempt: Send + Sync {
    async fn attempt(
        &self,
        task: &ReasoningTask,
        memory: &[ReflexionRecord],
    ) -> EngineResult<String>;
}
