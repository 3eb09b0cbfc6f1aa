//! Core infrastructure shared by all reasoning strategies.
//!
//! [`ModeCore`] bundles the completion backend with the per-run timeout and
//! cancellation signal, so every engine issues calls the same way: a call is
//! refused once the run is cancelled, raced against the cancel signal while in
//! flight, and turned into [`ReasoningError::Timeout`] when it overruns.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::ReasoningConfig;
use crate::backend::{Completion, CompletionBackend, CompletionRequest, ToolExecutor, ToolOutcome};
use crate::error::{EngineResult, ReasoningError};

/// Everything one invocation needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: ReasoningConfig,
    pub cancel: CancellationToken,
}

impl RunContext {
    /// Create a context with a caller-supplied cancel signal
    pub fn new(config: ReasoningConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// Per-call timeout
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.config.call_timeout_ms)
    }
}

/// Core infrastructure shared by all reasoning strategies.
///
/// Cheap to clone: the backend is shared, the token is a handle.
#[derive(Clone)]
pub struct ModeCore {
    backend: Arc<dyn CompletionBackend>,
    call_timeout: Duration,
    cancel: CancellationToken,
}

impl ModeCore {
    /// Create a new mode core for one run.
    pub fn new(backend: Arc<dyn CompletionBackend>, ctx: &RunContext) -> Self {
        Self {
            backend,
            call_timeout: ctx.call_timeout(),
            cancel: ctx.cancel.clone(),
        }
    }

    /// Whether the caller has asked the run to stop.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail fast with [`ReasoningError::Cancelled`] once the run is cancelled.
    pub fn ensure_active(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            Err(ReasoningError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run `call` under the per-call timeout, abandoning it on cancellation.
    pub async fn guarded<T, F>(&self, call: F) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        self.ensure_active()?;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ReasoningError::Cancelled),
            outcome = tokio::time::timeout(self.call_timeout, call) => match outcome {
                Ok(result) => result,
                Err(_) => Err(ReasoningError::Timeout {
                    timeout_ms: self.call_timeout.as_millis() as u64,
                }),
            },
        }
    }

    /// One guarded completion call.
    pub async fn complete(&self, request: CompletionRequest) -> EngineResult<Completion> {
        debug!(
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Issuing completion call"
        );
        let backend = Arc::clone(&self.backend);
        self.guarded(async move { backend.complete(&request).await })
            .await
    }

    /// One guarded tool call. A timeout becomes a failed outcome; only
    /// cancellation is returned as an error.
    pub async fn execute_tool(
        &self,
        tools: &dyn ToolExecutor,
        name: &str,
        arguments: &serde_json::Value,
    ) -> EngineResult<ToolOutcome> {
        match self
            .guarded(async { Ok(tools.execute(name, arguments).await) })
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(ReasoningError::Cancelled) => Err(ReasoningError::Cancelled),
            Err(e) => Ok(ToolOutcome::failed(e.to_string())),
        }
    }
}
