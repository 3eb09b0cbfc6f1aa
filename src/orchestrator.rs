//! Strategy dispatch and result normalization.
//!
//! [`ReasoningOrchestrator::run`] is the only entry point the surrounding
//! platform needs. It resolves a strategy, builds exactly one engine, runs it in
//! its own task and always hands back a [`ReasoningResult`].

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backend::{CompletionBackend, Evaluator, TaskAttempt, ToolExecutor, Validator};
use crate::error::ReasoningError;
use crate::modes::{
    resolve_strategy, BackendAttempt, BackendEvaluator, BackendValidator, DebateMode,
    HeuristicSelector, ReactMode, ReasoningConfig, ReasoningStrategy, ReasoningTask,
    ReflexionMode, RunContext, StrategySelector, TreeMode,
};
use crate::trace::ReasoningResult;

/// The engine chosen for one invocation.
enum Engine {
    Iterative(ReactMode),
    Reflexive(ReflexionMode),
    TreeSearch(TreeMode),
    Debate(DebateMode),
}

impl Engine {
    async fn run(&self, task: &ReasoningTask) -> ReasoningResult {
        match self {
            Engine::Iterative(mode) => mode.run(task).await,
            Engine::Reflexive(mode) => mode.run(task).await,
            Engine::TreeSearch(mode) => mode.run(task).await,
            Engine::Debate(mode) => mode.run(task).await,
        }
    }
}

/// Selects and runs one strategy engine per call.
///
/// Holds only shared, immutable collaborators; every call builds fresh
/// engine state.
#[derive(Clone)]
pub struct ReasoningOrchestrator {
    backend: Arc<dyn CompletionBackend>,
    tools: Arc<dyn ToolExecutor>,
    evaluator: Arc<dyn Evaluator>,
    validator: Arc<dyn Validator>,
    attempt: Arc<dyn TaskAttempt>,
    selector: Arc<dyn StrategySelector>,
}

impl ReasoningOrchestrator {
    /// Create an orchestrator whose evaluator, validator and attempt function
    /// are all backed by `backend`.
    pub fn new(backend: Arc<dyn CompletionBackend>, tools: Arc<dyn ToolExecutor>) -> Self {
        Self {
            evaluator: Arc::new(BackendEvaluator::new(Arc::clone(&backend))),
            validator: Arc::new(BackendValidator::new(Arc::clone(&backend))),
            attempt: Arc::new(BackendAttempt::new(Arc::clone(&backend))),
            selector: Arc::new(HeuristicSelector),
            backend,
            tools,
        }
    }

    /// Override the tree-search evaluator
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Override the self-critique validator
    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    /// Override the self-critique attempt function
    pub fn with_attempt(mut self, attempt: Arc<dyn TaskAttempt>) -> Self {
        self.attempt = attempt;
        self
    }

    /// Override the strategy selector
    pub fn with_selector(mut self, selector: Arc<dyn StrategySelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Strategy that `run` would use for this task and config.
    pub fn select_strategy(
        &self,
        task: &ReasoningTask,
        config: &ReasoningConfig,
    ) -> ReasoningStrategy {
        resolve_strategy(self.selector.as_ref(), task, config)
    }

    /// Run one task to completion.
    pub async fn run(&self, task: &ReasoningTask, config: &ReasoningConfig) -> ReasoningResult {
        self.run_with_cancel(task, config, CancellationToken::new())
            .await
    }

    /// Run one task, stopping early once `cancel` fires.
    ///
    /// Dropping the returned future also stops the engine: it issues no new
    /// backend or tool calls afterwards.
    pub async fn run_with_cancel(
        &self,
        task: &ReasoningTask,
        config: &ReasoningConfig,
        cancel: CancellationToken,
    ) -> ReasoningResult {
        let start = Instant::now();
        let strategy = self.select_strategy(task, config);

        if task.description.trim().is_empty() {
            let err = ReasoningError::Validation {
                field: "description".to_string(),
                reason: "task description must not be empty".to_string(),
            };
            warn!(strategy = %strategy, error = %err, "Rejected reasoning task");
            return ReasoningResult::failure(strategy, err.to_string());
        }

        info!(
            strategy = %strategy,
            explicit = config.strategy.is_some(),
            constraints = task.constraints.len(),
            tools = task.available_tool_names.len(),
            "Starting reasoning"
        );

        // the engine task outlives this future unless told to stop
        let run_token = cancel.child_token();
        let _stop_on_drop = run_token.clone().drop_guard();

        let ctx = RunContext::new(config.clone(), run_token);
        let engine = self.build_engine(strategy, &ctx);
        let owned_task = task.clone();

        let result = match tokio::spawn(async move { engine.run(&owned_task).await }).await {
            Ok(result) => result,
            Err(e) => {
                error!(strategy = %strategy, error = %e, "Reasoning engine crashed");
                ReasoningResult::failure(strategy, format!("Reasoning engine failed: {}", e))
            }
        };

        info!(
            strategy = %strategy,
            trace_id = %result.trace.id,
            succeeded = result.succeeded,
            confidence = result.confidence,
            steps = result.trace.len(),
            latency_ms = start.elapsed().as_millis(),
            "Reasoning finished"
        );
        result
    }

    fn build_engine(&self, strategy: ReasoningStrategy, ctx: &RunContext) -> Engine {
        let backend = Arc::clone(&self.backend);
        match strategy {
            ReasoningStrategy::Iterative => {
                Engine::Iterative(ReactMode::new(backend, Arc::clone(&self.tools), ctx))
            }
            ReasoningStrategy::Reflexive => Engine::Reflexive(ReflexionMode::new(
                backend,
                Arc::clone(&self.attempt),
                Arc::clone(&self.validator),
                ctx,
            )),
            ReasoningStrategy::TreeSearch => {
                Engine::TreeSearch(TreeMode::new(backend, Arc::clone(&self.evaluator), ctx))
            }
            ReasoningStrategy::Debate => Engine::Debate(DebateMode::new(backend, ctx)),
        }
    }
}
