//! Audit trail of a reasoning invocation.
//!
//! A [`ReasoningTrace`] is appended to while an engine runs and is frozen once
//! it is moved into the [`ReasoningResult`] returned to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::modes::ReasoningStrategy;

/// Stage of a reasoning step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtStage {
    Think,
    Act,
    Observe,
    Critique,
    Expand,
    Evaluate,
    Argue,
    Judge,
    /// Failure or cancellation notice.
    Halt,
}

impl ThoughtStage {
    /// Get the stage name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ThoughtStage::Think => "think",
            ThoughtStage::Act => "act",
            ThoughtStage::Observe => "observe",
            ThoughtStage::Critique => "critique",
            ThoughtStage::Expand => "expand",
            ThoughtStage::Evaluate => "evaluate",
            ThoughtStage::Argue => "argue",
            ThoughtStage::Judge => "judge",
            ThoughtStage::Halt => "halt",
        }
    }
}

impl std::fmt::Display for ThoughtStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThoughtStep {
    pub stage: ThoughtStage,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ThoughtStep {
    /// Create a step stamped with the current time
    pub fn new(stage: ThoughtStage, content: impl Into<String>) -> Self {
        Self {
            stage,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Ordered, append-only log of steps for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningTrace {
    /// Invocation id.
    pub id: String,
    steps: Vec<ThoughtStep>,
}

impl ReasoningTrace {
    /// Start an empty trace with a fresh id
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            steps: Vec::new(),
        }
    }

    /// Append a step
    pub fn record(&mut self, stage: ThoughtStage, content: impl Into<String>) {
        self.steps.push(ThoughtStep::new(stage, content));
    }

    /// All steps in append order
    pub fn steps(&self) -> &[ThoughtStep] {
        &self.steps
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no step has been recorded
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps of a single stage, in order
    pub fn steps_in(&self, stage: ThoughtStage) -> impl Iterator<Item = &ThoughtStep> {
        self.steps.iter().filter(move |s| s.stage == stage)
    }

    /// Count of steps of a single stage
    pub fn count(&self, stage: ThoughtStage) -> usize {
        self.steps_in(stage).count()
    }

    /// Last recorded step
    pub fn last(&self) -> Option<&ThoughtStep> {
        self.steps.last()
    }
}

impl Default for ReasoningTrace {
    fn default() -> Self {
        Self::new()
    }
}

/// Uniform output of every strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningResult {
    pub strategy: ReasoningStrategy,
    pub final_answer: String,
    /// Always within [0,1].
    pub confidence: f64,
    pub trace: ReasoningTrace,
    pub succeeded: bool,
}

impl ReasoningResult {
    /// Successful result
    pub fn success(
        strategy: ReasoningStrategy,
        final_answer: impl Into<String>,
        confidence: f64,
        trace: ReasoningTrace,
    ) -> Self {
        Self::build(strategy, final_answer.into(), confidence, trace, true)
    }

    /// Partial or degraded result
    pub fn partial(
        strategy: ReasoningStrategy,
        final_answer: impl Into<String>,
        confidence: f64,
        trace: ReasoningTrace,
    ) -> Self {
        Self::build(strategy, final_answer.into(), confidence, trace, false)
    }

    /// Failure with a trace holding only the failure step
    pub fn failure(strategy: ReasoningStrategy, reason: impl Into<String>) -> Self {
        let mut trace = ReasoningTrace::new();
        trace.record(ThoughtStage::Halt, reason);
        Self::build(strategy, String::new(), 0.0, trace, false)
    }

    /// Stop after cancellation: no answer, steps so far plus a notice
    pub fn cancelled(strategy: ReasoningStrategy, mut trace: ReasoningTrace) -> Self {
        trace.record(ThoughtStage::Halt, "Reasoning cancelled by caller");
        Self::build(strategy, String::new(), 0.0, trace, false)
    }

    /// Engine-level degraded result after an unrecoverable error.
    ///
    /// Keeps the steps gathered so far and appends the error.
    pub fn degraded(
        strategy: ReasoningStrategy,
        partial_answer: impl Into<String>,
        mut trace: ReasoningTrace,
        reason: impl std::fmt::Display,
    ) -> Self {
        trace.record(ThoughtStage::Halt, format!("Reasoning aborted: {}", reason));
        Self::build(strategy, partial_answer.into(), 0.0, trace, false)
    }

    fn build(
        strategy: ReasoningStrategy,
        final_answer: String,
        confidence: f64,
        mut trace: ReasoningTrace,
        succeeded: bool,
    ) -> Self {
        if trace.is_empty() {
            trace.record(ThoughtStage::Halt, "No reasoning steps were recorded");
        }
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            strategy,
            final_answer,
            confidence,
            trace,
            succeeded,
        }
    }
}
