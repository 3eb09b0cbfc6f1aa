//! Auto strategy router - picks an engine when the caller did not name one.
//!
//! Selection is a plain, deterministic function of the task. The
//! [`StrategySelector`] trait is the seam for replacing it.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ReasoningConfig, ReasoningStrategy, ReasoningTask};

const DEBATE_KEYWORDS: [&str; 7] = [
    "debate",
    "trade-off",
    "tradeoff",
    "pros and cons",
    "controversial",
    "perspectives",
    "versus",
];

const REVISION_KEYWORDS: [&str; 6] = [
    "refine",
    "revise",
    "improve",
    "critique",
    "correct",
    "until it passes",
];

const EXPLORATION_KEYWORDS: [&str; 6] = [
    "explore",
    "alternatives",
    "options",
    "brainstorm",
    "design",
    "plan",
];

/// Complexity at or above which branching search is chosen.
const TREE_COMPLEXITY_THRESHOLD: f64 = 0.6;

/// Picks a strategy for a task. Must always return one of the four.
pub trait StrategySelector: Send + Sync {
    fn select(&self, task: &ReasoningTask, config: &ReasoningConfig) -> ReasoningStrategy;
}

/// A strategy choice with the reason behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyRecommendation {
    pub strategy: ReasoningStrategy,
    pub rationale: String,
    /// Estimated task complexity (0.0-1.0).
    pub complexity: f64,
}

/// Keyword and size based selector.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicSelector;

impl HeuristicSelector {
    /// Estimated complexity from description length and constraint count.
    pub fn complexity(task: &ReasoningTask) -> f64 {
        let words = task.description.split_whitespace().count() as f64;
        let constraints = task.constraints.len() as f64;
        0.6 * (words / 200.0).min(1.0) + 0.4 * (constraints / 5.0).min(1.0)
    }

    /// Recommend a strategy, with rationale.
    pub fn recommend(&self, task: &ReasoningTask) -> StrategyRecommendation {
        let text = task.description.to_lowercase();
        let mentions = |keywords: &[&str]| keywords.iter().any(|k| text.contains(k));
        let complexity = Self::complexity(task);

        let (strategy, rationale) = if mentions(&DEBATE_KEYWORDS) {
            (
                ReasoningStrategy::Debate,
                "Task weighs competing positions".to_string(),
            )
        } else if !task.available_tool_names.is_empty() {
            (
                ReasoningStrategy::Iterative,
                format!(
                    "Task can act through {} tool(s)",
                    task.available_tool_names.len()
                ),
            )
        } else if mentions(&REVISION_KEYWORDS) || task.constraints.len() >= 3 {
            (
                ReasoningStrategy::Reflexive,
                "Task asks for revision or carries many constraints to satisfy".to_string(),
            )
        } else if mentions(&EXPLORATION_KEYWORDS) || complexity >= TREE_COMPLEXITY_THRESHOLD {
            (
                ReasoningStrategy::TreeSearch,
                format!("Task benefits from exploring alternatives (complexity {:.2})", complexity),
            )
        } else {
            (
                ReasoningStrategy::Iterative,
                "Straightforward task".to_string(),
            )
        };

        StrategyRecommendation {
            strategy,
            rationale,
            complexity,
        }
    }
}

impl StrategySelector for HeuristicSelector {
    fn select(&self, task: &ReasoningTask, _config: &ReasoningConfig) -> ReasoningStrategy {
        let recommendation = self.recommend(task);
        debug!(
            strategy = %recommendation.strategy,
            complexity = recommendation.complexity,
            rationale = %recommendation.rationale,
            "Heuristic strategy selection"
        );
        recommendation.strategy
    }
}

/// The configured strategy if any, otherwise the selector's pick.
pub fn resolve_strategy(
    selector: &dyn StrategySelector,
    task: &ReasoningTask,
    config: &ReasoningConfig,
) -> ReasoningStrategy {
    config
        .strategy
        .unwrap_or_else(|| selector.select(task, config))
}
