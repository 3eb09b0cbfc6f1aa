//! Reasoning strategy implementations.
//!
//! This module provides the four strategy engines:
//! - [`ReactMode`]: Iterative think → act → observe tool-use loop
//! - [`ReflexionMode`]: Attempt, validate, critique and retry
//! - [`TreeMode`]: Beam-bounded best-first search over candidate approaches
//! - [`DebateMode`]: Multi-round debate between perspectives, settled by a judge
//!
//! plus [`HeuristicSelector`] for picking a strategy when none is configured.
//! All engines share call guarding (timeout + cancellation) via [`ModeCore`].

mod auto;
mod core;
mod debate;
mod react;
mod reflexion;
mod tree;

pub use auto::*;
pub use self::core::*;
pub use debate::*;
pub use react::*;
pub use reflexion::*;
pub use tree::*;

use serde::{Deserialize, Serialize};

// ============================================================================
// Shared Types
// ============================================================================

/// Reasoning strategy kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningStrategy {
    /// ReAct-style tool-use loop.
    Iterative,
    /// Reflexion-style self-critique and retry.
    Reflexive,
    /// Tree-of-Thought candidate search.
    TreeSearch,
    /// Multi-agent debate with a judge.
    Debate,
}

impl ReasoningStrategy {
    /// All strategies, in selection-preference order
    pub const ALL: [ReasoningStrategy; 4] = [
        ReasoningStrategy::Iterative,
        ReasoningStrategy::Reflexive,
        ReasoningStrategy::TreeSearch,
        ReasoningStrategy::Debate,
    ];

    /// Get the strategy name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningStrategy::Iterative => "iterative",
            ReasoningStrategy::Reflexive => "reflexive",
            ReasoningStrategy::TreeSearch => "tree_search",
            ReasoningStrategy::Debate => "debate",
        }
    }
}

impl std::fmt::Display for ReasoningStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReasoningStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "iterative" | "react" => Ok(ReasoningStrategy::Iterative),
            "reflexive" | "reflexion" => Ok(ReasoningStrategy::Reflexive),
            "tree_search" | "tree" | "tot" => Ok(ReasoningStrategy::TreeSearch),
            "debate" => Ok(ReasoningStrategy::Debate),
            _ => Err(format!("Unknown reasoning strategy: {}", s)),
        }
    }
}

/// Immutable input to every engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningTask {
    pub description: String,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub available_tool_names: Vec<String>,
}

impl ReasoningTask {
    /// Create a task with just a description
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            constraints: Vec::new(),
            available_tool_names: Vec::new(),
        }
    }

    /// Add a constraint
    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    /// Allow a tool by name
    pub fn with_tool(mut self, name: impl Into<String>) -> Self {
        self.available_tool_names.push(name.into());
        self
    }

    /// Whether `name` may be called. An empty allow-list permits every tool.
    pub fn allows_tool(&self, name: &str) -> bool {
        self.available_tool_names.is_empty() || self.available_tool_names.iter().any(|t| t == name)
    }

    /// Description followed by a bullet list of constraints, for prompts.
    pub fn render(&self) -> String {
        if self.constraints.is_empty() {
            return self.description.clone();
        }
        let constraints: Vec<String> = self.constraints.iter().map(|c| format!("- {}", c)).collect();
        format!(
            "{}\n\nConstraints:\n{}",
            self.description,
            constraints.join("\n")
        )
    }
}

/// Per-call reasoning options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningConfig {
    /// Explicit choice overriding heuristic selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ReasoningStrategy>,
    /// Cap for the ReAct and Reflexion loops.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Debate rounds.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// Tree search depth bound.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Children per expanded node.
    #[serde(default = "default_branch_factor")]
    pub branch_factor: usize,
    /// Frontier nodes kept per depth.
    #[serde(default = "default_beam_width")]
    pub beam_width: usize,
    #[serde(default = "default_debater_count")]
    pub debater_count: usize,
    /// Tree search stops early once a node scores above this.
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,
    /// Timeout applied to every backend and tool call.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_max_iterations() -> usize {
    5
}

fn default_max_rounds() -> usize {
    3
}

fn default_max_depth() -> usize {
    3
}

fn default_branch_factor() -> usize {
    3
}

fn default_beam_width() -> usize {
    2
}

fn default_debater_count() -> usize {
    3
}

fn default_confidence_floor() -> f64 {
    0.9
}

fn default_call_timeout_ms() -> u64 {
    60_000
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            strategy: None,
            max_iterations: default_max_iterations(),
            max_rounds: default_max_rounds(),
            max_depth: default_max_depth(),
            branch_factor: default_branch_factor(),
            beam_width: default_beam_width(),
            debater_count: default_debater_count(),
            confidence_floor: default_confidence_floor(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl ReasoningConfig {
    /// Force a strategy
    pub fn with_strategy(mut self, strategy: ReasoningStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Set the iteration cap (at least 1)
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    /// Set the number of debate rounds (at least 1)
    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds.max(1);
        self
    }

    /// Set the tree depth bound (at least 1)
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    /// Set children per expansion (at least 1)
    pub fn with_branch_factor(mut self, factor: usize) -> Self {
        self.branch_factor = factor.max(1);
        self
    }

    /// Set the beam width (at least 1)
    pub fn with_beam_width(mut self, width: usize) -> Self {
        self.beam_width = width.max(1);
        self
    }

    /// Set the number of debaters (at least 1)
    pub fn with_debater_count(mut self, count: usize) -> Self {
        self.debater_count = count.max(1);
        self
    }

    /// Set the early-exit confidence floor
    pub fn with_confidence_floor(mut self, floor: f64) -> Self {
        self.confidence_floor = floor.clamp(0.0, 1.0);
        self
    }

    /// Set the per-call timeout in milliseconds
    pub fn with_call_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.call_timeout_ms = timeout_ms.max(1);
        self
    }
}

// ============================================================================
// Shared Utilities
// ============================================================================

/// Extract JSON from a completion string, handling markdown code blocks.
///
/// Attempts extraction in this order:
/// 1. Try parsing as raw JSON first (fast path)
/// 2. Extract from ```json ... ``` code blocks
/// 3. Extract from ``` ... ``` code blocks
/// 4. Return error if none work
pub(crate) fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    if completion.contains("```json") {
        return completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ```json block but content was empty or malformed".to_string());
    }

    if completion.contains("```") {
        return completion
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ``` block but content was empty or malformed".to_string());
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    ))
}

/// Locate the first brace-balanced `{...}` object in free text.
///
/// Braces inside JSON string literals (including escaped quotes) are ignored,
/// so nested objects and `{`/`}` in prose fields do not cut the span short.
/// Returns `None` when no opening brace exists or it is never closed.
pub(crate) fn find_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse the first JSON object in `text`, trying fenced/raw JSON first.
pub(crate) fn parse_json_object(text: &str) -> Option<serde_json::Value> {
    if let Ok(json_str) = extract_json_from_completion(text) {
        if let Ok(value @ serde_json::Value::Object(_)) = serde_json::from_str(json_str) {
            return Some(value);
        }
    }
    find_json_object(text)
        .and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok())
        .filter(|v| v.is_object())
}

/// Keep at most `max_chars` characters (not bytes) of `s`.
pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Preview for logs and trace steps, with an ellipsis when shortened.
pub(crate) fn preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", truncate_chars(s, max_chars.saturating_sub(3)))
    }
}
