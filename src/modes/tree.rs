//! Tree reasoning mode - beam-bounded best-first search over candidate approaches.
//!
//! The search keeps every node it ever creates in a flat arena
//! ([`ThoughtTree`]) indexed by integer id, with parent ids as back-references:
//! - Depth 0 is the task itself, unscored
//! - Each frontier node is expanded into `branch_factor` children, which are scored
//! - Only the top `beam_width` children of a depth become the next frontier
//! - The answer is the best-scoring node seen anywhere in the run
//!
//! Frontier nodes of one depth are expanded concurrently; the depth's results
//! are joined, sorted by parent id and only then given node ids, so ids and
//! trace order are deterministic regardless of completion order.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{
    extract_json_from_completion, parse_json_object, preview, ModeCore, ReasoningStrategy,
    ReasoningTask, RunContext,
};
use crate::backend::{CompletionBackend, CompletionRequest, Evaluator, Message};
use crate::error::{EngineResult, ReasoningError};
use crate::prompts::{TREE_EVALUATION_PROMPT, TREE_EXPANSION_PROMPT};
use crate::trace::{ReasoningResult, ReasoningTrace, ThoughtStage};

/// Node of the search tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateApproach {
    pub id: usize,
    pub parent_id: Option<usize>,
    pub depth: usize,
    pub content: String,
    /// Unset for the root and for nodes whose evaluation failed.
    pub score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Arena holding every node created during one search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThoughtTree {
    nodes: Vec<CandidateApproach>,
}

impl ThoughtTree {
    /// Create a tree whose root holds `root_content`
    pub fn new(root_content: impl Into<String>) -> Self {
        Self {
            nodes: vec![CandidateApproach {
                id: 0,
                parent_id: None,
                depth: 0,
                content: root_content.into(),
                score: None,
                created_at: Utc::now(),
            }],
        }
    }

    /// Id of the root node
    pub fn root(&self) -> usize {
        0
    }

    /// Append a child of `parent_id` and return its id.
    ///
    /// Returns `None` when `parent_id` does not exist.
    pub fn add_child(
        &mut self,
        parent_id: usize,
        content: impl Into<String>,
        score: Option<f64>,
    ) -> Option<usize> {
        let depth = self.get(parent_id)?.depth + 1;
        let id = self.nodes.len();
        self.nodes.push(CandidateApproach {
            id,
            parent_id: Some(parent_id),
            depth,
            content: content.into(),
            score: score.map(|s| s.clamp(0.0, 1.0)),
            created_at: Utc::now(),
        });
        Some(id)
    }

    /// Look up a node
    pub fn get(&self, id: usize) -> Option<&CandidateApproach> {
        self.nodes.get(id)
    }

    /// All nodes in creation order
    pub fn nodes(&self) -> &[CandidateApproach] {
        &self.nodes
    }

    /// Number of nodes ever created
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: a tree has at least its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct children of `id`
    pub fn children(&self, id: usize) -> impl Iterator<Item = &CandidateApproach> {
        self.nodes.iter().filter(move |n| n.parent_id == Some(id))
    }

    /// Contents from the first node below the root down to `id`.
    pub fn path(&self, id: usize) -> Vec<&str> {
        let mut path = Vec::new();
        let mut current = self.get(id);
        while let Some(node) = current {
            if node.parent_id.is_none() {
                break;
            }
            path.push(node.content.as_str());
            current = node.parent_id.and_then(|p| self.get(p));
        }
        path.reverse();
        path
    }

    /// Highest-scoring node; ties go to the earlier node.
    pub fn best(&self) -> Option<&CandidateApproach> {
        rank(self.nodes.iter()).into_iter().next()
    }
}

/// Scored nodes ordered by score descending, then by creation (id) ascending.
fn rank<'a>(nodes: impl Iterator<Item = &'a CandidateApproach>) -> Vec<&'a CandidateApproach> {
    let mut scored: Vec<&CandidateApproach> = nodes.filter(|n| n.score.is_some()).collect();
    scored.sort_by(|a, b| {
        let (sa, sb) = (a.score.unwrap_or(0.0), b.score.unwrap_or(0.0));
        sb.total_cmp(&sa).then(a.id.cmp(&b.id))
    });
    scored
}

/// Full outcome of a search, including the arena.
#[derive(Debug, Clone)]
pub struct TreeSearchOutcome {
    pub result: ReasoningResult,
    pub tree: ThoughtTree,
}

/// Expansion of one frontier node, produced inside a worker task.
struct Expansion {
    parent_id: usize,
    children: EngineResult<Vec<(String, Option<f64>)>>,
}

/// Tree reasoning mode handler for candidate search.
#[derive(Clone)]
pub struct TreeMode {
    /// Backend access plus timeout/cancellation.
    core: ModeCore,
    evaluator: Arc<dyn Evaluator>,
    max_depth: usize,
    branch_factor: usize,
    beam_width: usize,
    confidence_floor: f64,
}

impl TreeMode {
    /// Create a new tree search engine for one run
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        evaluator: Arc<dyn Evaluator>,
        ctx: &RunContext,
    ) -> Self {
        Self {
            core: ModeCore::new(backend, ctx),
            evaluator,
            max_depth: ctx.config.max_depth.max(1),
            branch_factor: ctx.config.branch_factor.max(1),
            beam_width: ctx.config.beam_width.max(1),
            confidence_floor: ctx.config.confidence_floor,
        }
    }

    /// Run the search. Never fails.
    pub async fn run(&self, task: &ReasoningTask) -> ReasoningResult {
        self.search(task).await.result
    }

    /// Run the search and keep the tree for inspection.
    pub async fn search(&self, task: &ReasoningTask) -> TreeSearchOutcome {
        let start = Instant::now();
        let strategy = ReasoningStrategy::TreeSearch;
        let mut tree = ThoughtTree::new(task.description.clone());
        let mut trace = ReasoningTrace::new();

        let outcome = self.explore(task, &mut tree, &mut trace).await;
        let latency_ms = start.elapsed().as_millis();

        let result = match outcome {
            Err(ReasoningError::Cancelled) => ReasoningResult::cancelled(strategy, trace),
            Err(e) => {
                warn!(strategy = %strategy, error = %e, "Tree search aborted");
                let partial = tree.best().map(|n| n.content.clone()).unwrap_or_default();
                ReasoningResult::degraded(strategy, partial, trace, e)
            }
            Ok(()) => match tree.best() {
                Some(best) => {
                    info!(
                        strategy = %strategy,
                        nodes = tree.len(),
                        best_node = best.id,
                        best_depth = best.depth,
                        score = best.score.unwrap_or(0.0),
                        latency_ms = latency_ms,
                        "Tree search completed"
                    );
                    ReasoningResult::success(
                        strategy,
                        best.content.clone(),
                        best.score.unwrap_or(0.0),
                        trace,
                    )
                }
                None => {
                    warn!(strategy = %strategy, nodes = tree.len(), "Tree search produced no scored candidates");
                    ReasoningResult::degraded(
                        strategy,
                        String::new(),
                        trace,
                        "no candidate approach could be generated and scored",
                    )
                }
            },
        };

        TreeSearchOutcome { result, tree }
    }

    async fn explore(
        &self,
        task: &ReasoningTask,
        tree: &mut ThoughtTree,
        trace: &mut ReasoningTrace,
    ) -> EngineResult<()> {
        let task = Arc::new(task.clone());
        let mut frontier = vec![tree.root()];
        let mut last_error: Option<ReasoningError> = None;

        for depth in 0..self.max_depth {
            if frontier.is_empty() {
                debug!(depth = depth, "Frontier exhausted");
                break;
            }
            self.core.ensure_active()?;

            let expansions = self.expand_frontier(&task, tree, &frontier).await?;

            let mut created = Vec::new();
            for expansion in expansions {
                match expansion.children {
                    Ok(children) => {
                        let contents: Vec<String> =
                            children.iter().map(|(c, _)| preview(c, 120)).collect();
                        trace.record(
                            ThoughtStage::Expand,
                            format!(
                                "Node {} expanded into {} candidates: {}",
                                expansion.parent_id,
                                children.len(),
                                contents.join(" | ")
                            ),
                        );
                        for (content, score) in children {
                            if let Some(id) = tree.add_child(expansion.parent_id, content, score) {
                                created.push(id);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(node = expansion.parent_id, error = %e, "Expansion failed");
                        trace.record(
                            ThoughtStage::Expand,
                            format!("Expansion of node {} failed: {}", expansion.parent_id, e),
                        );
                        last_error = Some(e);
                    }
                }
            }

            for &id in &created {
                if let Some(node) = tree.get(id) {
                    let verdict = match node.score {
                        Some(score) => format!("score {:.2}", score),
                        None => "unscored".to_string(),
                    };
                    trace.record(
                        ThoughtStage::Evaluate,
                        format!("Node {} ({}): {}", id, verdict, preview(&node.content, 200)),
                    );
                }
            }

            let floor = self.confidence_floor;
            let early_exit = created
                .iter()
                .filter_map(|&id| tree.get(id).and_then(|n| n.score))
                .any(|s| s > floor);
            if early_exit {
                debug!(depth = depth + 1, floor = floor, "Confidence floor exceeded, stopping early");
                break;
            }

            frontier = rank(created.iter().filter_map(|&id| tree.get(id)))
                .into_iter()
                .take(self.beam_width)
                .map(|n| n.id)
                .collect();
            debug!(depth = depth + 1, frontier = ?frontier, "Beam retained");
        }

        match (tree.best(), last_error) {
            (None, Some(e)) => Err(e),
            _ => Ok(()),
        }
    }

    /// Expand every frontier node concurrently and wait for all of them.
    async fn expand_frontier(
        &self,
        task: &Arc<ReasoningTask>,
        tree: &ThoughtTree,
        frontier: &[usize],
    ) -> EngineResult<Vec<Expansion>> {
        let mut join_set: JoinSet<Expansion> = JoinSet::new();

        for &parent_id in frontier {
            let path: Vec<String> = tree.path(parent_id).into_iter().map(String::from).collect();
            let core = self.core.clone();
            let evaluator = Arc::clone(&self.evaluator);
            let task = Arc::clone(task);
            let count = self.branch_factor;

            join_set.spawn(async move {
                let children = expand_and_score(&core, evaluator.as_ref(), &task, &path, count).await;
                Expansion {
                    parent_id,
                    children,
                }
            });
        }

        let mut expansions = Vec::with_capacity(frontier.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(expansion) => expansions.push(expansion),
                Err(e) => warn!(error = %e, "Expansion worker panicked"),
            }
        }

        self.core.ensure_active()?;
        if expansions
            .iter()
            .any(|e| matches!(e.children, Err(ReasoningError::Cancelled)))
        {
            return Err(ReasoningError::Cancelled);
        }

        expansions.sort_by_key(|e| e.parent_id);
        Ok(expansions)
    }
}

/// One expansion call followed by scoring of each candidate.
async fn expand_and_score(
    core: &ModeCore,
    evaluator: &dyn Evaluator,
    task: &ReasoningTask,
    path: &[String],
    count: usize,
) -> EngineResult<Vec<(String, Option<f64>)>> {
    let messages = build_expansion_messages(task, path, count);
    let completion = core.complete(CompletionRequest::new(messages)).await?;
    let candidates = parse_candidates(&completion.text, count)?;
    if candidates.len() < count {
        warn!(
            requested = count,
            received = candidates.len(),
            "Backend returned fewer candidates than requested"
        );
    }

    let mut scored = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let score = match core
            .guarded(async { Ok(evaluator.score(&candidate, task).await) })
            .await
        {
            Ok(score) if score.is_finite() => Some(score.clamp(0.0, 1.0)),
            Ok(_) => None,
            Err(ReasoningError::Cancelled) => return Err(ReasoningError::Cancelled),
            Err(e) => {
                warn!(error = %e, "Evaluation failed; candidate left unscored");
                None
            }
        };
        scored.push((candidate, score));
    }
    Ok(scored)
}

fn build_expansion_messages(task: &ReasoningTask, path: &[String], count: usize) -> Vec<Message> {
    let so_far = if path.is_empty() {
        "(none yet - propose initial approaches)".to_string()
    } else {
        path.iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {}", i + 1, step))
            .collect::<Vec<_>>()
            .join("\n")
    };

    vec![
        Message::system(TREE_EXPANSION_PROMPT.replace("{count}", &count.to_string())),
        Message::user(format!(
            "Task:\n{}\n\nApproach so far:\n{}",
            task.render(),
            so_far
        )),
    ]
}

/// Parse up to `count` candidates from an expansion response.
///
/// Accepts `{"candidates": [...]}` (strings or objects with a `content`,
/// `approach` or `thought` field), a bare JSON array of strings, or, failing
/// that, one candidate per non-empty line with list markers stripped.
pub(crate) fn parse_candidates(completion: &str, count: usize) -> EngineResult<Vec<String>> {
    let from_value = |items: &[serde_json::Value]| -> Vec<String> {
        items
            .iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Object(map) => ["content", "approach", "thought"]
                    .iter()
                    .find_map(|k| map.get(*k).and_then(|v| v.as_str()).map(String::from)),
                _ => None,
            })
            .collect()
    };

    let mut candidates = match parse_json_object(completion)
        .as_ref()
        .and_then(|v| v.get("candidates"))
        .and_then(|v| v.as_array())
    {
        Some(items) => from_value(items),
        None => match extract_json_from_completion(completion)
            .ok()
            .and_then(|s| serde_json::from_str::<Vec<serde_json::Value>>(s).ok())
        {
            Some(items) => from_value(&items),
            None => completion
                .lines()
                .map(strip_list_marker)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
        },
    };

    candidates.retain(|c| !c.trim().is_empty());
    candidates.truncate(count);

    if candidates.is_empty() {
        return Err(ReasoningError::Parse {
            context: "expansion candidates".to_string(),
            message: format!("no candidates in response: '{}'", preview(completion, 100)),
        });
    }
    Ok(candidates)
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    let line = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .unwrap_or(line);
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(stripped) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return stripped.trim();
        }
    }
    line.trim()
}

// ============================================================================
// Evaluators
// ============================================================================

/// Deterministic evaluator: task-term coverage, substance, constraint mentions.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEvaluator;

fn significant_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 3)
        .map(|w| w.to_lowercase())
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

impl HeuristicEvaluator {
    /// Score synchronously
    pub fn score_sync(&self, candidate: &str, task: &ReasoningTask) -> f64 {
        let candidate_lower = candidate.to_lowercase();

        let task_terms = significant_terms(&task.description);
        let coverage = if task_terms.is_empty() {
            0.5
        } else {
            let hits = task_terms
                .iter()
                .filter(|t| candidate_lower.contains(t.as_str()))
                .count();
            hits as f64 / task_terms.len() as f64
        };

        let words = candidate.split_whitespace().count();
        let substance = (words as f64 / 30.0).min(1.0);

        let constraint_fit = if task.constraints.is_empty() {
            0.5
        } else {
            let met = task
                .constraints
                .iter()
                .filter(|c| {
                    significant_terms(c)
                        .iter()
                        .any(|t| candidate_lower.contains(t.as_str()))
                })
                .count();
            met as f64 / task.constraints.len() as f64
        };

        (0.5 * coverage + 0.3 * substance + 0.2 * constraint_fit).clamp(0.0, 1.0)
    }
}

#[async_trait]
impl Evaluator for HeuristicEvaluator {
    async fn score(&self, candidate: &str, task: &ReasoningTask) -> f64 {
        self.score_sync(candidate, task)
    }
}

/// Evaluator that asks the completion backend, falling back to
/// [`HeuristicEvaluator`] when the call fails or the score is unreadable.
#[derive(Clone)]
pub struct BackendEvaluator {
    backend: Arc<dyn CompletionBackend>,
    fallback: HeuristicEvaluator,
}

impl BackendEvaluator {
    /// Create an evaluator over `backend`
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            fallback: HeuristicEvaluator,
        }
    }

    fn parse_score(completion: &str) -> Option<f64> {
        parse_json_object(completion)
            .and_then(|v| v.get("score").and_then(|s| s.as_f64()))
            .filter(|s| s.is_finite())
            .map(|s| s.clamp(0.0, 1.0))
    }
}

#[async_trait]
impl Evaluator for BackendEvaluator {
    async fn score(&self, candidate: &str, task: &ReasoningTask) -> f64 {
        let messages = vec![
            Message::system(TREE_EVALUATION_PROMPT),
            Message::user(format!(
                "Task:\n{}\n\nCandidate approach:\n{}",
                task.render(),
                candidate
            )),
        ];

        match self.backend.complete(&CompletionRequest::new(messages)).await {
            Ok(completion) => match Self::parse_score(&completion.text) {
                Some(score) => score,
                None => {
                    warn!(
                        completion_preview = %preview(&completion.text, 200),
                        "Unreadable evaluation score, using heuristic"
                    );
                    self.fallback.score_sync(candidate, task)
                }
            },
            Err(e) => {
                warn!(error = %e, "Evaluation call failed, using heuristic");
                self.fallback.score_sync(candidate, task)
            }
        }
    }
}
