//! Candidate search tests: node budget, beam pruning, concurrency ordering.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{ScriptedBackend, TableEvaluator};
use reasoning_orchestrator::backend::{Completion, CompletionBackend, CompletionRequest};
use reasoning_orchestrator::error::EngineResult;
use reasoning_orchestrator::modes::{HeuristicEvaluator, RunContext, TreeMode};
use reasoning_orchestrator::{ReasoningConfig, ReasoningTask, ThoughtStage};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn ctx(config: ReasoningConfig) -> RunContext {
    RunContext::new(config, CancellationToken::new())
}

/// Names children after their parent: root → "a", "b"; "a" → "a.a", "a.b"; ...
fn naming_backend() -> Arc<ScriptedBackend> {
    ScriptedBackend::new(|_, req| {
        let prompt = &req.messages[1].content;
        let parent = prompt
            .lines()
            .rev()
            .find_map(|l| l.split_once(". ").map(|(_, rest)| rest.to_string()));
        let children = match (prompt.contains("(none yet"), parent) {
            (true, _) | (false, None) => vec!["a".to_string(), "b".to_string()],
            (false, Some(p)) => vec![format!("{}.a", p), format!("{}.b", p)],
        };
        Ok(Completion::text(json!({ "candidates": children }).to_string()))
    })
}

#[tokio::test]
async fn test_branch_two_depth_two_beam_one_creates_five_nodes() {
    let evaluator = Arc::new(TableEvaluator(vec![
        ("a", 0.4),
        ("b", 0.6),
        ("b.a", 0.55),
        ("b.b", 0.5),
    ]));
    let config = ReasoningConfig::default()
        .with_branch_factor(2)
        .with_max_depth(2)
        .with_beam_width(1);

    let outcome = TreeMode::new(naming_backend(), evaluator, &ctx(config))
        .search(&ReasoningTask::new("Choose a queue"))
        .await;

    assert_eq!(outcome.tree.len(), 5);
    assert_eq!(outcome.result.final_answer, "b");
    assert_eq!(outcome.result.confidence, 0.6);
    let depth_two: Vec<&str> = outcome
        .tree
        .nodes()
        .iter()
        .filter(|n| n.depth == 2)
        .map(|n| n.content.as_str())
        .collect();
    assert_eq!(depth_two, vec!["b.a", "b.b"]);
}

#[tokio::test]
async fn test_beam_ties_keep_the_earlier_node() {
    let evaluator = Arc::new(TableEvaluator(vec![("a", 0.5), ("b", 0.5)]));
    let config = ReasoningConfig::default()
        .with_branch_factor(2)
        .with_max_depth(2)
        .with_beam_width(1);

    let outcome = TreeMode::new(naming_backend(), evaluator, &ctx(config))
        .search(&ReasoningTask::new("t"))
        .await;

    let expanded: Vec<&str> = outcome
        .tree
        .nodes()
        .iter()
        .filter(|n| n.depth == 2)
        .map(|n| n.content.as_str())
        .collect();
    assert_eq!(expanded, vec!["a.a", "a.b"]);
}

#[tokio::test]
async fn test_branch_factor_caps_children_per_node() {
    let backend = ScriptedBackend::new(|_, _| {
        Ok(Completion::text(
            json!({"candidates": ["one", "two", "three", "four"]}).to_string(),
        ))
    });
    let config = ReasoningConfig::default()
        .with_branch_factor(3)
        .with_max_depth(1);

    let outcome = TreeMode::new(backend, Arc::new(HeuristicEvaluator), &ctx(config))
        .search(&ReasoningTask::new("t"))
        .await;

    assert_eq!(outcome.tree.children(0).count(), 3);
    assert_eq!(outcome.tree.len(), 4);
}

/// Answers slower for candidates that sort first, so completion order is the
/// reverse of id order.
struct SlowFirstBackend;

#[async_trait]
impl CompletionBackend for SlowFirstBackend {
    async fn complete(&self, request: &CompletionRequest) -> EngineResult<Completion> {
        let prompt = &request.messages[1].content;
        let (delay, children) = if prompt.contains("(none yet") {
            (0, vec!["first", "second", "third"])
        } else if prompt.contains("1. first") {
            (120, vec!["first-x", "first-y"])
        } else if prompt.contains("1. second") {
            (60, vec!["second-x", "second-y"])
        } else {
            (0, vec!["third-x", "third-y"])
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(Completion::text(json!({ "candidates": children }).to_string()))
    }
}

#[tokio::test]
async fn test_concurrent_expansions_are_ordered_by_parent() {
    let evaluator = Arc::new(TableEvaluator(vec![
        ("first", 0.7),
        ("second", 0.6),
        ("third", 0.5),
    ]));
    let config = ReasoningConfig::default()
        .with_branch_factor(3)
        .with_max_depth(2)
        .with_beam_width(3);

    let outcome = TreeMode::new(Arc::new(SlowFirstBackend), evaluator, &ctx(config))
        .search(&ReasoningTask::new("t"))
        .await;

    let depth_two: Vec<&str> = outcome
        .tree
        .nodes()
        .iter()
        .filter(|n| n.depth == 2)
        .map(|n| n.content.as_str())
        .collect();
    assert_eq!(
        depth_two,
        vec!["first-x", "first-y", "second-x", "second-y", "third-x", "third-y"]
    );

    // Trace order follows node ids, not completion order.
    let expands: Vec<String> = outcome
        .result
        .trace
        .steps_in(ThoughtStage::Expand)
        .map(|s| s.content.clone())
        .collect();
    assert!(expands[1].starts_with("Node 1 "));
    assert!(expands[2].starts_with("Node 2 "));
    assert!(expands[3].starts_with("Node 3 "));
}

#[tokio::test]
async fn test_partial_expansion_failure_keeps_other_branches() {
    let backend = ScriptedBackend::new(|_, req| {
        let prompt = &req.messages[1].content;
        if prompt.contains("(none yet") {
            Ok(Completion::text(json!({"candidates": ["good", "bad"]}).to_string()))
        } else if prompt.contains("1. bad") {
            Err(reasoning_orchestrator::ReasoningError::backend("rate limited"))
        } else {
            Ok(Completion::text(json!({"candidates": ["good-next"]}).to_string()))
        }
    });
    let evaluator = Arc::new(TableEvaluator(vec![
        ("good", 0.5),
        ("bad", 0.4),
        ("good-next", 0.7),
    ]));
    let config = ReasoningConfig::default()
        .with_branch_factor(2)
        .with_max_depth(2)
        .with_beam_width(2);

    let outcome = TreeMode::new(backend, evaluator, &ctx(config))
        .search(&ReasoningTask::new("t"))
        .await;

    assert!(outcome.result.succeeded);
    assert_eq!(outcome.result.final_answer, "good-next");
    assert!(outcome
        .result
        .trace
        .steps_in(ThoughtStage::Expand)
        .any(|s| s.content.contains("failed")));
}

#[tokio::test]
async fn test_timed_out_expansion_is_treated_as_failure() {
    struct Stuck;

    #[async_trait]
    impl CompletionBackend for Stuck {
        async fn complete(&self, _request: &CompletionRequest) -> EngineResult<Completion> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Completion::text("too late"))
        }
    }

    let config = ReasoningConfig::default().with_call_timeout_ms(30);
    let result = TreeMode::new(Arc::new(Stuck), Arc::new(HeuristicEvaluator), &ctx(config))
        .run(&ReasoningTask::new("t"))
        .await;

    assert!(!result.succeeded);
    assert_eq!(result.confidence, 0.0);
    assert!(result.trace.last().unwrap().content.contains("timed out"));
}
