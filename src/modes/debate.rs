//! Debate reasoning mode - multi-perspective rounds followed by a judge.
//!
//! Every round, each debater argues once from its fixed perspective, seeing the
//! complete history of earlier rounds but nothing from the current one. The
//! round's calls run concurrently and are joined before the next round starts;
//! arguments are ordered by debater id before they enter the history.
//!
//! After the last round a judge call returns a JSON verdict. When the judge is
//! unreachable or its answer has no readable JSON object, the verdict is
//! synthesized from the last round with [`fallback_verdict`].

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{
    find_json_object, preview, truncate_chars, ModeCore, ReasoningStrategy, ReasoningTask,
    RunContext,
};
use crate::backend::{CompletionBackend, CompletionRequest, Message};
use crate::error::{EngineResult, ReasoningError};
use crate::prompts::{DEBATER_PROMPT, JUDGE_PROMPT};
use crate::trace::{ReasoningResult, ReasoningTrace, ThoughtStage};

/// Separator between arguments in the judge input.
pub const HISTORY_SEPARATOR: &str = "\n\n---\n\n";

const DEFAULT_APPROACH: &str = "No approach selected";
const DEFAULT_INSIGHTS: &str = "No insights available";
const FALLBACK_APPROACH: &str = "Direct implementation approach";
const FALLBACK_INSIGHTS: &str = "No insights available from debate";
const DEFAULT_CONFIDENCE: f64 = 0.5;
const FALLBACK_APPROACH_CHARS: usize = 300;
const FALLBACK_INSIGHT_CHARS: usize = 150;

const PERSPECTIVES: [&str; 5] = [
    "Pragmatist",
    "Skeptic",
    "Innovator",
    "Risk Analyst",
    "User Advocate",
];

/// One argument made by one debater in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebaterArgument {
    /// 0-based
    pub round: usize,
    /// 0-based
    pub debater_id: usize,
    pub perspective: String,
    pub argument: String,
}

/// The judge's decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeVerdict {
    pub selected_approach: String,
    pub synthesized_insights: String,
    /// Always within [0,1].
    pub confidence: f64,
}

/// Full outcome of a debate, including the argument log.
#[derive(Debug, Clone)]
pub struct DebateOutcome {
    pub result: ReasoningResult,
    pub arguments: Vec<DebaterArgument>,
    /// `None` when the debate never reached the judge.
    pub verdict: Option<JudgeVerdict>,
}

/// `count` distinct perspective names.
///
/// The fixed roster is reused with a numeric suffix past its end.
pub fn perspectives(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let base = PERSPECTIVES[i % PERSPECTIVES.len()];
            match i / PERSPECTIVES.len() {
                0 => base.to_string(),
                cycle => format!("{} {}", base, cycle + 1),
            }
        })
        .collect()
}

/// Render arguments as `[Round r] Debater d (perspective): text` blocks.
pub fn format_debate_history(arguments: &[DebaterArgument]) -> String {
    arguments
        .iter()
        .map(|a| {
            format!(
                "[Round {}] Debater {} ({}): {}",
                a.round + 1,
                a.debater_id + 1,
                a.perspective,
                a.argument
            )
        })
        .collect::<Vec<_>>()
        .join(HISTORY_SEPARATOR)
}

/// Parse the judge's answer.
///
/// Uses the first brace-balanced object in the text. Missing fields take
/// their documented defaults; `None` means there was no parsable object.
pub fn parse_verdict(completion: &str) -> Option<JudgeVerdict> {
    let value: serde_json::Value = serde_json::from_str(find_json_object(completion)?).ok()?;
    let object = value.as_object()?;

    let text_field = |key: &str, default: &str| {
        object
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| default.to_string())
    };

    let confidence = object
        .get("confidence")
        .and_then(|v| v.as_f64())
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(DEFAULT_CONFIDENCE);

    Some(JudgeVerdict {
        selected_approach: text_field("selectedApproach", DEFAULT_APPROACH),
        synthesized_insights: text_field("synthesizedInsights", DEFAULT_INSIGHTS),
        confidence,
    })
}

/// Deterministic verdict built from the last round's arguments.
pub fn fallback_verdict(arguments: &[DebaterArgument]) -> JudgeVerdict {
    let last_round = arguments.iter().map(|a| a.round).max();
    let mut last: Vec<&DebaterArgument> = arguments
        .iter()
        .filter(|a| Some(a.round) == last_round)
        .collect();
    last.sort_by_key(|a| a.debater_id);

    let selected_approach = last
        .first()
        .map(|a| truncate_chars(&a.argument, FALLBACK_APPROACH_CHARS))
        .unwrap_or_else(|| FALLBACK_APPROACH.to_string());

    let synthesized_insights = if last.is_empty() {
        FALLBACK_INSIGHTS.to_string()
    } else {
        last.iter()
            .map(|a| {
                format!(
                    "[{}]: {}",
                    a.perspective,
                    truncate_chars(&a.argument, FALLBACK_INSIGHT_CHARS)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    JudgeVerdict {
        selected_approach,
        synthesized_insights,
        confidence: DEFAULT_CONFIDENCE,
    }
}

/// Debate reasoning mode handler.
#[derive(Clone)]
pub struct DebateMode {
    /// Backend access plus timeout/cancellation.
    core: ModeCore,
    max_rounds: usize,
    perspectives: Vec<String>,
}

impl DebateMode {
    /// Create a new debate for one run, using the default perspective roster
    pub fn new(backend: Arc<dyn CompletionBackend>, ctx: &RunContext) -> Self {
        Self {
            core: ModeCore::new(backend, ctx),
            max_rounds: ctx.config.max_rounds.max(1),
            perspectives: perspectives(ctx.config.debater_count.max(1)),
        }
    }

    /// Replace the perspectives; one debater per entry.
    ///
    /// An empty list keeps the current perspectives.
    pub fn with_perspectives(mut self, perspectives: Vec<String>) -> Self {
        if !perspectives.is_empty() {
            self.perspectives = perspectives;
        }
        self
    }

    /// Run the debate. Never fails.
    pub async fn run(&self, task: &ReasoningTask) -> ReasoningResult {
        self.debate(task).await.result
    }

    /// Run the debate and keep the argument log and verdict.
    pub async fn debate(&self, task: &ReasoningTask) -> DebateOutcome {
        let start = Instant::now();
        let strategy = ReasoningStrategy::Debate;
        let mut trace = ReasoningTrace::new();
        let mut arguments = Vec::new();

        if let Err(e) = self.argue_rounds(task, &mut arguments, &mut trace).await {
            let result = match e {
                ReasoningError::Cancelled => {
                    info!(strategy = %strategy, arguments = arguments.len(), "Debate cancelled");
                    ReasoningResult::cancelled(strategy, trace)
                }
                e => {
                    warn!(strategy = %strategy, error = %e, "Debate aborted");
                    ReasoningResult::degraded(strategy, String::new(), trace, e)
                }
            };
            return DebateOutcome {
                result,
                arguments,
                verdict: None,
            };
        }

        let verdict = match self.judge(task, &arguments).await {
            Ok(verdict) => verdict,
            Err(_) => {
                info!(strategy = %strategy, "Debate cancelled before judging");
                return DebateOutcome {
                    result: ReasoningResult::cancelled(strategy, trace),
                    arguments,
                    verdict: None,
                };
            }
        };

        trace.record(
            ThoughtStage::Judge,
            format!(
                "Selected approach: {}\nSynthesized insights: {}\nConfidence: {:.2}",
                verdict.selected_approach, verdict.synthesized_insights, verdict.confidence
            ),
        );

        info!(
            strategy = %strategy,
            debaters = self.perspectives.len(),
            rounds = self.max_rounds,
            arguments = arguments.len(),
            confidence = verdict.confidence,
            latency_ms = start.elapsed().as_millis(),
            "Debate completed"
        );

        DebateOutcome {
            result: ReasoningResult::success(
                strategy,
                verdict.selected_approach.clone(),
                verdict.confidence,
                trace,
            ),
            arguments,
            verdict: Some(verdict),
        }
    }

    async fn argue_rounds(
        &self,
        task: &ReasoningTask,
        arguments: &mut Vec<DebaterArgument>,
        trace: &mut ReasoningTrace,
    ) -> EngineResult<()> {
        let task = Arc::new(task.clone());

        for round in 0..self.max_rounds {
            self.core.ensure_active()?;
            debug!(round = round, debaters = self.perspectives.len(), "Starting debate round");

            let history = Arc::new(format_debate_history(arguments));
            let mut join_set: JoinSet<(usize, EngineResult<String>)> = JoinSet::new();

            for (debater_id, perspective) in self.perspectives.iter().enumerate() {
                let core = self.core.clone();
                let task = Arc::clone(&task);
                let history = Arc::clone(&history);
                let perspective = perspective.clone();

                join_set.spawn(async move {
                    let messages = build_debater_messages(&task, &perspective, &history, round);
                    let argument = core
                        .complete(CompletionRequest::new(messages))
                        .await
                        .map(|c| c.text);
                    (debater_id, argument)
                });
            }

            let mut produced = Vec::with_capacity(self.perspectives.len());
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(entry) => produced.push(entry),
                    Err(e) => warn!(round = round, error = %e, "Debater task panicked"),
                }
            }

            self.core.ensure_active()?;
            produced.sort_by_key(|(id, _)| *id);

            let mut last_error = None;
            let mut added = 0;
            for (debater_id, argument) in produced {
                match argument {
                    Ok(text) if !text.trim().is_empty() => {
                        let perspective = self.perspectives[debater_id].clone();
                        trace.record(
                            ThoughtStage::Argue,
                            format!(
                                "[Round {}] Debater {} ({}): {}",
                                round + 1,
                                debater_id + 1,
                                perspective,
                                text
                            ),
                        );
                        arguments.push(DebaterArgument {
                            round,
                            debater_id,
                            perspective,
                            argument: text,
                        });
                        added += 1;
                    }
                    Ok(_) => {
                        warn!(round = round, debater = debater_id, "Debater returned an empty argument");
                    }
                    Err(ReasoningError::Cancelled) => return Err(ReasoningError::Cancelled),
                    Err(e) => {
                        warn!(round = round, debater = debater_id, error = %e, "Debater failed");
                        last_error = Some(e);
                    }
                }
            }

            if added == 0 {
                return Err(last_error.unwrap_or_else(|| {
                    ReasoningError::backend(format!("no debater produced an argument in round {}", round + 1))
                }));
            }
        }

        Ok(())
    }

    /// Ask the judge; only cancellation is returned as an error.
    async fn judge(
        &self,
        task: &ReasoningTask,
        arguments: &[DebaterArgument],
    ) -> EngineResult<JudgeVerdict> {
        let messages = vec![
            Message::system(JUDGE_PROMPT),
            Message::user(format!(
                "Task:\n{}\n\nDebate:\n{}",
                task.render(),
                format_debate_history(arguments)
            )),
        ];

        match self.core.complete(CompletionRequest::new(messages)).await {
            Ok(completion) => match parse_verdict(&completion.text) {
                Some(verdict) => Ok(verdict),
                None => {
                    warn!(
                        completion_preview = %preview(&completion.text, 200),
                        "Judge response had no parsable verdict, using fallback"
                    );
                    Ok(fallback_verdict(arguments))
                }
            },
            Err(ReasoningError::Cancelled) => Err(ReasoningError::Cancelled),
            Err(e) => {
                warn!(error = %e, "Judge call failed, using fallback verdict");
                Ok(fallback_verdict(arguments))
            }
        }
    }
}

fn build_debater_messages(
    task: &ReasoningTask,
    perspective: &str,
    history: &str,
    round: usize,
) -> Vec<Message> {
    let history = if history.is_empty() {
        "(no arguments yet)"
    } else {
        history
    };
    vec![
        Message::system(DEBATER_PROMPT.replace("{perspective}", perspective)),
        Message::user(format!(
            "Task:\n{}\n\nDebate so far:\n{}\n\nGive your argument for round {}.",
            task.render(),
            history,
            round + 1
        )),
    ]
}
