//! # Reasoning Orchestrator
//!
//! A reasoning-strategy engine for agent platforms: given a task, it decides
//! *how* an agent should reach an answer and returns one uniformly-shaped
//! result together with an audit trail of the steps taken.
//!
//! ## Strategies
//!
//! - **Iterative**: ReAct-style think → act → observe tool-use loop
//! - **Reflexive**: Attempt, validate, critique and retry with accumulated lessons
//! - **Tree search**: Beam-bounded best-first exploration of candidate approaches
//! - **Debate**: Multi-round debate between fixed perspectives, settled by a judge
//!
//! ## Architecture
//!
//! ```text
//! caller → ReasoningOrchestrator → engine → (CompletionBackend, ToolExecutor)*
//!                                              ↓
//!                                       Langbase Pipes (HTTP)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use reasoning_orchestrator::{Config, ReasoningOrchestrator, ReasoningTask};
//! use reasoning_orchestrator::langbase::{LangbaseBackend, LangbaseClient};
//! use reasoning_orchestrator::tools::ToolRegistry;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let client = LangbaseClient::new(&config.langbase, config.request.clone())?;
//!     let backend = Arc::new(LangbaseBackend::new(client, &config.langbase.pipe_name));
//!     let orchestrator = ReasoningOrchestrator::new(backend, Arc::new(ToolRegistry::new()));
//!
//!     let task = ReasoningTask::new("Compare two caching strategies");
//!     let result = orchestrator.run(&task, &config.reasoning).await;
//!     println!("{}", result.final_answer);
//!     Ok(())
//! }
//! ```

/// Collaborator traits and neutral wire types.
pub mod backend;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Langbase API client and the Langbase completion backend.
pub mod langbase;
/// Reasoning strategy implementations and shared task/config types.
pub mod modes;
/// Strategy selection and dispatch.
pub mod orchestrator;
/// System prompts for the reasoning strategies.
pub mod prompts;
/// Tool abstraction and registry.
pub mod tools;
/// Reasoning traces and results.
pub mod trace;

pub use config::Config;
pub use error::{AppError, AppResult, ReasoningError};
pub use modes::{ReasoningConfig, ReasoningStrategy, ReasoningTask};
pub use orchestrator::ReasoningOrchestrator;
pub use trace::{ReasoningResult, ReasoningTrace, ThoughtStage, ThoughtStep};
