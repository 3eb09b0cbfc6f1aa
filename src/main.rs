use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reasoning_orchestrator::{
    config::{Config, LogFormat},
    langbase::{LangbaseBackend, LangbaseClient},
    tools::ToolRegistry,
    ReasoningOrchestrator, ReasoningStrategy, ReasoningTask,
};

/// Run one reasoning task against the configured Langbase pipe and print the
/// result as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Task description
    task: String,

    /// Strategy to use (iterative, reflexive, tree_search, debate); heuristic when omitted
    #[arg(long, short)]
    strategy: Option<ReasoningStrategy>,

    /// Constraint the answer must satisfy (repeatable)
    #[arg(long = "constraint", short = 'c')]
    constraints: Vec<String>,

    /// Tool name the agent may use (repeatable).
    ///
    /// The CLI ships no tool implementations: names only narrow the
    /// allow-list and steer strategy selection. Any tool call is answered
    /// with an unknown-tool observation.
    #[arg(long = "tool", short = 't')]
    tools: Vec<String>,

    /// Iteration cap for the iterative and reflexive strategies
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Debate rounds
    #[arg(long)]
    max_rounds: Option<usize>,

    /// Tree search depth
    #[arg(long)]
    max_depth: Option<usize>,

    /// Children per expanded tree node
    #[arg(long)]
    branch_factor: Option<usize>,

    /// Tree nodes kept per depth
    #[arg(long)]
    beam_width: Option<usize>,

    /// Number of debaters
    #[arg(long)]
    debaters: Option<usize>,

    /// Skip creating/updating the Langbase pipe
    #[arg(long, default_value_t = false)]
    skip_pipe_setup: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Reasoning orchestrator starting..."
    );

    let client = match LangbaseClient::new(&config.langbase, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.langbase.base_url, "Langbase client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize Langbase client");
            return Err(e.into());
        }
    };

    if !args.skip_pipe_setup {
        if let Err(e) = client.ensure_pipe(&config.langbase.pipe_name).await {
            error!(error = %e, pipe = %config.langbase.pipe_name, "Failed to ensure pipe exists");
            return Err(e.into());
        }
    }

    let backend = Arc::new(LangbaseBackend::new(client, &config.langbase.pipe_name));
    let orchestrator = ReasoningOrchestrator::new(backend, Arc::new(ToolRegistry::new()));

    let task = args
        .constraints
        .iter()
        .fold(ReasoningTask::new(&args.task), |t, c| t.with_constraint(c));
    let task = args.tools.iter().fold(task, |t, name| t.with_tool(name));

    let mut reasoning = config.reasoning.clone();
    if let Some(strategy) = args.strategy {
        reasoning = reasoning.with_strategy(strategy);
    }
    if let Some(n) = args.max_iterations {
        reasoning = reasoning.with_max_iterations(n);
    }
    if let Some(n) = args.max_rounds {
        reasoning = reasoning.with_max_rounds(n);
    }
    if let Some(n) = args.max_depth {
        reasoning = reasoning.with_max_depth(n);
    }
    if let Some(n) = args.branch_factor {
        reasoning = reasoning.with_branch_factor(n);
    }
    if let Some(n) = args.beam_width {
        reasoning = reasoning.with_beam_width(n);
    }
    if let Some(n) = args.debaters {
        reasoning = reasoning.with_debater_count(n);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling reasoning");
            on_interrupt.cancel();
        }
    });

    let result = orchestrator
        .run_with_cancel(&task, &reasoning, cancel)
        .await;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.succeeded {
        std::process::exit(2);
    }
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
