//! Roster CLI - staff an AI employee from a job description
//!
//! Usage:
//!   roster init                          Write .roster/config.toml
//!   roster start <job>                   Start a thread
//!   roster resume <thread> <answer>      Answer a pending question
//!   roster show <thread>                 Print a thread's checkpoint
//!   roster threads                       List stored threads
//!   roster check <provider/id>...        Show which capabilities need approval

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use roster_core::{AiEmployee, CapabilityRef, Catalog, RosterConfig, StaticCatalog};
use roster_llm::{AnthropicModel, HttpCatalog, Model};
use roster_orchestrator::{
    Engine, EventStream, ExecutionContext, ResumeRequest, RunOutcome,
};
use roster_store::FileCheckpointStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "roster")]
#[command(author, version, about = "Turn job descriptions into AI employees")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default .roster/config.toml
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Start a thread for a job description
    Start {
        /// The job description
        job: String,

        /// JSON catalog file (overrides the configured catalog)
        #[arg(long, value_name = "FILE")]
        catalog: Option<PathBuf>,

        /// Model to use (overrides model.default)
        #[arg(short, long)]
        model: Option<CliModel>,

        /// Print lifecycle events as JSON lines while the thread runs
        #[arg(long)]
        events: bool,
    },

    /// Answer a pending question and continue the thread
    Resume {
        /// Thread id printed by `start`
        thread: String,

        /// The answer
        answer: String,

        /// Interrupt to answer (defaults to the first pending one)
        #[arg(long, value_name = "ID")]
        interrupt: Option<String>,

        /// JSON catalog file (overrides the configured catalog)
        #[arg(long, value_name = "FILE")]
        catalog: Option<PathBuf>,

        /// Model to use (overrides model.default)
        #[arg(short, long)]
        model: Option<CliModel>,

        /// Print lifecycle events as JSON lines while the thread runs
        #[arg(long)]
        events: bool,
    },

    /// Print the committed state of a thread
    Show {
        thread: String,
    },

    /// List stored threads
    Threads,

    /// Show the risk of capabilities and whether invoking them needs approval
    Check {
        /// Capabilities as providerId/id
        #[arg(required = true)]
        capabilities: Vec<CapabilityRef>,

        /// JSON catalog file (overrides the configured catalog)
        #[arg(long, value_name = "FILE")]
        catalog: Option<PathBuf>,
    },
}

/// CLI-friendly model enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliModel {
    Opus,
    Sonnet,
    Haiku,
}

impl From<CliModel> for Model {
    fn from(m: CliModel) -> Self {
        match m {
            CliModel::Opus => Model::Opus,
            CliModel::Sonnet => Model::Sonnet,
            CliModel::Haiku => Model::Haiku,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over --verbose
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init { path } => cmd_init(&path),
        Commands::Start {
            job,
            catalog,
            model,
            events,
        } => cmd_start(job, catalog, model, events).await,
        Commands::Resume {
            thread,
            answer,
            interrupt,
            catalog,
            model,
            events,
        } => {
            let mut request = ResumeRequest::new(thread, answer);
            if let Some(id) = interrupt {
                request = request.for_interrupt(id);
            }
            cmd_resume(request, catalog, model, events).await
        }
        Commands::Show { thread } => cmd_show(&thread).await,
        Commands::Threads => cmd_threads().await,
        Commands::Check {
            capabilities,
            catalog,
        } => cmd_check(&capabilities, catalog).await,
    }
}

fn cmd_init(path: &Path) -> Result<()> {
    let config_path = RosterConfig::write_default(path).context("Failed to write config")?;
    println!("Initialized roster in {:?}", path);
    println!("Created:");
    println!("  {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Set catalog.file or catalog.base_url in the config");
    println!("  2. Export ANTHROPIC_API_KEY");
    println!("  3. Run 'roster start \"<job description>\"'");
    Ok(())
}

fn load_config() -> Result<RosterConfig> {
    RosterConfig::load_or_default(Path::new(".")).context("Failed to load .roster/config.toml")
}

fn build_catalog(config: &RosterConfig, file: Option<PathBuf>) -> Result<Arc<dyn Catalog>> {
    if let Some(file) = file.or_else(|| config.catalog.file.clone()) {
        let catalog = StaticCatalog::from_file(&file)
            .with_context(|| format!("Failed to load catalog {}", file.display()))?;
        return Ok(Arc::new(catalog));
    }

    match (&config.catalog.base_url, &config.catalog.organization_id) {
        (Some(base_url), Some(organization_id)) => {
            Ok(Arc::new(HttpCatalog::new(base_url, organization_id)))
        }
        (Some(_), None) => bail!("catalog.base_url requires catalog.organization_id"),
        _ => bail!("No catalog configured: pass --catalog FILE or set catalog.file"),
    }
}

fn build_engine(config: &RosterConfig, model: Option<CliModel>) -> Result<Engine> {
    let model = match model {
        Some(model) => Model::from(model),
        None => config
            .model
            .default
            .parse::<Model>()
            .map_err(|e| anyhow!(e))?,
    };
    info!("Using model {}", model);

    let client = AnthropicModel::from_env(model, &config.model.api_key_env)
        .context("Model credentials missing")?
        .with_max_tokens(config.model.max_tokens);
    let store = FileCheckpointStore::new(&config.store.dir);

    Ok(Engine::new(
        Arc::new(client),
        Arc::new(store),
        config.engine.clone(),
    ))
}

fn build_context(config: &RosterConfig, catalog: Option<PathBuf>) -> Result<ExecutionContext> {
    let mut ctx = ExecutionContext::new(build_catalog(config, catalog)?)
        .with_approval(config.approval.policy());
    if let Some(ref organization_id) = config.catalog.organization_id {
        ctx = ctx.with_organization(organization_id.clone());
    }
    Ok(ctx)
}

async fn cmd_start(
    job: String,
    catalog: Option<PathBuf>,
    model: Option<CliModel>,
    events: bool,
) -> Result<()> {
    let config = load_config()?;
    let ctx = build_context(&config, catalog)?;
    let engine = Arc::new(build_engine(&config, model)?);

    let outcome = if events {
        let (stream, handle) = engine.start_streaming(job, ctx.clone());
        follow(stream, handle).await?
    } else {
        engine.start(&job, &ctx).await?
    };
    report(&outcome)?;
    note_approvals(&ctx, &outcome).await
}

async fn cmd_resume(
    request: ResumeRequest,
    catalog: Option<PathBuf>,
    model: Option<CliModel>,
    events: bool,
) -> Result<()> {
    let config = load_config()?;
    let ctx = build_context(&config, catalog)?;
    let engine = Arc::new(build_engine(&config, model)?);

    let outcome = if events {
        let (stream, handle) = engine.resume_streaming(request, ctx.clone());
        follow(stream, handle).await?
    } else {
        engine.resume(request, &ctx).await?
    };
    report(&outcome)?;
    note_approvals(&ctx, &outcome).await
}

/// Print events until the run ends, then return its outcome
async fn follow(
    mut stream: EventStream,
    handle: JoinHandle<roster_core::Result<RunOutcome>>,
) -> Result<RunOutcome> {
    while let Some(event) = stream.next().await {
        eprintln!("{}", serde_json::to_string(&event)?);
    }
    Ok(handle.await.context("Engine task panicked")??)
}

fn report(outcome: &RunOutcome) -> Result<()> {
    match outcome {
        RunOutcome::Completed {
            thread_id,
            employee,
            failures,
        } => {
            for failure in failures {
                warn!(
                    "Workflow '{}' failed: {}",
                    failure.workflow_description, failure.error
                );
            }
            info!("Thread {} completed", thread_id);
            println!("{}", serde_json::to_string_pretty(employee)?);
        }
        RunOutcome::Suspended {
            thread_id,
            interrupts,
        } => {
            println!("Thread {} is waiting for answers:", thread_id);
            for interrupt in interrupts {
                match interrupt.workflow {
                    Some(ref workflow) => println!("\n  [{}] ({})", interrupt.interrupt_id, workflow),
                    None => println!("\n  [{}]", interrupt.interrupt_id),
                }
                println!("  {}", interrupt.question);
            }
            if interrupts.len() == 1 {
                println!("\nAnswer with: roster resume {} \"<answer>\"", thread_id);
            } else {
                println!(
                    "\nAnswer with: roster resume {} \"<answer>\" --interrupt <id>",
                    thread_id
                );
            }
        }
    }
    Ok(())
}

/// Warn about agent capabilities whose invocations will wait for a human
async fn note_approvals(ctx: &ExecutionContext, outcome: &RunOutcome) -> Result<()> {
    let Some(employee) = outcome.employee() else {
        return Ok(());
    };
    let gate = ctx.approval_gate();
    for (agent, capability) in agent_capabilities(employee) {
        let check = gate.check(capability).await?;
        if check.requires_approval {
            warn!(
                "Agent '{}' uses {} ({} risk); invocations wait for approval",
                agent, capability, check.risk
            );
        }
    }
    Ok(())
}

fn agent_capabilities(employee: &AiEmployee) -> impl Iterator<Item = (&str, &CapabilityRef)> {
    employee.agents.iter().flat_map(|agent| {
        agent
            .capabilities
            .iter()
            .map(move |capability| (agent.name.as_str(), capability))
    })
}

async fn cmd_check(capabilities: &[CapabilityRef], catalog: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let gate = build_context(&config, catalog)?.approval_gate();

    for capability in capabilities {
        let check = gate
            .check(capability)
            .await
            .with_context(|| format!("Cannot assess {}", capability))?;
        println!(
            "  {}  {}  {}",
            check.capability,
            check.risk,
            if check.requires_approval {
                "approval required"
            } else {
                "no approval"
            }
        );
    }
    Ok(())
}

async fn cmd_show(thread: &str) -> Result<()> {
    let config = load_config()?;
    let store = FileCheckpointStore::new(&config.store.dir);
    let record = roster_store::CheckpointStore::load(&store, thread)
        .await?
        .ok_or_else(|| anyhow!("Thread not found: {}", thread))?;

    println!("Thread {} (version {})", record.thread_id, record.version);
    println!("Committed: {}", record.committed_at);
    println!("{}", serde_json::to_string_pretty(&record.payload)?);
    Ok(())
}

async fn cmd_threads() -> Result<()> {
    let config = load_config()?;
    let store = FileCheckpointStore::new(&config.store.dir);
    let threads = roster_store::CheckpointStore::list_threads(&store).await?;

    if threads.is_empty() {
        println!("No threads found");
        return Ok(());
    }
    println!("Threads:");
    for thread in threads {
        println!(
            "  {}  v{}  {}",
            thread.thread_id, thread.version, thread.committed_at
        );
    }
    Ok(())
}
