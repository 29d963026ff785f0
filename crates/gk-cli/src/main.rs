//! Gatekeep CLI - operator interface for the dependency blocking engine.
//!
//! Every write goes to the store first and is then reported to the engine
//! through its mutation hooks, the same path an embedding application uses.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use gk_core::{
    BlockedEntry, Complexity, Dependency, DependencyKind, Element, ElementStatus, ElementType,
    EngineConfig, Gate, Priority, PropagationConfig,
};
use gk_engine::{sort_by_effective_priority, BlockingEngine, MutationObserver};
use gk_storage::{Database, ElementStore};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DB_FILE: &str = "gatekeep.db";

#[derive(Parser)]
#[command(name = "gatekeep")]
#[command(about = "Gatekeep - dependency blocking for tasks and plans", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new gatekeep workspace
    Init {
        /// Path to initialize (defaults to current directory)
        path: Option<String>,
    },

    /// Add an element
    Add {
        /// Element ID
        id: String,

        /// Element type (task, plan, workflow, ...)
        #[arg(short = 't', long = "type", default_value = "task")]
        element_type: String,

        /// Priority (1-5 or critical/high/medium/low/minimal)
        #[arg(short, long)]
        priority: Option<String>,

        /// Complexity (1-5 or trivial/simple/medium/complex/very_complex)
        #[arg(short, long)]
        complexity: Option<String>,
    },

    /// Change an element's status
    Status {
        /// Element ID
        id: String,

        /// New status
        status: String,
    },

    /// Soft-delete an element
    Delete {
        /// Element ID
        id: String,
    },

    /// Manage dependency edges
    Dep {
        #[command(subcommand)]
        command: DepCommands,
    },

    /// Evaluate one element against the current graph
    Check {
        /// Element ID
        id: String,
    },

    /// List blocked elements
    Blocked {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Recompute the blocked cache from scratch
    Rebuild,

    /// Satisfy or approve gates on awaits edges
    Gate {
        #[command(subcommand)]
        command: GateCommands,
    },

    /// Show effective priority of a task
    Priority {
        /// Task ID
        id: String,

        /// Override propagation depth
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Show aggregate complexity of a task
    Complexity {
        /// Task ID
        id: String,

        /// Override propagation depth
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// List unblocked open tasks, most urgent first
    Ready {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum DepCommands {
    /// Add a dependency edge (source depends on target)
    Add {
        source: String,
        target: String,

        /// Edge kind (blocks, parent-child, awaits, relates-to, references)
        #[arg(short, long, default_value = "blocks")]
        kind: String,

        /// Timer gate: RFC 3339 time to wait until
        #[arg(long)]
        timer: Option<String>,

        /// Approval gate: required approvers (comma separated)
        #[arg(long, value_delimiter = ',')]
        approvers: Vec<String>,

        /// Approval gate: approvals needed (defaults to all approvers)
        #[arg(long)]
        approval_count: Option<usize>,

        /// External gate: system name
        #[arg(long, requires = "external_id")]
        external_system: Option<String>,

        /// External gate: id in the external system
        #[arg(long)]
        external_id: Option<String>,

        /// Webhook gate: callback URL
        #[arg(long, requires = "callback_id")]
        webhook_url: Option<String>,

        /// Webhook gate: callback id
        #[arg(long)]
        callback_id: Option<String>,
    },

    /// Remove a dependency edge
    Remove {
        source: String,
        target: String,

        /// Edge kind
        #[arg(short, long, default_value = "blocks")]
        kind: String,
    },
}

#[derive(Subcommand)]
enum GateCommands {
    /// Mark an external or webhook gate satisfied
    Satisfy {
        source: String,
        target: String,

        /// Who satisfied the gate (defaults to $USER)
        #[arg(long)]
        actor: Option<String>,
    },

    /// Record an approval
    Approve {
        source: String,
        target: String,
        approver: String,
    },

    /// Withdraw an approval
    Unapprove {
        source: String,
        target: String,
        approver: String,
    },
}

/// Gate options collected from `dep add`.
struct GateArgs {
    timer: Option<String>,
    approvers: Vec<String>,
    approval_count: Option<usize>,
    external_system: Option<String>,
    external_id: Option<String>,
    webhook_url: Option<String>,
    callback_id: Option<String>,
}

impl GateArgs {
    fn into_gate(self) -> Result<Option<Gate>> {
        let mut gates = Vec::new();

        if let Some(timer) = self.timer {
            let wait_until = DateTime::parse_from_rfc3339(&timer)
                .map_err(|e| anyhow!("Invalid timer '{}': {}", timer, e))?
                .with_timezone(&Utc);
            gates.push(Gate::timer(wait_until));
        }
        if !self.approvers.is_empty() {
            gates.push(Gate::approval(self.approvers, self.approval_count));
        }
        if let (Some(system), Some(id)) = (self.external_system, self.external_id) {
            gates.push(Gate::external(system, id));
        }
        if let (Some(url), Some(callback)) = (self.webhook_url, self.callback_id) {
            gates.push(Gate::webhook(url, callback));
        }

        match gates.len() {
            0 => Ok(None),
            1 => Ok(gates.pop()),
            _ => bail!("Only one gate may be attached to an awaits edge"),
        }
    }
}

/// Find the .gatekeep directory by walking up from the current directory.
fn find_gatekeep_dir() -> Result<PathBuf> {
    let mut current = env::current_dir()?;

    loop {
        let candidate = current.join(".gatekeep");
        if candidate.is_dir() {
            return Ok(candidate);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => {
                return Err(anyhow!(
                    "No .gatekeep directory found. Run 'gatekeep init' to initialize a workspace."
                ));
            }
        }
    }
}

/// Open the store and a warm-started engine for the enclosing workspace.
async fn open_engine() -> Result<(Arc<Database>, BlockingEngine<Database>)> {
    let gatekeep_dir = find_gatekeep_dir()?;
    let root = gatekeep_dir.parent().unwrap_or(Path::new("."));
    let config = EngineConfig::load_or_default(root)?;

    let db = Database::open(gatekeep_dir.join(DB_FILE)).await?;
    db.init_schema().await?;
    let store = Arc::new(db);

    let engine = BlockingEngine::open(Arc::clone(&store), config).await?;
    Ok((store, engine))
}

fn propagation_config(engine: &BlockingEngine<Database>, depth: Option<usize>) -> PropagationConfig {
    match depth {
        Some(depth) => PropagationConfig::with_max_depth(depth),
        None => engine.config().propagation,
    }
}

fn colored_status(status: ElementStatus) -> colored::ColoredString {
    let text = status.as_str();
    match status {
        ElementStatus::Open => text.green(),
        ElementStatus::InProgress => text.yellow(),
        ElementStatus::Blocked => text.red(),
        ElementStatus::Closed | ElementStatus::Completed => text.bright_black(),
        ElementStatus::Cancelled | ElementStatus::Tombstone => text.bright_black().dimmed(),
    }
}

fn colored_priority(priority: Priority) -> colored::ColoredString {
    let text = priority.to_string();
    match priority {
        Priority::Critical => text.red().bold(),
        Priority::High => text.yellow(),
        Priority::Medium => text.normal(),
        Priority::Low | Priority::Minimal => text.bright_black(),
    }
}

fn print_entries(entries: &[BlockedEntry]) {
    println!(
        "{:<24} {:<24} {}",
        "ELEMENT".bold(),
        "BLOCKED BY".bold(),
        "REASON".bold()
    );
    println!("{}", "─".repeat(80));
    for entry in entries {
        println!(
            "{:<24} {:<24} {}",
            entry.element_id.bright_cyan(),
            entry.blocked_by.red(),
            entry.reason
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Init { path } => {
            let target = path.unwrap_or_else(|| ".".to_string());
            let root = Path::new(&target);
            let gatekeep_dir = root.join(".gatekeep");
            tokio::fs::create_dir_all(&gatekeep_dir).await?;

            let db_path = gatekeep_dir.join(DB_FILE);
            let db = Database::open(&db_path).await?;
            db.init_schema().await?;

            let config_path = gatekeep_dir.join("config.toml");
            if !config_path.exists() {
                EngineConfig::write_default(root)?;
            }

            info!(path = %gatekeep_dir.display(), "initialized workspace");
            println!("{}", "✓ Initialized gatekeep workspace".green().bold());
            println!("  Database: {}", db_path.display());
            println!("  Config:   {}", config_path.display());
            Ok(())
        }

        Commands::Add {
            id,
            element_type,
            priority,
            complexity,
        } => {
            let (store, mut engine) = open_engine().await?;
            if store.get_element(&id).await?.is_some() {
                bail!("Element already exists: {}", id);
            }

            let element_type: ElementType = element_type.parse()?;
            let mut element = match element_type {
                ElementType::Task => Element::task(id.clone()),
                other => Element::new(id.clone(), other),
            };
            if let Some(priority) = priority {
                element.priority = Some(priority.parse::<Priority>()?);
            }
            if let Some(complexity) = complexity {
                element.complexity = Some(complexity.parse::<Complexity>()?);
            }
            store.upsert_element(&element).await?;
            // Edges may already point at this id; until now it counted as completed.
            engine.invalidate_dependents(&id).await?;

            println!("{}", "✓ Added element".green().bold());
            println!("  ID:   {}", id.bright_cyan());
            println!("  Type: {}", element.element_type);
            Ok(())
        }

        Commands::Status { id, status } => {
            let (store, mut engine) = open_engine().await?;
            let new_status: ElementStatus = status.parse()?;

            let old_status = store
                .set_status(&id, new_status)
                .await?
                .ok_or_else(|| anyhow!("Element not found: {}", id))?;
            engine.on_status_changed(&id, old_status, new_status).await?;

            println!(
                "{} {} {} → {}",
                "✓".green().bold(),
                id.bright_cyan(),
                colored_status(old_status),
                colored_status(new_status)
            );
            Ok(())
        }

        Commands::Delete { id } => {
            let (store, mut engine) = open_engine().await?;
            if !store.soft_delete(&id).await? {
                bail!("Element not found: {}", id);
            }
            engine.on_element_deleted(&id).await?;

            println!("{} Deleted {}", "✓".green().bold(), id.bright_cyan());
            Ok(())
        }

        Commands::Dep { command } => {
            let (store, mut engine) = open_engine().await?;

            match command {
                DepCommands::Add {
                    source,
                    target,
                    kind,
                    timer,
                    approvers,
                    approval_count,
                    external_system,
                    external_id,
                    webhook_url,
                    callback_id,
                } => {
                    let kind: DependencyKind = kind.parse()?;
                    let gate = GateArgs {
                        timer,
                        approvers,
                        approval_count,
                        external_system,
                        external_id,
                        webhook_url,
                        callback_id,
                    }
                    .into_gate()?;

                    let mut dep = Dependency::new(source.clone(), target.clone(), kind);
                    dep.gate = gate;
                    dep.created_by = env::var("USER").ok();
                    store.upsert_dependency(&dep).await?;
                    engine.on_dependency_added(&source, &target, kind).await?;

                    println!(
                        "{} {} {} {}",
                        "✓".green().bold(),
                        source.bright_cyan(),
                        kind.as_str().bold(),
                        target.bright_cyan()
                    );
                }
                DepCommands::Remove {
                    source,
                    target,
                    kind,
                } => {
                    let kind: DependencyKind = kind.parse()?;
                    if !store.remove_dependency(&source, &target, kind).await? {
                        bail!("No {} edge from {} to {}", kind, source, target);
                    }
                    engine.on_dependency_removed(&source, &target, kind).await?;

                    println!(
                        "{} Removed {} {} {}",
                        "✓".green().bold(),
                        source.bright_cyan(),
                        kind.as_str(),
                        target.bright_cyan()
                    );
                }
            }
            Ok(())
        }

        Commands::Check { id } => {
            let (store, engine) = open_engine().await?;
            let element = store
                .get_element(&id)
                .await?
                .ok_or_else(|| anyhow!("Element not found: {}", id))?;

            println!("{:<12} {}", "Element:".bold(), id.bright_cyan());
            println!("{:<12} {}", "Type:".bold(), element.element_type);
            println!("{:<12} {}", "Status:".bold(), colored_status(element.status));

            match engine.compute_blocking_state(&id).await? {
                Some(info) => {
                    println!("{:<12} {}", "Blocked:".bold(), "yes".red().bold());
                    println!("{:<12} {}", "By:".bold(), info.blocked_by.bright_cyan());
                    println!("{:<12} {}", "Reason:".bold(), info.reason);
                }
                None => println!("{:<12} {}", "Blocked:".bold(), "no".green()),
            }

            let waiting = engine.get_blocked_by(&id);
            if !waiting.is_empty() {
                println!("{:<12} {}", "Blocking:".bold(), waiting.join(", "));
            }
            Ok(())
        }

        Commands::Blocked { json } => {
            let (_store, engine) = open_engine().await?;
            let entries = engine.get_all_blocked();

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("{}", "No blocked elements".green());
            } else {
                print_entries(&entries);
            }
            Ok(())
        }

        Commands::Rebuild => {
            let (_store, mut engine) = open_engine().await?;
            let stats = engine.rebuild().await?;

            println!("{}", "✓ Rebuilt blocked cache".green().bold());
            println!("  Checked:  {}", stats.elements_checked);
            println!("  Blocked:  {}", stats.elements_blocked);
            println!("  Duration: {}ms", stats.duration_ms);
            Ok(())
        }

        Commands::Gate { command } => {
            let (_store, mut engine) = open_engine().await?;

            match command {
                GateCommands::Satisfy {
                    source,
                    target,
                    actor,
                } => {
                    let actor = actor
                        .or_else(|| env::var("USER").ok())
                        .unwrap_or_else(|| "gatekeep".to_string());
                    if !engine.satisfy_gate(&source, &target, &actor).await? {
                        bail!(
                            "No external or webhook gate on {} awaits {}",
                            source,
                            target
                        );
                    }
                    println!("{} Gate satisfied by {}", "✓".green().bold(), actor);
                }
                GateCommands::Approve {
                    source,
                    target,
                    approver,
                } => {
                    let outcome = engine.record_approval(&source, &target, &approver).await?;
                    if !outcome.success {
                        bail!(
                            "Approval rejected: {} is not a required approver on an approval gate",
                            approver
                        );
                    }
                    println!(
                        "{} Approvals {}/{}{}",
                        "✓".green().bold(),
                        outcome.current_count,
                        outcome.required_count,
                        if outcome.satisfied {
                            " (satisfied)".green().to_string()
                        } else {
                            String::new()
                        }
                    );
                }
                GateCommands::Unapprove {
                    source,
                    target,
                    approver,
                } => {
                    let removal = engine.remove_approval(&source, &target, &approver).await?;
                    if !removal.success {
                        bail!("No approval gate on {} awaits {}", source, target);
                    }
                    println!(
                        "{} Approvals now {}{}",
                        "✓".green().bold(),
                        removal.current_count,
                        if removal.satisfied {
                            " (satisfied)".green().to_string()
                        } else {
                            " (unsatisfied)".yellow().to_string()
                        }
                    );
                }
            }
            Ok(())
        }

        Commands::Priority { id, depth } => {
            let (_store, engine) = open_engine().await?;
            let config = propagation_config(&engine, depth);
            let result = engine
                .propagation()
                .calculate_effective_priority(&id, config)
                .await?;

            println!("{:<12} {}", "Task:".bold(), id.bright_cyan());
            println!("{:<12} {}", "Base:".bold(), colored_priority(result.base_priority));
            println!(
                "{:<12} {}",
                "Effective:".bold(),
                colored_priority(result.effective_priority)
            );
            if result.is_influenced {
                println!(
                    "{:<12} {}",
                    "Raised by:".bold(),
                    result.dependent_influencers.join(", ")
                );
            }
            Ok(())
        }

        Commands::Complexity { id, depth } => {
            let (_store, engine) = open_engine().await?;
            let config = propagation_config(&engine, depth);
            let result = engine
                .propagation()
                .calculate_aggregate_complexity(&id, config)
                .await?;

            println!("{:<12} {}", "Task:".bold(), id.bright_cyan());
            println!("{:<12} {}", "Base:".bold(), result.base_complexity.points());
            println!("{:<12} {}", "Aggregate:".bold(), result.aggregate_complexity);
            println!("{:<12} {}", "Blockers:".bold(), result.blocker_count);
            for blocker in &result.blockers {
                println!("  {:<24} {}", blocker.id.bright_cyan(), blocker.complexity.points());
            }
            Ok(())
        }

        Commands::Ready { json } => {
            let (store, engine) = open_engine().await?;
            let candidates: Vec<Element> = store
                .list_elements()
                .await?
                .into_iter()
                .filter(|e| e.element_type == ElementType::Task && !e.is_deleted())
                .filter(|e| matches!(e.status, ElementStatus::Open | ElementStatus::InProgress))
                .filter(|e| engine.is_blocked(&e.id).is_none())
                .collect();

            let config = engine.config().propagation;
            let mut ready = engine
                .propagation()
                .enhance_tasks_with_effective_priority(candidates, config)
                .await?;
            sort_by_effective_priority(&mut ready);

            if json {
                println!("{}", serde_json::to_string_pretty(&ready)?);
                return Ok(());
            }
            if ready.is_empty() {
                println!("{}", "No ready tasks".yellow());
                return Ok(());
            }

            println!(
                "{:<24} {:<16} {:<16} {}",
                "ID".bold(),
                "PRIORITY".bold(),
                "EFFECTIVE".bold(),
                "STATUS".bold()
            );
            println!("{}", "─".repeat(80));
            for task in &ready {
                let marker = if task.priority_influenced { " ↑" } else { "" };
                println!(
                    "{:<24} {:<16} {:<16} {}{}",
                    task.task.id.bright_cyan(),
                    colored_priority(task.task.priority_or_default()),
                    colored_priority(task.effective_priority),
                    colored_status(task.task.status),
                    marker
                );
            }
            Ok(())
        }
    }
}
