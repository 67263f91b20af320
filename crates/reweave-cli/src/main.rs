//! CLI binary for running modification requests against a project tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};

use reweave_engine::{ModificationOrchestrator, OrchestratorConfig};
use reweave_oracle::{DynOracle, HttpOracle, Oracle};
use reweave_sandbox::{find_composition_root, scan_project, PathSandbox, SandboxConfig};
use reweave_session::{JsonFileStore, SessionCache, SessionStore};
use reweave_types::ReweaveError;

#[derive(Parser)]
#[command(name = "rwv", version, about = "Natural-language modification engine for generated web apps")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a change request to a project
    Modify {
        /// The change request, in plain language
        request: String,

        /// Project root (the sandbox boundary)
        #[arg(short, long, default_value = ".")]
        project: PathBuf,

        /// Session id; reuse one id across iterative requests
        #[arg(short, long, default_value = "default")]
        session: String,

        /// Durable session-state directory (default: <project>/.reweave)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Confine writes to src/, pages/, and components/ only
        #[arg(long)]
        strict: bool,

        /// Wall-clock budget for the whole run, in seconds
        #[arg(long, default_value = "120")]
        timeout_secs: u64,

        /// Oracle model name (default: the provider's default)
        #[arg(long)]
        model: Option<String>,

        /// Don't call the oracle; rely on deterministic fallbacks only
        #[arg(long)]
        dry_run: bool,
    },

    /// Scan a project and print the file map
    Scan {
        /// Project root
        #[arg(short, long, default_value = ".")]
        project: PathBuf,
    },

    /// Print the change history of a session
    Changes {
        /// Session id
        #[arg(short, long, default_value = "default")]
        session: String,

        /// Project root
        #[arg(short, long, default_value = ".")]
        project: PathBuf,

        /// Durable session-state directory (default: <project>/.reweave)
        #[arg(long)]
        store: Option<PathBuf>,
    },
}

/// Oracle stand-in for `--dry-run`: every call fails, so the engine's
/// deterministic fallbacks drive the whole run.
struct OfflineOracle;

#[async_trait]
impl Oracle for OfflineOracle {
    async fn complete(&self, _context: &str, _prompt: &str) -> reweave_types::Result<String> {
        Err(ReweaveError::OracleReplyError {
            message: "dry run: oracle disabled".into(),
        })
    }

    fn name(&self) -> &str {
        "offline"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Modify {
            request,
            project,
            session,
            store,
            strict,
            timeout_secs,
            model,
            dry_run,
        } => {
            cmd_modify(
                &request,
                &project,
                &session,
                store.as_deref(),
                strict,
                timeout_secs,
                model.as_deref(),
                dry_run,
            )
            .await?;
        }
        Commands::Scan { project } => {
            cmd_scan(&project).await?;
        }
        Commands::Changes {
            session,
            project,
            store,
        } => {
            cmd_changes(&session, &project, store.as_deref()).await?;
        }
    }

    Ok(())
}

fn store_dir(project: &Path, store: Option<&Path>) -> PathBuf {
    match store {
        Some(dir) => dir.to_path_buf(),
        None => project.join(".reweave"),
    }
}

fn build_oracle(dry_run: bool, model: Option<&str>) -> anyhow::Result<DynOracle> {
    if dry_run {
        return Ok(DynOracle::new(OfflineOracle));
    }
    let mut oracle = HttpOracle::from_env()?;
    if let Some(model) = model {
        oracle = oracle.with_model(model.to_string());
    }
    Ok(DynOracle::new(oracle))
}

#[allow(clippy::too_many_arguments)]
async fn cmd_modify(
    request: &str,
    project: &Path,
    session: &str,
    store: Option<&Path>,
    strict: bool,
    timeout_secs: u64,
    model: Option<&str>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let project = std::fs::canonicalize(project)?;
    let config = if strict {
        SandboxConfig::strict(vec!["src".into(), "pages".into(), "components".into()])
    } else {
        SandboxConfig::default()
    };
    let sandbox = Arc::new(PathSandbox::new(&project, config));
    let sessions = Arc::new(SessionStore::new(
        SessionCache::default(),
        Arc::new(JsonFileStore::new(store_dir(&project, store))),
    ));
    let oracle = Arc::new(build_oracle(dry_run, model)?);

    let orchestrator = ModificationOrchestrator::new(
        oracle,
        sandbox,
        sessions,
        OrchestratorConfig {
            timeout: Duration::from_secs(timeout_secs),
        },
    );

    println!("Project: {}", project.display());
    if dry_run {
        println!("(dry run mode -- no oracle calls)");
    }

    let result = orchestrator.run(session, request).await;

    println!("Strategy: {:?}", result.strategy_used);
    println!("Reasoning: {}", result.reasoning);
    for change in &result.change_log {
        let mark = if change.success { "ok" } else { "FAILED" };
        print!("  [{mark}] {:?} {} -- {}", change.kind, change.file, change.description);
        if let Some(detail) = &change.detail {
            print!(" ({detail})");
        }
        println!();
    }
    println!(
        "{}: {} file(s) changed",
        if result.success { "Success" } else { "Failed" },
        result.files_changed.len()
    );

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_scan(project: &Path) -> anyhow::Result<()> {
    let project = std::fs::canonicalize(project)?;
    let sandbox = PathSandbox::new(&project, SandboxConfig::default());
    let map = scan_project(&sandbox).await?;

    let mut paths: Vec<&String> = map.keys().collect();
    paths.sort();
    println!("Project: {} ({} files)", project.display(), map.len());
    for path in paths {
        let file = &map[path];
        let mut flags = Vec::new();
        if file.is_main_file {
            flags.push("main");
        }
        if file.has_buttons {
            flags.push("buttons");
        }
        if file.has_signin {
            flags.push("signin");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(","))
        };
        println!("  {path} ({} lines){flags}", file.line_count);
    }

    match find_composition_root(&map) {
        Some(root) => println!("Composition root: {}", root.relative_path),
        None => println!("Composition root: none found"),
    }
    Ok(())
}

async fn cmd_changes(session: &str, project: &Path, store: Option<&Path>) -> anyhow::Result<()> {
    let project = std::fs::canonicalize(project)?;
    let sessions = SessionStore::new(
        SessionCache::default(),
        Arc::new(JsonFileStore::new(store_dir(&project, store))),
    );
    let changes = sessions.changes(session).await?;

    if changes.is_empty() {
        println!("No recorded changes for session '{session}'");
        return Ok(());
    }
    println!("Session '{session}': {} change(s)", changes.len());
    for change in &changes {
        let mark = if change.success { "ok" } else { "FAILED" };
        println!(
            "  {} [{mark}] {:?} {} -- {}",
            change.timestamp.format("%Y-%m-%d %H:%M:%S"),
            change.kind,
            change.file,
            change.description
        );
    }
    Ok(())
}
