//! SyncTool CLI - Command line interface for folder synchronization groups.
//!
//! This tool records snapshots of local folders into a group, runs
//! synchronization rounds and manages the resulting action queue.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use synctool_common::{FileReference, SyncPath};
use synctool_storage::{scan_directory, PathFilter};
use synctool_sync::{
    ActionApplier, Group, GroupConfig, SyncAction, SyncActionState, SyncActionVisitor,
    Synchronizer,
};

#[derive(Parser)]
#[command(name = "synctool")]
#[command(about = "SyncTool - Folder synchronization across histories")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Directory of the group (default: the user data directory).
    #[arg(short, long, global = true)]
    group: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new group.
    Init {
        /// Group name.
        #[arg(short, long)]
        name: String,

        /// Participating history (repeat for each).
        #[arg(long = "history", required = true)]
        histories: Vec<String>,

        /// Path excluded from synchronization (repeatable).
        #[arg(long = "exclude")]
        excluded: Vec<String>,
    },

    /// Record the current state of a folder as a snapshot.
    Snapshot {
        /// History to record into.
        #[arg(long)]
        history: String,

        /// Folder to scan.
        #[arg(short, long)]
        source: PathBuf,
    },

    /// Run a synchronization round.
    Sync,

    /// List sync actions.
    Actions {
        /// Only actions in this state (queued, active, completed, cancelled).
        #[arg(long)]
        state: Option<String>,

        /// Only actions for this path.
        #[arg(long)]
        path: Option<String>,
    },

    /// Apply the queued actions of a history.
    Apply {
        /// History to apply to.
        #[arg(long)]
        history: String,
    },

    /// Cancel a pending action.
    Cancel {
        /// Action id.
        #[arg(long)]
        id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let group_dir = match cli.group {
        Some(dir) => dir,
        None => default_group_dir()?,
    };

    match cli.command {
        Commands::Init {
            name,
            histories,
            excluded,
        } => cmd_init(&group_dir, &name, histories, &excluded).await,

        Commands::Snapshot { history, source } => cmd_snapshot(&group_dir, &history, &source).await,

        Commands::Sync => cmd_sync(&group_dir).await,

        Commands::Actions { state, path } => {
            cmd_actions(&group_dir, state.as_deref(), path.as_deref()).await
        }

        Commands::Apply { history } => cmd_apply(&group_dir, &history).await,

        Commands::Cancel { id } => cmd_cancel(&group_dir, id).await,
    }
}

fn default_group_dir() -> Result<PathBuf> {
    let data = dirs::data_dir().context("No user data directory on this platform")?;
    Ok(data.join("synctool"))
}

async fn open_group(dir: &Path) -> Result<Group> {
    Group::open_local(dir)
        .await
        .with_context(|| format!("Failed to open group at {}", dir.display()))
}

/// Create a new group.
async fn cmd_init(dir: &Path, name: &str, histories: Vec<String>, excluded: &[String]) -> Result<()> {
    info!("Creating group '{}' at {}", name, dir.display());

    let excluded = excluded
        .iter()
        .map(|p| SyncPath::parse(p).with_context(|| format!("Invalid excluded path: {}", p)))
        .collect::<Result<Vec<_>>>()?;
    let config = GroupConfig::new(name, histories, PathFilter::excluding(excluded))
        .context("Invalid group configuration")?;

    let group = Group::init_local(dir, config)
        .await
        .context("Failed to create group")?;

    println!("Group created successfully!");
    println!("  Name: {}", group.name());
    println!("  Location: {}", dir.display());
    println!("  Histories: {}", group.config().histories.join(", "));

    Ok(())
}

/// Scan a folder and record it as a snapshot.
async fn cmd_snapshot(dir: &Path, history: &str, source: &Path) -> Result<()> {
    let group = open_group(dir).await?;
    let history = group.history(history)?;

    let tree = scan_directory(source)
        .await
        .with_context(|| format!("Failed to scan {}", source.display()))?;
    let snapshot = history
        .create_snapshot(&tree)
        .await
        .context("Failed to create snapshot")?;

    println!(
        "Snapshot {} of '{}': {} files, {} bytes",
        snapshot.id,
        history.name(),
        tree.file_count(),
        tree.total_size()
    );
    Ok(())
}

/// Run a synchronization round.
async fn cmd_sync(dir: &Path) -> Result<()> {
    let group = open_group(dir).await?;
    let report = Synchronizer::synchronize(&group)
        .await
        .context("Synchronization failed")?;

    match report.sync_point_id {
        Some(id) => {
            println!("Sync point {}", id);
            println!("  Paths examined: {}", report.paths_examined);
            println!("  Actions added: {}", report.actions_added);
            println!("  Actions cancelled: {}", report.actions_cancelled);
            println!("  Conflicts: {}", report.conflicts);
            println!("  Duration: {:?}", report.duration);
        }
        None => println!("Nothing to synchronize."),
    }
    Ok(())
}

/// List sync actions.
async fn cmd_actions(dir: &Path, state: Option<&str>, path: Option<&str>) -> Result<()> {
    let group = open_group(dir).await?;
    let service = group.action_service();

    let state = state
        .map(|s| s.parse::<SyncActionState>())
        .transpose()
        .context("Invalid state")?;
    let path = path
        .map(SyncPath::parse)
        .transpose()
        .context("Invalid path")?;

    let actions = match (state, path) {
        (Some(state), Some(path)) => service.items_in_state_for_path(state, &path).await?,
        (Some(state), None) => service.items_in_state(state).await?,
        (None, Some(path)) => service.items_for_path(&path).await?,
        (None, None) => service.all_items().await?,
    };

    if actions.is_empty() {
        println!("No actions.");
        return Ok(());
    }

    for action in &actions {
        println!(
            "{}  {:<9}  {:<10}  #{}  {}",
            action.id(),
            action.state(),
            action.target(),
            action.sync_point_id(),
            action.accept(&mut Describe)
        );
    }
    println!("\nTotal: {} actions", actions.len());
    Ok(())
}

/// Apply the queued actions of a history.
async fn cmd_apply(dir: &Path, history: &str) -> Result<()> {
    let group = open_group(dir).await?;
    let report = ActionApplier::apply(&group, history)
        .await
        .with_context(|| format!("Failed to apply actions to '{}'", history))?;

    match report.snapshot {
        Some(snapshot) => println!(
            "Applied {} actions to '{}' (snapshot {})",
            report.completed, history, snapshot
        ),
        None => println!("No queued actions for '{}'.", history),
    }
    Ok(())
}

/// Cancel a pending action.
async fn cmd_cancel(dir: &Path, id: Uuid) -> Result<()> {
    let group = open_group(dir).await?;
    let _guard = group.open_exclusive()?;
    let service = group.action_service();

    let action = service
        .get(id)
        .await?
        .with_context(|| format!("Action {} not found", id))?;
    let cancelled = action
        .with_state(SyncActionState::Cancelled)
        .with_context(|| format!("Action {} is already {}", id, action.state()))?;
    service.update_items(&[cancelled]).await?;

    println!("Cancelled {}", id);
    Ok(())
}

/// One-line description of an action.
struct Describe;

impl SyncActionVisitor for Describe {
    type Output = String;

    fn visit_add(&mut self, _: &SyncAction, new_file: &FileReference) -> String {
        format!("add {}", new_file)
    }

    fn visit_remove(&mut self, _: &SyncAction, removed_file: &FileReference) -> String {
        format!("remove {}", removed_file)
    }

    fn visit_replace(
        &mut self,
        _: &SyncAction,
        old_version: &FileReference,
        new_version: &FileReference,
    ) -> String {
        format!("replace {} with {}", old_version, new_version)
    }

    fn visit_multiple_version_conflict(
        &mut self,
        action: &SyncAction,
        versions: &[FileReference],
    ) -> String {
        format!("CONFLICT {}: {} versions", action.path(), versions.len())
    }

    fn visit_modification_deletion_conflict(
        &mut self,
        action: &SyncAction,
        _: &FileReference,
        modified: &FileReference,
    ) -> String {
        format!("CONFLICT {}: deleted but modified to {}", action.path(), modified)
    }
}
