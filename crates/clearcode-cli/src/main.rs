//! # clearcode
//!
//! Host adapter and operator commands for the Clearcode activity engine.

mod bridge;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clearcode_core::{
    AssignmentDirectory, AssignmentSource, BindingStore, ClearcodeConfig, DEFAULT_CONFIG_FILE,
    GitRemoteResolver, IdentityResolver, JsonBindingStore, NO_ASSIGNMENTS_LABEL, RepoLocator,
};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Clearcode - live code-activity reporting for classroom assignments
#[derive(Parser, Debug)]
#[command(name = "clearcode", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to clearcode.yml in the workspace)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Workspace root (defaults to the current directory)
    #[arg(short, long, global = true, value_name = "DIR")]
    workspace: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Track edits sent as JSON lines on stdin and report them periodically
    Run,

    /// Print the resolved identity for the workspace
    Identity,

    /// Print the repository link for a file
    RepoLink {
        /// File inside (or outside) a git repository
        file: PathBuf,
    },

    /// List assignments and the file bound to each
    Assignments,

    /// Bind an assignment to a file name (omit FILE to clear)
    Bind {
        /// Assignment name, as listed by `clearcode assignments`
        assignment: String,

        /// File name or relative path
        file: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let workspace = match &cli.workspace {
        Some(dir) => cwd.join(dir),
        None => cwd.clone(),
    };
    let config = load_config(cli.config.as_deref(), &workspace)?;

    match cli.command {
        Commands::Run => bridge::run(&config, &workspace).await,
        Commands::Identity => identity_command(&config, &workspace).await,
        Commands::RepoLink { file } => repo_link_command(&config, &cwd.join(file)).await,
        Commands::Assignments => assignments_command(&config, &workspace).await,
        Commands::Bind { assignment, file } => {
            bind_command(&config, &workspace, &assignment, file.as_deref())
        }
    }
}

/// Logs go to stderr (or `log_file`); stdout is reserved for command output.
fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(path) = log_file {
        let file = File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

fn load_config(explicit: Option<&Path>, workspace: &Path) -> Result<ClearcodeConfig> {
    let path = explicit.map_or_else(|| workspace.join(DEFAULT_CONFIG_FILE), Path::to_path_buf);

    let mut config = if path.exists() {
        ClearcodeConfig::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?
    } else {
        if explicit.is_some() {
            warn!("Config file {} not found, using defaults", path.display());
        } else {
            debug!("No {} in workspace, using defaults", DEFAULT_CONFIG_FILE);
        }
        ClearcodeConfig::default()
    };

    config.apply_env_overrides();
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn identity_command(config: &ClearcodeConfig, workspace: &Path) -> Result<()> {
    let resolver = IdentityResolver::with_default_sources(config.command_timeout());
    println!("{}", resolver.resolve(workspace).await);
    Ok(())
}

async fn repo_link_command(config: &ClearcodeConfig, file: &Path) -> Result<()> {
    let locator = RepoLocator::new(Arc::new(GitRemoteResolver::new(config.command_timeout())));
    println!("{}", locator.resolve_link(file).await);
    Ok(())
}

async fn assignments_command(config: &ClearcodeConfig, workspace: &Path) -> Result<()> {
    let identity = IdentityResolver::with_default_sources(config.command_timeout())
        .resolve(workspace)
        .await;
    let directory =
        AssignmentDirectory::with_timeout(&config.server.base_url, config.request_timeout());
    let assignments = directory.fetch(&identity).await;

    if assignments.is_empty() {
        println!("{NO_ASSIGNMENTS_LABEL}");
        return Ok(());
    }

    let bindings = JsonBindingStore::new(config.bindings_path(workspace));
    for assignment in &assignments {
        println!("{} -> {}", assignment.name, bindings.get(&assignment.name));
    }
    Ok(())
}

fn bind_command(
    config: &ClearcodeConfig,
    workspace: &Path,
    assignment: &str,
    file: Option<&str>,
) -> Result<()> {
    let bindings = JsonBindingStore::new(config.bindings_path(workspace));
    let value = bindings
        .set(assignment, file.unwrap_or_default())
        .with_context(|| format!("Failed to save binding for '{assignment}'"))?;
    println!("{assignment} file set to: {value}");
    Ok(())
}
