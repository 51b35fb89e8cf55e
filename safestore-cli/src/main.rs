/*!
SafeStore CLI - guarded snapshot writes from the command line.

Producers that are not written in Rust pipe their payload through
`safestore save`; operators use `show` and `backups` to inspect what is on disk.
*/

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use chrono::{Local, NaiveDateTime};
use clap::{Parser, Subcommand};
use safestore_core::observability::{init_observability, ObservabilityConfig};
use safestore_core::{
    receipt::content_hash, DataKind, Payload, RetentionPolicy, SafeStore, SaveOptions,
    SaveOutcome, StorageAdapter, StoreConfig,
};
use serde_json::Value;
use tabled::{Table, Tabled};
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(name = "safestore")]
#[command(about = "Validate and safely write JSON snapshots")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Store configuration file (JSON)
    #[arg(short, long, global = true, env = "SAFESTORE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a payload and replace the snapshot if it passes
    Save {
        /// Data kind of the payload
        #[arg(short, long, conflicts_with = "artifact", required_unless_present = "artifact")]
        kind: Option<DataKind>,
        /// Named artifact from the configuration
        #[arg(short, long)]
        artifact: Option<String>,
        /// Payload file, or `-` for stdin
        #[arg(short, long, default_value = "-")]
        input: String,
        /// Snapshot path to write
        #[arg(short, long, required_unless_present = "artifact", conflicts_with = "artifact")]
        output: Option<PathBuf>,
        /// Reject sequences shorter than this
        #[arg(long)]
        min_items: Option<usize>,
        /// Do not back up the previous snapshot
        #[arg(long)]
        no_backup: bool,
        /// Skip validation (backup and atomic write still apply)
        #[arg(long)]
        force: bool,
    },
    /// Run the checks without writing anything
    Validate {
        #[arg(short, long)]
        kind: DataKind,
        /// Payload file, or `-` for stdin
        #[arg(short, long, default_value = "-")]
        input: String,
        #[arg(long)]
        min_items: Option<usize>,
    },
    /// Show details of a snapshot
    Show {
        /// Snapshot path
        path: PathBuf,
    },
    /// Inspect and prune backups of a snapshot
    Backups {
        #[command(subcommand)]
        command: BackupCommands,
    },
}

#[derive(Subcommand, Debug)]
enum BackupCommands {
    /// List backups, newest first
    List { path: PathBuf },
    /// Delete backups outside the retention policy
    Prune {
        path: PathBuf,
        /// Keep at most this many backups
        #[arg(long)]
        keep: Option<usize>,
        /// Delete backups older than this many days
        #[arg(long)]
        max_age_days: Option<u32>,
    },
}

#[derive(Tabled)]
struct BackupInfo {
    #[tabled(rename = "Backup")]
    name: String,
    #[tabled(rename = "Taken")]
    taken_at: String,
    #[tabled(rename = "Size")]
    size: String,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let observability = ObservabilityConfig::default()
        .verbose(cli.verbose)
        .json(cli.json_logs);
    init_observability(&observability)?;

    let uses_artifact = matches!(
        cli.command,
        Commands::Save {
            artifact: Some(_),
            ..
        }
    );
    let config = load_config(cli.config.as_deref(), uses_artifact)?;
    let store = SafeStore::from_config(config)?;

    let ok = run(&store, cli.command)?;
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn load_config(path: Option<&Path>, uses_artifact: bool) -> anyhow::Result<StoreConfig> {
    match path {
        Some(path) => StoreConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None if uses_artifact => Ok(StoreConfig::pipeline_defaults()),
        None => Ok(StoreConfig::default()),
    }
}

fn run<S: StorageAdapter>(store: &SafeStore<S>, command: Commands) -> anyhow::Result<bool> {
    match command {
        Commands::Save {
            kind,
            artifact,
            input,
            output,
            min_items,
            no_backup,
            force,
        } => {
            let value = read_input(&input)?;
            let outcome = match (artifact, kind, output) {
                (Some(name), _, _) => SaveOutcome::from(store.save_artifact(&name, value)),
                (None, Some(kind), Some(output)) => {
                    let options = save_options(min_items, !no_backup, force);
                    store.save_outcome(&output, value, kind, options)
                }
                _ => anyhow::bail!("either --artifact or both --kind and --output are required"),
            };
            println!("{}", outcome.message);
            Ok(outcome.ok)
        }
        Commands::Validate {
            kind,
            input,
            min_items,
        } => {
            let value = read_input(&input)?;
            let options = save_options(min_items, false, false);
            match store.validate_only(kind, value, &options) {
                Ok(payload) => {
                    println!(
                        "valid {kind} payload: {} items ({})",
                        payload.item_count(),
                        payload.shape_name()
                    );
                    Ok(true)
                }
                Err(e) => {
                    println!("invalid {kind} payload: {e}");
                    Ok(false)
                }
            }
        }
        Commands::Show { path } => show_snapshot(store, &path),
        Commands::Backups { command } => match command {
            BackupCommands::List { path } => list_backups(store, &path),
            BackupCommands::Prune {
                path,
                keep,
                max_age_days,
            } => prune_backups(store, &path, keep, max_age_days),
        },
    }
}

fn save_options(min_items: Option<usize>, backup: bool, force: bool) -> SaveOptions {
    let mut options = SaveOptions::new().with_backup(backup);
    if let Some(min) = min_items {
        options = options.with_min_items(min);
    }
    if force {
        options = options.forced();
    }
    options
}

/// Parse the payload from a file, or stdin for `-`
fn read_input(input: &str) -> anyhow::Result<Value> {
    let text = if input == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("reading payload from stdin")?;
        text
    } else {
        fs::read_to_string(input).with_context(|| format!("reading payload from {input}"))?
    };
    debug!(input, bytes = text.len(), "Payload read");
    serde_json::from_str(&text).with_context(|| format!("parsing payload from {input}"))
}

fn show_snapshot<S: StorageAdapter>(store: &SafeStore<S>, path: &Path) -> anyhow::Result<bool> {
    info!("Showing snapshot: {}", path.display());

    let Some(bytes) = store.storage().read(path)? else {
        println!("No snapshot found at: {}", path.display());
        return Ok(false);
    };

    let backups = store.backups().list(path)?;
    println!("Snapshot Details:");
    println!("  Path: {}", path.display());
    println!("  Size: {}", format_size(bytes.len() as u64));
    println!("  Content Hash: {}", content_hash(&bytes));

    let parsed = serde_json::from_slice::<Value>(&bytes)
        .map_err(anyhow::Error::from)
        .and_then(|value| Payload::from_value(value).map_err(anyhow::Error::from));
    let status = match parsed {
        Ok(payload) => {
            println!("  Shape: {}", payload.shape_name());
            println!("  Items: {}", payload.item_count());
            true
        }
        Err(e) => {
            error!("Snapshot is not a valid payload: {}", e);
            println!("  Shape: unreadable ({e})");
            false
        }
    };

    println!("  Backups: {}", backups.len());
    if let Some(latest) = backups.first() {
        println!("  Latest Backup: {}", format_timestamp(latest.taken_at));
    }
    Ok(status)
}

fn list_backups<S: StorageAdapter>(store: &SafeStore<S>, path: &Path) -> anyhow::Result<bool> {
    let entries = store.backups().list(path)?;
    if entries.is_empty() {
        println!("No backups found for {}", path.display());
        return Ok(true);
    }

    let mut rows = Vec::with_capacity(entries.len());
    for entry in entries {
        let size = match store.storage().read(&entry.path) {
            Ok(Some(bytes)) => format_size(bytes.len() as u64),
            _ => "Unknown".to_string(),
        };
        rows.push(BackupInfo {
            name: entry
                .path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
            taken_at: format_timestamp(entry.taken_at),
            size,
        });
    }

    println!("{}", Table::new(rows));
    Ok(true)
}

fn prune_backups<S: StorageAdapter>(
    store: &SafeStore<S>,
    path: &Path,
    keep: Option<usize>,
    max_age_days: Option<u32>,
) -> anyhow::Result<bool> {
    let policy = RetentionPolicy {
        max_count: keep,
        max_age_days,
    };
    if policy.is_unbounded() {
        println!("Nothing to prune: pass --keep or --max-age-days");
        return Ok(true);
    }

    let removed = store
        .backups()
        .prune(path, &policy, Local::now().naive_local())?;
    for path in &removed {
        info!("Removed backup {}", path.display());
    }
    println!("✓ Removed {} backup(s)", removed.len());
    Ok(true)
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_timestamp(at: NaiveDateTime) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}
