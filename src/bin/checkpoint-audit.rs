//! # checkpoint-audit CLI
//!
//! Command-line front end for the checkpoint audit monitor.
//!
//! ## Usage
//! ```bash
//! # Write a default configuration file
//! checkpoint-audit init
//!
//! # Process new checkpoints once
//! checkpoint-audit run -u wasadmin -p secret
//!
//! # Preview what would be logged, as JSON
//! checkpoint-audit run --dry-run --json
//!
//! # Keep running on the configured interval until Ctrl-C
//! checkpoint-audit watch
//!
//! # Show the cursor and pending checkpoints
//! checkpoint-audit status
//!
//! # Diff two local files with the audit diff engine
//! checkpoint-audit diff old/security.xml new/security.xml
//! ```

use anyhow::{bail, Context, Result};
use checkpoint_audit::{
    audit_log, diff, format_checkpoint_time, scanner, AuditConfig, AuditError, Auditor, AuditorBuilder,
    ChangeKind, CursorStore, Credentials, DiffEntry, FileCursorStore, Scheduler,
    DEFAULT_CONFIG_FILE, INITIAL_CURSOR,
};
use clap::{Args, Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Audit configuration repository checkpoints into a readable change log
#[derive(Parser)]
#[command(name = "checkpoint-audit")]
#[command(version)]
#[command(about = "Turn configuration repository checkpoints into an audit log with line-level diffs")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Process new checkpoints once
    Run {
        #[command(flatten)]
        auth: AuthArgs,

        /// Compute entries without writing the log or the cursor
        #[arg(long)]
        dry_run: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Process new checkpoints periodically until interrupted
    Watch {
        #[command(flatten)]
        auth: AuthArgs,

        /// Override the configured interval (e.g. "15m")
        #[arg(long, value_parser = humantime::parse_duration)]
        interval: Option<Duration>,
    },

    /// Show the cursor and pending checkpoints
    Status,

    /// Diff two local text files
    Diff {
        /// File before the change
        before: PathBuf,

        /// File after the change
        after: PathBuf,
    },
}

/// Administrator credentials for the wsadmin extractor
#[derive(Args)]
struct AuthArgs {
    /// Administrator user name
    #[arg(short, long, env = "CHECKPOINT_AUDIT_USER")]
    username: Option<String>,

    /// Administrator password
    #[arg(short, long, env = "CHECKPOINT_AUDIT_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        if let Some(err) = e.downcast_ref::<AuditError>() {
            let hint = err.user_message();
            if hint != err.to_string() {
                eprintln!("{}", hint.yellow());
            }
        }
        std::process::exit(1);
    }
}

/// Log to stderr; `RUST_LOG` wins over `--verbose`
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main command runner
fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { force } => cmd_init(&cli.config, force),
        Commands::Run { auth, dry_run, json } => cmd_run(&cli.config, auth, dry_run, json),
        Commands::Watch { auth, interval } => cmd_watch(&cli.config, auth, interval),
        Commands::Status => cmd_status(&cli.config),
        Commands::Diff { before, after } => cmd_diff(&before, &after),
    }
}

/// Write the default configuration
fn cmd_init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists. Use --force to overwrite it.",
            config_path.display()
        );
    }

    let config = AuditConfig::write_default(config_path)
        .with_context(|| format!("writing {}", config_path.display()))?;

    println!("{} Wrote {}", "✓".green().bold(), config_path.display().to_string().cyan());
    println!("  Checkpoints: {}", config.checkpoint_dir.display().to_string().cyan());
    println!("  Audit log: {}", config.audit_log.display().to_string().cyan());
    println!("  Interval: {}", format_duration(config.interval).to_string().cyan());
    println!("\nNext steps:");
    println!("  - Adjust the paths and connection settings in {}", config_path.display());
    println!(
        "  - Run once: {}",
        "checkpoint-audit run -u <user> -p <password>".yellow()
    );

    Ok(())
}

/// Process pending checkpoints once
fn cmd_run(config_path: &Path, auth: AuthArgs, dry_run: bool, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let auditor = open_auditor(&config, auth, None)?;

    if dry_run {
        let cursor = auditor.cursor_store().load();
        let batch = auditor.collect(cursor)?;

        if json {
            println!("{}", serde_json::to_string_pretty(&batch.entries)?);
            return Ok(());
        }

        if batch.entries.is_empty() {
            println!("{}", "No configuration changes pending".green());
        } else {
            print!("{}", audit_log::render_block(&batch.entries, &chrono::Local::now()));
            println!(
                "\n{} {} entries would be logged, cursor would move {} → {}",
                "Dry run:".yellow().bold(),
                batch.entries.len(),
                cursor,
                batch.max_key
            );
        }
        print_failures(&batch.report.failed);
        return Ok(());
    }

    let start = Instant::now();
    let report = auditor.run_once()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.has_changes() {
        println!(
            "{} Logged {} changes to {}",
            "✓".green().bold(),
            report.entries_written.to_string().yellow(),
            auditor.audit_log().path().display().to_string().cyan()
        );
    } else {
        println!("{} No new configuration changes", "✓".green().bold());
    }
    println!(
        "  Checkpoints: {} found, {} new, {} processed",
        report.discovered, report.selected, report.processed
    );
    println!("  Cursor: {}", describe_cursor(report.cursor).cyan());
    println!("  Time: {}", format_duration(round_millis(start.elapsed())).to_string().cyan());
    print_failures(&report.failed);

    Ok(())
}

/// Run on the configured interval until Ctrl-C
fn cmd_watch(config_path: &Path, auth: AuthArgs, interval: Option<Duration>) -> Result<()> {
    let config = load_config(config_path)?;
    let interval = interval.unwrap_or(config.interval);
    if interval.is_zero() {
        bail!("interval must be greater than zero");
    }

    let token = CancellationToken::new();
    let auditor = Arc::new(open_auditor(&config, auth, Some(token.clone()))?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;

    let stats = runtime.block_on(async move {
        let shutdown = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
                shutdown.cancel();
            }
        });

        Scheduler::new(auditor, interval, token).run().await
    });

    println!(
        "{} Stopped after {} runs ({} failed), cursor {}",
        "✓".green().bold(),
        stats.runs,
        stats.failures,
        describe_cursor(stats.cursor).cyan()
    );
    Ok(())
}

/// Show monitor state
///
/// Reads the cursor and scans the checkpoint directory; does not contact the
/// server and needs no credentials.
fn cmd_status(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let store = FileCursorStore::open(&config.cursor_file)?;
    let cursor = store.load();

    println!("{}", "Checkpoint Audit Status:".blue().bold());
    println!();
    println!("{}", "Configuration:".bold());
    println!("  File: {}", config_path.display());
    println!("  Checkpoints: {}", config.checkpoint_dir.display());
    println!("  Audit log: {}", describe_log(&config.audit_log));
    println!("  Interval: {}", format_duration(config.interval));

    println!("\n{}", "Cursor:".bold());
    println!("  File: {}", store.path().display());
    println!("  Last processed: {}", describe_cursor(cursor).cyan());

    let scan = scanner::scan_checkpoints(&config.checkpoint_dir, &config.checkpoint_prefix);
    println!("\n{}", "Checkpoints:".bold());
    if let Some(error) = &scan.error {
        println!("  {} {}", "Cannot scan:".red().bold(), error.red());
        return Ok(());
    }

    let pending = scanner::select_pending(&scan.checkpoints, cursor);
    println!("  Found: {}", scan.checkpoints.len());
    if !scan.skipped.is_empty() {
        println!("  Ignored: {}", scan.skipped.join(", ").yellow());
    }
    if pending.is_empty() {
        println!("  Pending: {}", "none".green());
    } else {
        println!("  Pending: {}", pending.len().to_string().yellow());
        for checkpoint in pending.iter().take(10) {
            println!(
                "    {} {}",
                checkpoint.name.yellow(),
                format_checkpoint_time(checkpoint.key).dimmed()
            );
        }
        if pending.len() > 10 {
            println!("    ... and {} more", pending.len() - 10);
        }
    }

    Ok(())
}

/// Diff two local files the way the audit log would
fn cmd_diff(before_path: &Path, after_path: &Path) -> Result<()> {
    let read = |path: &Path| -> Result<String> {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        Ok(diff::decode_text(&path.display().to_string(), bytes)?)
    };
    let before = read(before_path)?;
    let after = read(after_path)?;

    let entries = diff::diff_text(&before, &after);
    let Some(kind) = ChangeKind::classify(&entries) else {
        println!("{}", "Files are identical".green());
        return Ok(());
    };

    println!(
        "{} {} → {} ({})",
        "Comparing".blue().bold(),
        before_path.display().to_string().yellow(),
        after_path.display().to_string().yellow(),
        kind
    );
    println!();

    for entry in &entries {
        let lines = entry.describe();
        for line in &lines {
            let styled = match entry {
                DiffEntry::Added { .. } => line.green(),
                DiffEntry::Deleted { .. } => line.red(),
                DiffEntry::Modified { .. } => line.yellow(),
            };
            println!("{}", styled);
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<AuditConfig> {
    AuditConfig::load(path).with_context(|| {
        format!(
            "loading {} (create one with `checkpoint-audit init`)",
            path.display()
        )
    })
}

fn open_auditor(
    config: &AuditConfig,
    auth: AuthArgs,
    cancel: Option<CancellationToken>,
) -> Result<Auditor> {
    let credentials = if config.extractor.needs_credentials() {
        match (auth.username, auth.password) {
            (Some(user), Some(password)) => Some(Credentials::new(user, password)),
            _ => bail!(
                "the wsadmin extractor needs --username and --password \
                 (or CHECKPOINT_AUDIT_USER / CHECKPOINT_AUDIT_PASSWORD)"
            ),
        }
    } else {
        None
    };

    let extractor = config.extractor.build(credentials, cancel.clone())?;
    let mut builder = AuditorBuilder::from_config(config)?.boxed_extractor(extractor);
    if let Some(token) = cancel {
        builder = builder.cancellation(token);
    }
    Ok(builder.build()?)
}

fn describe_cursor(cursor: u64) -> String {
    if cursor == INITIAL_CURSOR {
        "never".to_string()
    } else {
        format!("{} ({})", cursor, format_checkpoint_time(cursor))
    }
}

fn describe_log(path: &Path) -> String {
    match fs::metadata(path) {
        Ok(meta) => format!("{} ({} bytes)", path.display(), meta.len()),
        Err(_) => format!("{} (not created yet)", path.display()),
    }
}

fn print_failures(failed: &[String]) {
    if failed.is_empty() {
        return;
    }
    println!("\n{}", "Skipped checkpoints:".red().bold());
    for name in failed {
        println!("  ✗ {}", name.red());
    }
}

fn round_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis() as u64)
}
