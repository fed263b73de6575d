//! RSI command line
//!
//! ```bash
//! rsi [--root .] [--config rsi.toml] [-v] <command>
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use rsi_core::autofix::ConfidenceLevel;
use rsi_core::knowledge::{
    DocumentedBy, ErrorContext, ErrorReport, Fix, MatchContext, Severity,
};
use rsi_core::orchestrator::SuggestionOutcome;
use rsi_core::{CycleReport, RsiConfig, RsiEngine, DEFAULT_CONFIG_FILE};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// RSI - learns from past fixes and applies safe ones automatically
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace root (a git working tree)
    #[arg(long, value_name = "DIR", default_value = ".", global = true)]
    root: PathBuf,

    /// Configuration file (default: rsi.toml under the root)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Args)]
struct CycleArgs {
    /// Log what would be applied without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Gating threshold; LOW suggestions are skipped unless this is low (high, medium, low)
    #[arg(long, value_name = "LEVEL")]
    min_confidence: Option<ConfidenceLevel>,
}

#[derive(Subcommand)]
enum Commands {
    /// Learn from recent fixes, run the auto-fix cycle, and print metrics
    Run {
        #[command(flatten)]
        cycle: CycleArgs,

        /// Learning window in days (default from config)
        #[arg(long)]
        days: Option<i64>,
    },

    /// Run the auto-fix cycle only
    Fix {
        #[command(flatten)]
        cycle: CycleArgs,

        /// Restrict scanning to these files
        files: Vec<PathBuf>,
    },

    /// Synthesize patterns and rules from recent fixes
    Learn {
        /// Learning window in days (default from config)
        #[arg(long)]
        days: Option<i64>,
    },

    /// Show effectiveness metrics and knowledge base size
    Status {
        /// Output JSON for integrations
        #[arg(long)]
        json: bool,
    },

    /// Show the change ledger, newest first
    History {
        #[arg(long, default_value = "20")]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Roll back a change by ledger id, or `last` to revert the latest commit
    Rollback {
        #[arg(value_name = "ID|last")]
        target: String,
    },

    /// Record an observed error and the fix that resolved it
    Document {
        #[arg(long = "type", value_name = "TYPE")]
        error_type: String,

        #[arg(long)]
        category: String,

        /// Error message or bad-code signature
        #[arg(long)]
        pattern: String,

        #[arg(long)]
        solution: String,

        #[arg(long, default_value = "")]
        prevention: String,

        /// Replacement code for the bad pattern
        #[arg(long)]
        code_changes: Option<String>,

        #[arg(long)]
        file: Option<String>,

        #[arg(long, default_value = "medium")]
        severity: Severity,
    },

    /// Keyword search over the knowledge base
    Search { query: String },

    /// Suggest fixes for an error from similar past errors
    Suggest {
        message: String,

        #[arg(long = "type", value_name = "TYPE")]
        error_type: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        file: Option<String>,
    },

    /// Rebuild the keyword index
    Index,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<RsiConfig> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.root.join(DEFAULT_CONFIG_FILE));
    let config = RsiConfig::load(&path)?.with_env_overrides()?;
    Ok(config)
}

fn apply_cycle_args(config: RsiConfig, args: &CycleArgs) -> RsiConfig {
    let dry_run = args.dry_run || config.pipeline.dry_run;
    let config = config.with_dry_run(dry_run);
    match args.min_confidence {
        Some(level) => config.with_min_confidence(level),
        None => config,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    tracing::debug!("RSI v{} at {}", rsi_core::VERSION, cli.root.display());

    match &cli.command {
        Commands::Run { cycle, days } => {
            let config = apply_cycle_args(config, cycle);
            let days = days.unwrap_or(config.learning.window_days);
            let dry_run = config.pipeline.dry_run;
            let engine = RsiEngine::new(&cli.root, config);
            let _lock = if dry_run { None } else { Some(engine.lock()?) };

            if !dry_run {
                let learned = engine.learn(days).await?;
                print_learned(&learned);
            }
            let report = engine
                .orchestrator()
                .await?
                .run_cycle(None)
                .await
                .context("Auto-fix cycle failed")?;
            print_cycle(&report);

            let metrics = engine.tracker().calculate_metrics().await?;
            println!();
            println!("{}", "Metrics".bold());
            println!("  total changes   {}", metrics.total_changes);
            println!("  success rate    {:.1}%", metrics.success_rate * 100.0);
            println!("  rollback rate   {:.1}%", metrics.rollback_rate * 100.0);
            println!("  active days     {}", metrics.active_period_days);
            return Ok(exit_for(&report));
        }
        Commands::Fix { cycle, files } => {
            let config = apply_cycle_args(config, cycle);
            let dry_run = config.pipeline.dry_run;
            let engine = RsiEngine::new(&cli.root, config);
            let _lock = if dry_run { None } else { Some(engine.lock()?) };

            let files = (!files.is_empty()).then_some(files.as_slice());
            let report = engine
                .orchestrator()
                .await?
                .run_cycle(files)
                .await
                .context("Auto-fix cycle failed")?;
            print_cycle(&report);
            return Ok(exit_for(&report));
        }
        Commands::Learn { days } => {
            let days = days.unwrap_or(config.learning.window_days);
            let engine = RsiEngine::new(&cli.root, config);
            let _lock = engine.lock()?;
            let learned = engine.learn(days).await?;
            print_learned(&learned);
        }
        Commands::Status { json } => {
            let engine = RsiEngine::new(&cli.root, config);
            let metrics = engine.tracker().calculate_metrics().await?;
            let kb = engine.store().load().await;

            if *json {
                let status = serde_json::json!({
                    "metrics": metrics,
                    "knowledgeBase": {
                        "errors": kb.errors.len(),
                        "fixes": kb.fix_count(),
                        "patterns": kb.patterns.len(),
                        "rules": kb.rules.len(),
                    },
                });
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{}", "RSI status".bold());
                println!(
                    "  knowledge base  {} errors, {} fixes, {} patterns, {} rules",
                    kb.errors.len(),
                    kb.fix_count(),
                    kb.patterns.len(),
                    kb.rules.len()
                );
                println!("  total changes   {}", metrics.total_changes);
                println!("  success rate    {:.1}%", metrics.success_rate * 100.0);
                println!("  rollback rate   {:.1}%", metrics.rollback_rate * 100.0);
                println!("  active days     {}", metrics.active_period_days);
            }
        }
        Commands::History { limit, json } => {
            let engine = RsiEngine::new(&cli.root, config);
            let history = engine.ledger().get_history().await?;
            let recent: Vec<_> = history.iter().rev().take(*limit).collect();

            if *json {
                println!("{}", serde_json::to_string_pretty(&recent)?);
            } else if recent.is_empty() {
                println!("No changes recorded yet.");
            } else {
                for record in recent {
                    let status = match record.status {
                        rsi_core::ChangeStatus::Applied => record.status.to_string().green(),
                        rsi_core::ChangeStatus::Failed => record.status.to_string().red(),
                        rsi_core::ChangeStatus::RolledBack => record.status.to_string().yellow(),
                    };
                    println!(
                        "{}  {}  {:<11}  {:<12}  {}",
                        record.id.dimmed(),
                        record.timestamp.format("%Y-%m-%d %H:%M"),
                        status,
                        record.change_type.to_string(),
                        record.description
                    );
                }
            }
        }
        Commands::Rollback { target } => {
            let engine = RsiEngine::new(&cli.root, config);
            let _lock = engine.lock()?;
            let manager = engine.rollback_manager();
            let outcome = if target == "last" {
                manager.rollback_last_commit().await?
            } else {
                manager.rollback_change(target).await?
            };

            match (&outcome.change_id, &outcome.commit) {
                (Some(id), Some(commit)) => {
                    println!("{} {} (inverse commit {})", "Rolled back".green(), id, commit)
                }
                (Some(id), None) => println!("{} {}", "Rolled back".green(), id),
                (None, Some(commit)) => println!(
                    "{} HEAD with {} (no matching ledger record)",
                    "Reverted".yellow(),
                    commit
                ),
                (None, None) => println!("Nothing to roll back."),
            }
        }
        Commands::Document {
            error_type,
            category,
            pattern,
            solution,
            prevention,
            code_changes,
            file,
            severity,
        } => {
            let engine = RsiEngine::new(&cli.root, config);
            let _lock = engine.lock()?;

            let context = file.clone().map(ErrorContext::for_file).unwrap_or_default();
            let report = ErrorReport::new(error_type.clone(), category.clone(), pattern.clone())
                .with_severity(*severity)
                .with_context(context);
            let mut fix = Fix::new(solution.clone(), prevention.clone(), DocumentedBy::User);
            if let Some(code) = code_changes {
                fix = fix.with_code_changes(code.clone());
            }

            let outcome = engine.documenter().document(report, fix).await?;
            println!(
                "{} fix {} for error {}{}",
                "Documented".green(),
                outcome.fix_id,
                outcome.error_id,
                if outcome.existing_error { " (existing)" } else { "" }
            );
            if !outcome.linked.is_empty() {
                println!("  linked to {}", outcome.linked.join(", "));
            }
        }
        Commands::Search { query } => {
            let engine = RsiEngine::new(&cli.root, config);
            let hits = engine.index().search(query).await?;
            if hits.is_empty() {
                println!("No matches for '{}'.", query);
            }
            for hit in hits {
                println!(
                    "{:>3}  {:<8} {}  [{}]",
                    hit.score,
                    format!("{:?}", hit.entry_type).to_lowercase(),
                    hit.id,
                    hit.categories.join(", ")
                );
            }
        }
        Commands::Suggest {
            message,
            error_type,
            category,
            file,
        } => {
            let engine = RsiEngine::new(&cli.root, config);
            let context = MatchContext {
                error_type: error_type.clone(),
                category: category.clone(),
                severity: None,
                file: file.clone(),
            };
            let suggestions = engine.matcher().get_fix_suggestions(message, &context).await;
            if suggestions.is_empty() {
                println!("No similar errors with recorded fixes.");
            }
            for suggestion in suggestions {
                println!(
                    "{}  {}  ({:.2}, {})",
                    "→".cyan(),
                    suggestion.fix.solution.bold(),
                    suggestion.score,
                    suggestion.reason
                );
                if !suggestion.fix.prevention.is_empty() {
                    println!("   prevention: {}", suggestion.fix.prevention);
                }
            }
        }
        Commands::Index => {
            let engine = RsiEngine::new(&cli.root, config);
            let entries = engine.index().rebuild().await?;
            println!("Indexed {} entries.", entries.len());
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_learned(learned: &rsi_core::LearnReport) {
    if learned.synthesis.is_empty() {
        println!("No new patterns learned.");
        return;
    }
    for pattern in &learned.synthesis.patterns {
        println!("{} pattern {} ({})", "Learned".green(), pattern.id, pattern.name);
    }
    for rule in &learned.synthesis.rules {
        let state = if learned.activated.contains(&rule.id) {
            "activated".green()
        } else {
            "not activated".yellow()
        };
        println!("  rule {} [{}]", rule.id, state);
    }
    if let Some(commit) = &learned.commit {
        println!("  lint config committed as {}", commit.dimmed());
    }
}

fn print_cycle(report: &CycleReport) {
    if report.suggestions.is_empty() {
        println!("No fixes proposed.");
        return;
    }
    for s in &report.suggestions {
        let outcome = match &s.outcome {
            SuggestionOutcome::Committed { .. } => s.outcome.to_string().green(),
            SuggestionOutcome::RevertedOnFailure { .. } => s.outcome.to_string().red(),
            SuggestionOutcome::Skipped => s.outcome.to_string().dimmed(),
            SuggestionOutcome::DryRunLogged => s.outcome.to_string().cyan(),
        };
        println!(
            "[{:<6} {:.2}] {}  {}",
            s.confidence.level.to_string(),
            s.confidence.score,
            s.description,
            outcome
        );
    }
    println!(
        "{} committed, {} reverted, {} skipped{}",
        report.committed(),
        report.reverted(),
        report.skipped(),
        if report.dry_run {
            format!(", {} dry-run", report.dry_run_logged())
        } else {
            String::new()
        }
    );
}

/// Non-zero only when fixes were attempted and none succeeded
fn exit_for(report: &CycleReport) -> ExitCode {
    if report.is_failure() {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}
