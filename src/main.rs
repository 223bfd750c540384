use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::warn;

use docheal::config::{CliOverrides, Config, KNOWN_HEALERS};
use docheal::git::Git;
use docheal::logging::{init_tracing, Verbosity};
use docheal::orchestrator::{Orchestrator, RunSummary, ShutdownFlag};
use docheal::report::{save_report, to_console, to_json, Mode};

#[derive(Parser)]
#[command(name = "docheal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (TOML or YAML); defaults to ./docheal.toml when present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show every proposed change and debug logs
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Find issues and propose edits without touching files
    Check {
        /// Run only this healer
        #[arg(long)]
        only: Option<String>,

        /// Leave out these healers
        #[arg(long, num_args = 1..)]
        skip: Vec<String>,

        /// Run the read-only passes concurrently
        #[arg(long)]
        parallel: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Save a report under the configured output directory
        #[arg(long)]
        save: bool,
    },

    /// Apply edits whose confidence reaches the threshold
    Heal {
        /// Minimum confidence to apply (default: auto_commit_threshold)
        #[arg(short, long)]
        min_confidence: Option<f64>,

        /// Run only this healer
        #[arg(long)]
        only: Option<String>,

        /// Leave out these healers
        #[arg(long, num_args = 1..)]
        skip: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Save a report under the configured output directory
        #[arg(long)]
        save: bool,
    },

    /// Show healers in execution order
    List,

    /// Load and validate the configuration
    Validate,

    /// Restore files from git HEAD
    Revert {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show when each file last changed in git
    History {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

type CmdResult = Result<(), Box<dyn std::error::Error>>;

fn main() {
    let cli = Cli::parse();
    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose);
    init_tracing(verbosity);

    let shutdown = ShutdownFlag::new();
    install_signal_handler(&shutdown);

    let config_path = cli.config.as_deref();
    let result = match cli.command {
        Commands::Check { only, skip, parallel, json, save } => {
            let overrides = CliOverrides {
                min_confidence: None,
                parallel: parallel.then_some(true),
                only,
                skip,
            };
            cmd_run(config_path, &overrides, Mode::Check, json, save, verbosity, shutdown)
        }
        Commands::Heal { min_confidence, only, skip, json, save } => {
            let overrides = CliOverrides {
                min_confidence,
                parallel: None,
                only,
                skip,
            };
            cmd_run(config_path, &overrides, Mode::Heal, json, save, verbosity, shutdown)
        }
        Commands::List => cmd_list(config_path),
        Commands::Validate => cmd_validate(config_path, cli.quiet),
        Commands::Revert { files } => cmd_revert(config_path, &files, cli.quiet),
        Commands::History { files } => cmd_history(config_path, &files),
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

/// First SIGINT/SIGTERM lets the current write finish; a second one exits at once.
fn install_signal_handler(shutdown: &ShutdownFlag) {
    let flag = shutdown.clone();
    let installed = ctrlc::set_handler(move || {
        if flag.request() {
            eprintln!("{}", "interrupted again, exiting".red());
            std::process::exit(130);
        }
        eprintln!("{}", "stopping after the current step (interrupt again to exit now)".yellow());
    });
    if let Err(e) = installed {
        warn!(error = %e, "could not install signal handler");
    }
}

fn load_config(path: Option<&Path>, overrides: &CliOverrides) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = Config::discover(path)?;
    config.apply_overrides(overrides)?;
    Ok(config)
}

fn cmd_run(
    config_path: Option<&Path>,
    overrides: &CliOverrides,
    mode: Mode,
    json: bool,
    save: bool,
    verbosity: Verbosity,
    shutdown: ShutdownFlag,
) -> CmdResult {
    let config = load_config(config_path, overrides)?;
    let thresholds = config.confidence.thresholds();
    let min_confidence = config.confidence.effective_min_confidence();
    let reporting = config.reporting.clone();

    let orchestrator = Orchestrator::new(config).with_shutdown(shutdown);
    if orchestrator.healer_names().is_empty() {
        return Err("no healers enabled".into());
    }

    let summary = match mode {
        Mode::Check => orchestrator.check(),
        Mode::Heal => orchestrator.heal(min_confidence),
    };

    if json {
        println!("{}", to_json(&summary.reports, &thresholds)?);
    } else if verbosity != Verbosity::Quiet {
        print!("{}", to_console(&summary.reports, &thresholds, verbosity == Verbosity::Verbose));
        print_totals(&summary, mode);

        if verbosity == Verbosity::Verbose {
            let stats = orchestrator.cache_stats();
            println!(
                "  Cache: {} hits, {} misses ({:.0}% hit rate)",
                stats.hits,
                stats.misses,
                stats.hit_rate() * 100.0
            );
        }
    }

    for error in &summary.errors {
        eprintln!("{}: {}", "error".red().bold(), error);
    }

    if save {
        let path = save_report(
            &summary.reports,
            &thresholds,
            &reporting.output_dir,
            reporting.format,
            mode,
        )?;
        if !json && verbosity != Verbosity::Quiet {
            println!("Report saved to {}", path.display().to_string().cyan());
        }
    }

    if summary.has_errors() {
        return Err("one or more healers reported errors".into());
    }
    Ok(())
}

fn print_totals(summary: &RunSummary, mode: Mode) {
    let found = summary.issues_found();
    let fixed = summary.issues_fixed();

    match mode {
        Mode::Check if found == 0 => {
            println!("{}", "No issues found".green().bold());
        }
        Mode::Check => {
            println!(
                "{} {} issues; run {} to apply the confident fixes",
                "Found".yellow().bold(),
                found,
                "docheal heal".cyan()
            );
        }
        Mode::Heal => {
            println!(
                "{} {} of {} issues",
                "Fixed".green().bold(),
                fixed,
                found
            );
        }
    }

    if let Some(vcs) = &summary.vcs {
        println!(
            "  Git: {} committed, {} staged, {} left for review",
            vcs.commit.len(),
            vcs.stage.len(),
            vcs.report_only.len()
        );
    }
    if summary.interrupted {
        println!("{}", "Interrupted before all work finished".yellow());
    }
}

fn cmd_list(config_path: Option<&Path>) -> CmdResult {
    let config = Config::discover(config_path)?;

    println!("{}", "Healers".green().bold());
    println!();
    for (position, name) in config.orchestrator.healer_order.iter().enumerate() {
        let state = if config.is_enabled(name) {
            "enabled".green()
        } else {
            "disabled".dimmed()
        };
        println!("  {:>2}. {:<22} {}", position + 1, name.cyan(), state);
    }

    let unscheduled: Vec<_> = KNOWN_HEALERS
        .iter()
        .filter(|name| !config.orchestrator.healer_order.iter().any(|n| n == *name))
        .collect();
    for name in unscheduled {
        println!("      {:<22} {}", name.dimmed(), "not in healer_order".dimmed());
    }

    Ok(())
}

fn cmd_validate(config_path: Option<&Path>, quiet: bool) -> CmdResult {
    let config = Config::discover(config_path)?;
    let warnings = config.validate()?;

    for warning in &warnings {
        eprintln!("{}: {}", "warning".yellow().bold(), warning);
    }
    if !quiet {
        println!("{}", "Configuration is valid".green().bold());
        println!("  Project root:  {}", config.project.root.display().to_string().cyan());
        println!("  Docs:          {}", config.doc_path().display().to_string().cyan());
        println!(
            "  Thresholds:    commit >= {:.2}, stage >= {:.2}, heal >= {:.2}",
            config.confidence.auto_commit_threshold,
            config.confidence.auto_stage_threshold,
            config.confidence.effective_min_confidence()
        );
    }
    Ok(())
}

/// Paths given on the command line are relative to the working directory, not the project root.
fn absolute(file: &Path) -> std::io::Result<PathBuf> {
    if file.is_absolute() {
        Ok(file.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(file))
    }
}

fn cmd_revert(config_path: Option<&Path>, files: &[PathBuf], quiet: bool) -> CmdResult {
    let config = Config::discover(config_path)?;
    let git = Git::new(&config.project.root);

    let mut failed = 0;
    for file in files {
        match absolute(file).map_err(Into::into).and_then(|f| git.revert_file(&f)) {
            Ok(()) => {
                if !quiet {
                    println!("{} {}", "Reverted".green(), file.display());
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("{}: {}: {}", "error".red().bold(), file.display(), e);
            }
        }
    }

    if failed > 0 {
        return Err(format!("{failed} of {} files could not be reverted", files.len()).into());
    }
    Ok(())
}

fn cmd_history(config_path: Option<&Path>, files: &[PathBuf]) -> CmdResult {
    let config = Config::discover(config_path)?;
    let git = Git::new(&config.project.root);

    for file in files {
        match git.last_change(&absolute(file)?)? {
            Some(when) => println!("  {:<40} {}", file.display().to_string().cyan(), when.to_rfc3339()),
            None => println!("  {:<40} {}", file.display().to_string().cyan(), "never committed".dimmed()),
        }
    }
    Ok(())
}
