//! Runs the configured healers in order and owns the per-run state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::cache::{CacheStats, FileCache};
use crate::config::Config;
use crate::edit::ProposedEdit;
use crate::git::{partition_by_tier, Git, TierPartition};
use crate::healer::{build_registry, AnyHealer, Healer, RunContext};
use crate::report::HealingReport;

/// Cooperative stop signal, cloned into whatever may request a stop.
///
/// Passes and the applier check it before starting new work; a write already in
/// progress always finishes.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether a stop had already been requested.
    pub fn request(&self) -> bool {
        self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a run produced.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<HealingReport>,
    pub interrupted: bool,
    /// Files committed or staged after a heal run
    pub vcs: Option<TierPartition>,
    /// Problems outside any single healer (version control)
    pub errors: Vec<String>,
}

impl RunSummary {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || self.reports.iter().any(HealingReport::has_errors)
    }

    pub fn issues_found(&self) -> usize {
        self.reports.iter().map(|r| r.issues_found).sum()
    }

    pub fn issues_fixed(&self) -> usize {
        self.reports.iter().map(|r| r.issues_fixed).sum()
    }
}

pub struct Orchestrator {
    config: Config,
    cache: FileCache,
    shutdown: ShutdownFlag,
    healers: Vec<AnyHealer>,
}

impl Orchestrator {
    /// `config` must already be validated.
    pub fn new(config: Config) -> Self {
        let cache = FileCache::new(config.cache.max_entries, config.cache.ttl());
        let healers = build_registry(&config);
        Self {
            config,
            cache,
            shutdown: ShutdownFlag::new(),
            healers,
        }
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownFlag) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn healer_names(&self) -> Vec<&'static str> {
        self.healers.iter().map(Healer::name).collect()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn context(&self) -> RunContext<'_> {
        RunContext {
            config: &self.config,
            cache: &self.cache,
            shutdown: &self.shutdown,
        }
    }

    /// Run every healer in check mode. Nothing is written.
    pub fn check(&self) -> RunSummary {
        let ctx = self.context();
        let mut summary = RunSummary::default();

        if self.config.orchestrator.parallel {
            info!(healers = self.healers.len(), "running checks in parallel");
            let reports: Vec<Option<HealingReport>> = self
                .healers
                .par_iter()
                .map(|healer| {
                    if self.shutdown.is_requested() {
                        None
                    } else {
                        Some(healer.check(&ctx))
                    }
                })
                .collect();
            summary.interrupted = reports.iter().any(Option::is_none);
            summary.reports = reports.into_iter().flatten().collect();
        } else {
            self.run_sequential(&mut summary, |healer| healer.check(&ctx));
        }

        summary
    }

    /// Run every healer in heal mode, one at a time, then hand the written files
    /// to git when enabled.
    pub fn heal(&self, min_confidence: f64) -> RunSummary {
        let ctx = self.context();
        let mut summary = RunSummary::default();

        self.run_sequential(&mut summary, |healer| healer.heal(&ctx, min_confidence));

        if self.config.git.enabled {
            let applied: Vec<ProposedEdit> = summary
                .reports
                .iter()
                .flat_map(|r| r.changes.iter().cloned())
                .collect();
            if !applied.is_empty() {
                self.record_in_git(&applied, &mut summary);
            }
        }

        summary
    }

    fn run_sequential<F>(&self, summary: &mut RunSummary, mut run: F)
    where
        F: FnMut(&AnyHealer) -> HealingReport,
    {
        for healer in &self.healers {
            if self.shutdown.is_requested() {
                info!(next = healer.name(), "shutdown requested, not starting further passes");
                summary.interrupted = true;
                break;
            }

            info!(healer = healer.name(), "starting pass");
            let report = run(healer);
            let failed = report.has_errors();
            if self.shutdown.is_requested() {
                summary.interrupted = true;
            }
            summary.reports.push(report);

            if failed && !self.config.orchestrator.continue_on_error {
                warn!(healer = healer.name(), "pass reported errors, stopping");
                break;
            }
        }
    }

    fn record_in_git(&self, applied: &[ProposedEdit], summary: &mut RunSummary) {
        let git = Git::new(&self.config.project.root);
        if !git.is_repo() {
            summary.errors.push(format!(
                "git integration enabled but {} is not a git repository",
                self.config.project.root.display()
            ));
            return;
        }

        let parts = partition_by_tier(applied, &self.config.confidence.thresholds());
        if let Err(e) = git.commit(&self.config.git.commit_message, &parts.commit) {
            summary.errors.push(format!("Failed to commit healed files: {e}"));
        }
        if let Err(e) = git.stage(&parts.stage) {
            summary.errors.push(format!("Failed to stage healed files: {e}"));
        }
        info!(
            committed = parts.commit.len(),
            staged = parts.stage.len(),
            "recorded healed files in git"
        );
        summary.vcs = Some(parts);
    }
}
