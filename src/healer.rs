//! The healers: one `check`/`heal` interface over a closed set of passes.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::apply::MutationApplier;
use crate::blocks::extract_links;
use crate::cache::FileCache;
use crate::config::{Config, DUPLICATES_HEALER, LINKS_HEALER, STALENESS_HEALER};
use crate::confidence::ChangeCategory;
use crate::duplicates::DuplicateDetector;
use crate::edit::ProposedEdit;
use crate::git::Git;
use crate::index::ReferenceIndex;
use crate::links::{find_broken, BrokenReference, FuzzyResolver, LINK_FIX_REASON};
use crate::orchestrator::ShutdownFlag;
use crate::report::{HealingReport, Mode};
use crate::staleness::StalenessDetector;
use crate::walk::{collect_files, WalkOptions};

/// Extensions scanned for links.
const LINK_SOURCE_EXTENSIONS: [&str; 1] = [".md"];

/// What every pass of a run shares.
pub struct RunContext<'a> {
    pub config: &'a Config,
    pub cache: &'a FileCache,
    pub shutdown: &'a ShutdownFlag,
}

pub trait Healer {
    fn name(&self) -> &'static str;

    /// Whether `heal` may modify files.
    fn writes_files(&self) -> bool;

    /// Find issues and propose edits. Never writes.
    fn check(&self, ctx: &RunContext<'_>) -> HealingReport;

    /// Largest file `heal` will rewrite.
    fn max_file_size(&self, config: &Config) -> u64;

    /// How many issues one applied edit resolves.
    fn issues_in(&self, _edit: &ProposedEdit) -> usize {
        1
    }

    /// Check, then apply every proposed edit at or above `min_confidence`.
    fn heal(&self, ctx: &RunContext<'_>, min_confidence: f64) -> HealingReport {
        let started = Instant::now();
        let mut report = self.check(ctx);
        report.mode = Mode::Heal;

        let (eligible, held): (Vec<ProposedEdit>, Vec<ProposedEdit>) = report
            .changes
            .drain(..)
            .partition(|e| e.is_applicable(min_confidence));
        if !held.is_empty() {
            info!(
                healer = self.name(),
                held = held.len(),
                min_confidence,
                "edits below threshold or needing review not applied"
            );
            report.warnings.extend(held.iter().map(|e| held_warning(e, min_confidence)));
        }

        if !eligible.is_empty() && self.writes_files() {
            let outcome = MutationApplier::new()
                .with_cache(ctx.cache)
                .with_shutdown(ctx.shutdown)
                .with_max_file_size(self.max_file_size(ctx.config))
                .apply(&eligible);

            report.issues_fixed = outcome.applied.iter().map(|a| self.issues_in(&a.edit)).sum();
            report.changes = outcome.applied.into_iter().map(|a| a.edit).collect();
            report
                .errors
                .extend(outcome.skipped.into_iter().map(|s| s.reason));
            report.errors.extend(outcome.errors);
            if outcome.interrupted {
                report
                    .warnings
                    .push("Interrupted by shutdown request; remaining files untouched".to_string());
            }
        }

        report.execution_time = started.elapsed();
        report
    }
}

fn held_warning(edit: &ProposedEdit, min_confidence: f64) -> String {
    let why = if edit.requires_review {
        "needs review".to_string()
    } else {
        format!("confidence {:.2} below {:.2}", edit.confidence, min_confidence)
    };
    format!(
        "{}:{}: not applied ({}): {}",
        edit.file.display(),
        edit.anchor_line,
        why,
        edit.reason
    )
}

fn walk_options(config: &Config, extensions: &[String]) -> WalkOptions {
    WalkOptions::new(&config.project.excluded_dirs, &config.project.exclude, extensions)
}

fn compile_link_pattern(config: &Config, report: &mut HealingReport) -> Option<Regex> {
    match Regex::new(&config.healers.fix_broken_links.link_pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            report.errors.push(format!("Invalid link pattern: {e}"));
            None
        }
    }
}

/// Replaces near-duplicate blocks with a link to the canonical copy.
#[derive(Debug, Default)]
pub struct DuplicatesHealer;

impl Healer for DuplicatesHealer {
    fn name(&self) -> &'static str {
        DUPLICATES_HEALER
    }

    fn writes_files(&self) -> bool {
        true
    }

    fn max_file_size(&self, config: &Config) -> u64 {
        config.healers.resolve_duplicates.max_file_size
    }

    fn check(&self, ctx: &RunContext<'_>) -> HealingReport {
        let started = Instant::now();
        let mut report = HealingReport::new(self.name(), Mode::Check);
        let config = &ctx.config.healers.resolve_duplicates;

        let Some(link_re) = compile_link_pattern(ctx.config, &mut report) else {
            report.execution_time = started.elapsed();
            return report;
        };

        let walked = collect_files(
            &ctx.config.doc_path(),
            &walk_options(ctx.config, &config.file_extensions),
        );
        debug!(files = walked.files.len(), "scanning for duplicates");

        let detector = DuplicateDetector::new(config, &ctx.config.project.root, &link_re);
        let scan = detector.find_duplicates(&walked.files, ctx.cache);

        report.issues_found = scan.duplications.len();
        report.changes = detector.to_edits(&scan);
        report.errors = scan.errors;
        report.warnings = walked.errors;
        report.warnings.extend(scan.warnings);
        report.execution_time = started.elapsed();
        report
    }
}

/// Repairs local links whose target no longer exists.
#[derive(Debug, Default)]
pub struct LinksHealer;

impl LinksHealer {
    /// Fold every resolved reference on one line into a single whole-line edit.
    fn line_edit(line: &str, refs: &[BrokenReference]) -> Option<ProposedEdit> {
        let mut merged = refs.first()?.to_edit(line)?;
        for extra in &refs[1..] {
            let Some(edit) = extra.to_edit(&merged.new_text) else {
                continue;
            };
            merged.new_text = edit.new_text;
            merged.confidence = merged.confidence.min(edit.confidence);
            merged.reason = format!("{}; {}", merged.reason, edit.reason);
        }
        Some(merged)
    }
}

impl Healer for LinksHealer {
    fn name(&self) -> &'static str {
        LINKS_HEALER
    }

    fn writes_files(&self) -> bool {
        true
    }

    fn max_file_size(&self, config: &Config) -> u64 {
        config.healers.fix_broken_links.max_file_size
    }

    /// A merged line edit fixes every link folded into it.
    fn issues_in(&self, edit: &ProposedEdit) -> usize {
        edit.reason.matches(LINK_FIX_REASON).count().max(1)
    }

    fn check(&self, ctx: &RunContext<'_>) -> HealingReport {
        let started = Instant::now();
        let mut report = HealingReport::new(self.name(), Mode::Check);
        let config = &ctx.config.healers.fix_broken_links;
        let root = ctx.config.project.root.as_path();

        let Some(link_re) = compile_link_pattern(ctx.config, &mut report) else {
            report.execution_time = started.elapsed();
            return report;
        };

        let sources: Vec<String> = LINK_SOURCE_EXTENSIONS.iter().map(|s| s.to_string()).collect();
        let walked = collect_files(&ctx.config.doc_path(), &walk_options(ctx.config, &sources));
        let (index, index_errors) =
            ReferenceIndex::build(root, &walk_options(ctx.config, &config.file_extensions));
        let files = walked.files;
        report.warnings.extend(walked.errors);
        report.warnings.extend(index_errors);
        let resolver = FuzzyResolver::new(&index, root, config, ctx.config.confidence.weights);
        debug!(sources = files.len(), indexed = index.len(), "checking links");

        let mut edits = Vec::new();
        for file in &files {
            let content = match ctx.cache.read(file, config.max_file_size) {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "skipping file");
                    report.errors.push(e.to_string());
                    continue;
                }
            };

            let scan = extract_links(file, &content, &link_re, config.max_links_per_file);
            report.warnings.extend(scan.warnings);

            let broken = find_broken(root, file, &scan.links);
            report.issues_found += broken.len();

            let mut by_line: BTreeMap<usize, Vec<BrokenReference>> = BTreeMap::new();
            for reference in broken {
                match resolver.resolve(&reference) {
                    Ok(Some(resolution)) => by_line
                        .entry(reference.source_line)
                        .or_default()
                        .push(reference.with_resolution(&resolution)),
                    Ok(None) => report.warnings.push(format!(
                        "{}:{}: no candidate above threshold for '{}'",
                        file.display(),
                        reference.source_line,
                        reference.original_target
                    )),
                    Err(e) => report.errors.push(format!(
                        "{}:{}: {}",
                        file.display(),
                        reference.source_line,
                        e
                    )),
                }
            }

            let lines: Vec<&str> = content.lines().collect();
            for (line_no, refs) in by_line {
                let Some(line) = lines.get(line_no.saturating_sub(1)) else {
                    continue;
                };
                if let Some(edit) = Self::line_edit(line, &refs) {
                    edits.push(edit);
                }
            }
        }

        report.changes = edits;
        report.execution_time = started.elapsed();
        report
    }
}

/// Moves stale "last updated" stamps to the file's last commit date and
/// rewrites deprecated commands in code samples.
#[derive(Debug, Default)]
pub struct StalenessHealer;

impl Healer for StalenessHealer {
    fn name(&self) -> &'static str {
        STALENESS_HEALER
    }

    fn writes_files(&self) -> bool {
        true
    }

    fn max_file_size(&self, config: &Config) -> u64 {
        config.healers.detect_staleness.max_file_size
    }

    fn issues_in(&self, edit: &ProposedEdit) -> usize {
        match edit.category {
            ChangeCategory::CodeChange => edit.reason.split("; ").count(),
            _ => 1,
        }
    }

    fn check(&self, ctx: &RunContext<'_>) -> HealingReport {
        let started = Instant::now();
        let mut report = HealingReport::new(self.name(), Mode::Check);
        let config = &ctx.config.healers.detect_staleness;
        let root = ctx.config.project.root.as_path();

        let detector = match StalenessDetector::new(config) {
            Ok(d) => d,
            Err(e) => {
                report.errors.push(e);
                report.execution_time = started.elapsed();
                return report;
            }
        };

        let walked = collect_files(&ctx.config.doc_path(), &walk_options(ctx.config, &config.file_extensions));
        report.warnings.extend(walked.errors);

        let git = Git::new(root);
        let has_history = git.is_repo();
        if !has_history {
            report.warnings.push(format!(
                "{} is not a git repository; timestamps not compared",
                root.display()
            ));
        }

        let mut unstamped = 0;
        let mut edits = Vec::new();
        for file in &walked.files {
            let content = match ctx.cache.read(file, config.max_file_size) {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "skipping file");
                    report.errors.push(e.to_string());
                    continue;
                }
            };

            if has_history {
                match detector.find_timestamp(&content) {
                    None => unstamped += 1,
                    Some(stamp) => match git.last_change(file) {
                        Ok(Some(when)) => {
                            if let Some(edit) = detector.timestamp_edit(file, &content, &stamp, when.date_naive()) {
                                report.issues_found += 1;
                                edits.push(edit);
                            }
                        }
                        Ok(None) => {}
                        Err(e) => report.warnings.push(format!(
                            "{}: no git history ({})",
                            file.display(),
                            e
                        )),
                    },
                }
            }

            let hits = detector.find_deprecated(&content);
            report.issues_found += hits.len();
            edits.extend(detector.deprecated_edits(file, &content, &hits));
        }
        debug!(files = walked.files.len(), unstamped, "staleness scan done");

        report.changes = edits;
        report.execution_time = started.elapsed();
        report
    }
}

/// The closed set of healers.
#[derive(Debug)]
pub enum AnyHealer {
    Duplicates(DuplicatesHealer),
    Links(LinksHealer),
    Staleness(StalenessHealer),
}

impl AnyHealer {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            DUPLICATES_HEALER => Some(AnyHealer::Duplicates(DuplicatesHealer)),
            LINKS_HEALER => Some(AnyHealer::Links(LinksHealer)),
            STALENESS_HEALER => Some(AnyHealer::Staleness(StalenessHealer)),
            _ => None,
        }
    }

    fn inner(&self) -> &dyn Healer {
        match self {
            AnyHealer::Duplicates(h) => h,
            AnyHealer::Links(h) => h,
            AnyHealer::Staleness(h) => h,
        }
    }
}

impl Healer for AnyHealer {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn writes_files(&self) -> bool {
        self.inner().writes_files()
    }

    fn check(&self, ctx: &RunContext<'_>) -> HealingReport {
        self.inner().check(ctx)
    }

    fn max_file_size(&self, config: &Config) -> u64 {
        self.inner().max_file_size(config)
    }

    fn issues_in(&self, edit: &ProposedEdit) -> usize {
        self.inner().issues_in(edit)
    }

    fn heal(&self, ctx: &RunContext<'_>, min_confidence: f64) -> HealingReport {
        self.inner().heal(ctx, min_confidence)
    }
}

/// Enabled healers in `healer_order`.
pub fn build_registry(config: &Config) -> Vec<AnyHealer> {
    config
        .orchestrator
        .healer_order
        .iter()
        .filter(|name| config.is_enabled(name))
        .filter_map(|name| AnyHealer::from_name(name))
        .collect()
}

/// Files touched by a set of edits, in order.
pub fn touched_files(edits: &[ProposedEdit]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = edits.iter().map(|e| e.file.clone()).collect();
    files.sort();
    files.dedup();
    files
}
