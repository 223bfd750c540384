//! Healing reports and their console, JSON and Markdown renderings.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::confidence::{ActionThresholds, ActionTier};
use crate::config::ReportFormat;
use crate::edit::ProposedEdit;
use crate::error::Result;
use crate::persist::write_atomic;

/// Changes listed per report in console output.
const CONSOLE_CHANGE_LIMIT: usize = 10;
/// Errors listed per report in console output.
const CONSOLE_ERROR_LIMIT: usize = 5;
/// Characters of old/new text shown in Markdown.
const MARKDOWN_SNIPPET_LIMIT: usize = 200;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Check,
    Heal,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Check => "check",
            Mode::Heal => "heal",
        }
    }
}

/// What one healer found or fixed in one run.
#[derive(Debug, Clone)]
pub struct HealingReport {
    pub healer_name: String,
    pub mode: Mode,
    pub timestamp: DateTime<Utc>,
    pub issues_found: usize,
    pub issues_fixed: usize,
    /// Proposed edits in check mode, applied edits in heal mode
    pub changes: Vec<ProposedEdit>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub execution_time: Duration,
}

impl HealingReport {
    pub fn new(healer_name: &str, mode: Mode) -> Self {
        Self {
            healer_name: healer_name.to_string(),
            mode,
            timestamp: Utc::now(),
            issues_found: 0,
            issues_fixed: 0,
            changes: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            execution_time: Duration::ZERO,
        }
    }

    /// Fixed over found; 1.0 when nothing was found.
    pub fn success_rate(&self) -> f64 {
        if self.issues_found == 0 {
            1.0
        } else {
            self.issues_fixed as f64 / self.issues_found as f64
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Number of changes per action tier.
    pub fn tier_counts(&self, thresholds: &ActionThresholds) -> BTreeMap<ActionTier, usize> {
        let mut counts = BTreeMap::new();
        for change in &self.changes {
            *counts.entry(thresholds.tier(change.confidence)).or_insert(0) += 1;
        }
        counts
    }

    fn status_line(&self) -> String {
        if self.issues_found == 0 {
            "All documentation is healthy".to_string()
        } else if self.issues_fixed == self.issues_found {
            "All issues fixed".to_string()
        } else if self.issues_fixed > 0 {
            format!("{} issues remaining", self.issues_found - self.issues_fixed)
        } else {
            format!("{} issues found, none fixed", self.issues_found)
        }
    }
}

/// JSON for one report.
pub fn report_json(report: &HealingReport, thresholds: &ActionThresholds) -> serde_json::Value {
    let changes: Vec<_> = report
        .changes
        .iter()
        .map(|c| {
            json!({
                "file": c.file.display().to_string(),
                "line": c.anchor_line,
                "confidence": c.confidence,
                "tier": thresholds.tier(c.confidence),
                "reason": c.reason,
                "category": c.category,
                "requires_review": c.requires_review,
                "old_content": c.old_text,
                "new_content": c.new_text,
                "healer": report.healer_name,
            })
        })
        .collect();

    json!({
        "healer_name": report.healer_name,
        "mode": report.mode,
        "timestamp": report.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        "execution_time": report.execution_time.as_secs_f64(),
        "summary": {
            "issues_found": report.issues_found,
            "issues_fixed": report.issues_fixed,
            "success_rate": report.success_rate(),
        },
        "changes": changes,
        "errors": report.errors,
        "warnings": report.warnings,
    })
}

pub fn to_json(reports: &[HealingReport], thresholds: &ActionThresholds) -> Result<String> {
    let values: Vec<_> = reports.iter().map(|r| report_json(r, thresholds)).collect();
    Ok(serde_json::to_string_pretty(&values)?)
}

fn snippet(text: &str) -> String {
    if text.chars().count() > MARKDOWN_SNIPPET_LIMIT {
        let cut: String = text.chars().take(MARKDOWN_SNIPPET_LIMIT).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

/// Markdown for a set of reports, one top-level section each.
pub fn to_markdown(reports: &[HealingReport], thresholds: &ActionThresholds) -> String {
    let mut out = String::new();

    for report in reports {
        let _ = writeln!(out, "# Healing Report: {}\n", report.healer_name);
        let _ = writeln!(out, "**Mode**: {}  ", report.mode.as_str());
        let _ = writeln!(
            out,
            "**Timestamp**: {}  ",
            report.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let _ = writeln!(
            out,
            "**Execution Time**: {:.2} seconds\n",
            report.execution_time.as_secs_f64()
        );

        out.push_str("## Summary\n\n");
        let _ = writeln!(out, "- **Issues found**: {}", report.issues_found);
        let _ = writeln!(out, "- **Issues fixed**: {}", report.issues_fixed);
        let _ = writeln!(out, "- **Success rate**: {:.1}%", report.success_rate() * 100.0);
        for (tier, count) in report.tier_counts(thresholds) {
            let _ = writeln!(out, "- **{}**: {}", tier, count);
        }
        let _ = writeln!(out, "\n**{}**\n", report.status_line());

        if !report.changes.is_empty() {
            out.push_str("## Changes\n");
            let mut by_file: BTreeMap<&Path, Vec<&ProposedEdit>> = BTreeMap::new();
            for change in &report.changes {
                by_file.entry(change.file.as_path()).or_default().push(change);
            }
            for (file, changes) in by_file {
                let _ = writeln!(out, "\n### {}", file.display());
                for change in changes {
                    let _ = writeln!(out, "\n#### Line {}\n", change.anchor_line);
                    let _ = writeln!(
                        out,
                        "- **Confidence**: {:.0}% ({})",
                        change.confidence * 100.0,
                        thresholds.tier(change.confidence)
                    );
                    let _ = writeln!(out, "- **Reason**: {}", change.reason);
                    if change.requires_review {
                        out.push_str("- **Requires review**\n");
                    }
                    let _ = writeln!(out, "\n**Old**:\n```\n{}\n```", snippet(&change.old_text));
                    let _ = writeln!(out, "\n**New**:\n```\n{}\n```", snippet(&change.new_text));
                }
            }
            out.push('\n');
        }

        if report.has_errors() {
            out.push_str("## Errors\n\n");
            for error in &report.errors {
                let _ = writeln!(out, "- {error}");
            }
            out.push('\n');
        }

        if !report.warnings.is_empty() {
            out.push_str("## Warnings\n\n");
            for warning in &report.warnings {
                let _ = writeln!(out, "- {warning}");
            }
            out.push('\n');
        }
    }

    out
}

/// Colored terminal summary.
pub fn to_console(reports: &[HealingReport], thresholds: &ActionThresholds, verbose: bool) -> String {
    let mut out = String::new();

    for report in reports {
        let _ = writeln!(
            out,
            "{} {} ({})",
            "Healer".cyan().bold(),
            report.healer_name.bold(),
            report.mode.as_str()
        );
        let _ = writeln!(out, "  Issues found:   {}", report.issues_found.to_string().cyan());
        let _ = writeln!(out, "  Issues fixed:   {}", report.issues_fixed.to_string().cyan());
        let _ = writeln!(out, "  Success rate:   {:.1}%", report.success_rate() * 100.0);
        let _ = writeln!(out, "  Time elapsed:   {:.2?}", report.execution_time);

        let counts = report.tier_counts(thresholds);
        if !counts.is_empty() {
            let tiers: Vec<String> = counts
                .iter()
                .map(|(tier, n)| match tier {
                    ActionTier::AutoCommit => format!("{} {}", n, tier).green().to_string(),
                    ActionTier::AutoStage => format!("{} {}", n, tier).yellow().to_string(),
                    ActionTier::ReportOnly => format!("{} {}", n, tier).dimmed().to_string(),
                })
                .collect();
            let _ = writeln!(out, "  Tiers:          {}", tiers.join(", "));
        }

        if verbose {
            for change in report.changes.iter().take(CONSOLE_CHANGE_LIMIT) {
                let pct = format!("{:.0}%", change.confidence * 100.0);
                let pct = match thresholds.tier(change.confidence) {
                    ActionTier::AutoCommit => pct.green(),
                    ActionTier::AutoStage => pct.yellow(),
                    ActionTier::ReportOnly => pct.red(),
                };
                let _ = writeln!(
                    out,
                    "  {} {}:{} {}",
                    pct,
                    change.file.display().to_string().cyan(),
                    change.anchor_line,
                    change.reason.dimmed()
                );
            }
            if report.changes.len() > CONSOLE_CHANGE_LIMIT {
                let _ = writeln!(
                    out,
                    "  {}",
                    format!("... and {} more", report.changes.len() - CONSOLE_CHANGE_LIMIT).dimmed()
                );
            }
        }

        for warning in report.warnings.iter().take(CONSOLE_ERROR_LIMIT) {
            let _ = writeln!(out, "  {}: {}", "warning".yellow().bold(), warning);
        }
        for error in report.errors.iter().take(CONSOLE_ERROR_LIMIT) {
            let _ = writeln!(out, "  {}: {}", "error".red().bold(), error);
        }
        let hidden = report.errors.len().saturating_sub(CONSOLE_ERROR_LIMIT)
            + report.warnings.len().saturating_sub(CONSOLE_ERROR_LIMIT);
        if hidden > 0 {
            let _ = writeln!(out, "  {}", format!("... and {hidden} more messages").dimmed());
        }

        let status = report.status_line();
        let status = if report.has_errors() {
            status.red()
        } else if report.issues_found == report.issues_fixed {
            status.green()
        } else {
            status.yellow()
        };
        let _ = writeln!(out, "  {}\n", status);
    }

    out
}

/// Write reports to `<output_dir>/docheal-<mode>-<timestamp>.<ext>` and return the path.
pub fn save_report(
    reports: &[HealingReport],
    thresholds: &ActionThresholds,
    output_dir: &Path,
    format: ReportFormat,
    mode: Mode,
) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;

    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let (ext, body) = match format {
        ReportFormat::Json => ("json", to_json(reports, thresholds)?),
        ReportFormat::Markdown => ("md", to_markdown(reports, thresholds)),
    };
    let path = output_dir.join(format!("docheal-{}-{}.{}", mode.as_str(), stamp, ext));
    write_atomic(&path, &body)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::ChangeCategory;
    use tempfile::TempDir;

    fn sample() -> HealingReport {
        let mut report = HealingReport::new("fix_broken_links", Mode::Check);
        report.issues_found = 3;
        report.changes = vec![
            ProposedEdit {
                file: PathBuf::from("docs/guide.md"),
                anchor_line: 4,
                old_text: "[a](gide.md)".to_string(),
                new_text: "[a](guide.md)".to_string(),
                confidence: 0.94,
                reason: "Fix broken link: gide.md -> guide.md".to_string(),
                category: ChangeCategory::BrokenLinkFix,
                requires_review: false,
            },
            ProposedEdit {
                file: PathBuf::from("docs/api.md"),
                anchor_line: 9,
                old_text: "[b](x.md)".to_string(),
                new_text: "[b](y.md)".to_string(),
                confidence: 0.6,
                reason: "Fix broken link: x.md -> y.md".to_string(),
                category: ChangeCategory::BrokenLinkFix,
                requires_review: false,
            },
        ];
        report.warnings.push("No candidate above threshold for missing.md".to_string());
        report
    }

    #[test]
    fn test_success_rate() {
        let mut report = HealingReport::new("x", Mode::Heal);
        assert_eq!(report.success_rate(), 1.0);
        report.issues_found = 4;
        report.issues_fixed = 1;
        assert_eq!(report.success_rate(), 0.25);
        assert!(!report.has_errors());
        report.errors.push("boom".to_string());
        assert!(report.has_errors());
    }

    #[test]
    fn test_json_shape() {
        let value = report_json(&sample(), &ActionThresholds::default());
        assert_eq!(value["healer_name"], "fix_broken_links");
        assert_eq!(value["mode"], "check");
        assert_eq!(value["summary"]["issues_found"], 3);
        assert_eq!(value["summary"]["success_rate"], 0.0);
        assert_eq!(value["changes"][0]["line"], 4);
        assert_eq!(value["changes"][0]["tier"], "auto_commit");
        assert_eq!(value["changes"][1]["tier"], "report_only");
        assert_eq!(value["warnings"].as_array().unwrap().len(), 1);
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_markdown_groups_by_file() {
        let md = to_markdown(&[sample()], &ActionThresholds::default());
        assert!(md.starts_with("# Healing Report: fix_broken_links"));
        let api = md.find("### docs/api.md").unwrap();
        let guide = md.find("### docs/guide.md").unwrap();
        assert!(api < guide);
        assert!(md.contains("- **auto_commit**: 1"));
        assert!(md.contains("## Warnings"));
        assert!(!md.contains("## Errors"));
    }

    #[test]
    fn test_snippet_truncates() {
        let long = "x".repeat(250);
        let cut = snippet(&long);
        assert_eq!(cut.len(), 203);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_save_report_writes_file() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("reports");
        let path = save_report(
            &[sample()],
            &ActionThresholds::default(),
            &out,
            ReportFormat::Json,
            Mode::Check,
        )
        .unwrap();

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("docheal-check-"));
        assert!(name.ends_with(".json"));
        let parsed: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_console_mentions_every_healer() {
        let mut heal = HealingReport::new("resolve_duplicates", Mode::Heal);
        heal.errors.push("Could not relocate edit".to_string());
        let text = to_console(&[sample(), heal], &ActionThresholds::default(), true);
        assert!(text.contains("fix_broken_links"));
        assert!(text.contains("resolve_duplicates"));
        assert!(text.contains("Could not relocate edit"));
    }
}
