//! Cascade-safe application of proposed edits.
//!
//! Edits are grouped per file and handled bottom-to-top. Each edit's target is
//! found again by content, never by trusting its recorded line, so edits applied
//! earlier in the same file cannot make a later one land on the wrong lines. Each
//! file is read once and written once.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::blocks::DEFAULT_MAX_FILE_SIZE;
use crate::cache::FileCache;
use crate::edit::ProposedEdit;
use crate::error::ExtractError;
use crate::orchestrator::ShutdownFlag;
use crate::persist::write_atomic;
use crate::similarity::{ratio_chars, ratio_upper_bound};

/// Minimum similarity for accepting a relocated target.
pub const RELOCATION_THRESHOLD: f64 = 0.95;

/// Where an edit's old text sits in the current lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Relocation {
    /// 0-based first line of the matching window
    Found { start: usize, similarity: f64 },
    /// Nothing reached the threshold; `best` is the closest window seen
    NotFound { best: f64 },
}

fn normalized(lines: &[String]) -> Vec<char> {
    let mut out = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.extend(line.trim().chars());
    }
    out
}

/// Slide a window of the old text's line count over `lines` and return the best match.
///
/// Lines are compared trimmed. Windows overlapping `locked` lines (text written by
/// an earlier edit) are never candidates. Equal similarities resolve to the window
/// closest to `anchor_line`, then the earlier one.
pub fn relocate(lines: &[String], locked: &[bool], old_text: &str, anchor_line: usize) -> Relocation {
    let old_lines: Vec<String> = old_text.lines().map(str::to_string).collect();
    let window = old_lines.len().max(1);
    if lines.len() < window {
        return Relocation::NotFound { best: 0.0 };
    }

    let target = normalized(&old_lines);
    let anchor = anchor_line.saturating_sub(1);

    let mut best: Option<(usize, f64)> = None;
    let mut best_seen = 0.0f64;

    for start in 0..=lines.len() - window {
        if locked[start..start + window].iter().any(|l| *l) {
            continue;
        }
        let candidate = normalized(&lines[start..start + window]);
        if ratio_upper_bound(candidate.len(), target.len()) < RELOCATION_THRESHOLD {
            continue;
        }
        let similarity = ratio_chars(&candidate, &target);
        best_seen = best_seen.max(similarity);
        if similarity < RELOCATION_THRESHOLD {
            continue;
        }

        let better = match best {
            None => true,
            Some((best_start, best_sim)) => {
                similarity > best_sim
                    || (similarity == best_sim && start.abs_diff(anchor) < best_start.abs_diff(anchor))
            }
        };
        if better {
            best = Some((start, similarity));
        }
    }

    match best {
        Some((start, similarity)) => Relocation::Found { start, similarity },
        None => Relocation::NotFound { best: best_seen },
    }
}

/// An edit that made it into a file.
#[derive(Serialize, Debug, Clone)]
pub struct AppliedEdit {
    pub edit: ProposedEdit,
    /// 1-based line the edit was applied at, in the file as it was read
    pub line: usize,
    pub similarity: f64,
}

#[derive(Serialize, Debug, Clone)]
pub struct SkippedEdit {
    pub edit: ProposedEdit,
    pub reason: String,
}

/// In-memory result of applying edits to one file's content.
#[derive(Debug)]
pub struct FileRewrite {
    pub content: String,
    pub applied: Vec<AppliedEdit>,
    pub skipped: Vec<SkippedEdit>,
}

/// Apply edits to one file's text. Pure; no I/O.
///
/// Line endings and the trailing newline of the input are kept.
pub fn rewrite_content(content: &str, edits: &[&ProposedEdit]) -> FileRewrite {
    let newline = if content.contains("\r\n") { "\r\n" } else { "\n" };
    let trailing_newline = content.ends_with('\n');

    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let mut locked = vec![false; lines.len()];

    let mut ordered: Vec<&ProposedEdit> = edits.to_vec();
    ordered.sort_by(|a, b| b.anchor_line.cmp(&a.anchor_line));

    let mut applied = Vec::new();
    let mut skipped = Vec::new();

    for edit in ordered {
        match relocate(&lines, &locked, &edit.old_text, edit.anchor_line) {
            Relocation::Found { start, similarity } => {
                let window = edit.old_line_count();
                let replacement: Vec<String> = edit.new_text.lines().map(str::to_string).collect();
                let inserted = replacement.len();

                lines.splice(start..start + window, replacement);
                locked.splice(start..start + window, std::iter::repeat(true).take(inserted));

                if start + 1 != edit.anchor_line {
                    debug!(
                        file = %edit.file.display(),
                        recorded = edit.anchor_line,
                        found = start + 1,
                        "edit relocated"
                    );
                }
                applied.push(AppliedEdit {
                    edit: edit.clone(),
                    line: start + 1,
                    similarity,
                });
            }
            Relocation::NotFound { best } => {
                warn!(
                    file = %edit.file.display(),
                    line = edit.anchor_line,
                    best_similarity = best,
                    "could not relocate edit, skipping"
                );
                skipped.push(SkippedEdit {
                    edit: edit.clone(),
                    reason: format!(
                        "Could not relocate edit in {} at line {} (best match {:.0}%), skipping",
                        edit.file.display(),
                        edit.anchor_line,
                        best * 100.0
                    ),
                });
            }
        }
    }

    let mut content = lines.join(newline);
    if trailing_newline && !content.is_empty() {
        content.push_str(newline);
    }

    FileRewrite {
        content,
        applied,
        skipped,
    }
}

/// Outcome of applying a batch of edits across files.
#[derive(Serialize, Debug, Default)]
pub struct ApplyReport {
    pub applied: Vec<AppliedEdit>,
    pub skipped: Vec<SkippedEdit>,
    pub files_written: Vec<PathBuf>,
    /// Files that could not be read or written
    pub errors: Vec<String>,
    pub interrupted: bool,
}

/// Writes edits to disk, one read and one atomic write per file.
///
/// Not safe to run twice concurrently against the same file.
pub struct MutationApplier<'a> {
    cache: Option<&'a FileCache>,
    shutdown: Option<&'a ShutdownFlag>,
    max_file_size: u64,
}

/// Read a file for rewriting, refusing it above `max_size` bytes. Unlike a scan,
/// the content must be valid UTF-8 since it is written back.
fn read_for_rewrite(path: &Path, max_size: u64) -> Result<String, ExtractError> {
    let io = |source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    };
    let size = fs::metadata(path).map_err(io)?.len();
    if size > max_size {
        return Err(ExtractError::TooLarge {
            path: path.to_path_buf(),
            size,
            limit: max_size,
        });
    }
    fs::read_to_string(path).map_err(io)
}

impl<'a> MutationApplier<'a> {
    pub fn new() -> Self {
        Self {
            cache: None,
            shutdown: None,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Files above this many bytes are reported and left alone.
    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Invalidate written files in this cache.
    pub fn with_cache(mut self, cache: &'a FileCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Stop before the next file once shutdown is requested.
    pub fn with_shutdown(mut self, shutdown: &'a ShutdownFlag) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn apply(&self, edits: &[ProposedEdit]) -> ApplyReport {
        let mut by_file: BTreeMap<&PathBuf, Vec<&ProposedEdit>> = BTreeMap::new();
        for edit in edits {
            by_file.entry(&edit.file).or_default().push(edit);
        }

        let mut report = ApplyReport::default();

        for (path, file_edits) in by_file {
            if self.shutdown.is_some_and(ShutdownFlag::is_requested) {
                info!("shutdown requested, not starting further files");
                report.interrupted = true;
                break;
            }

            let content = match read_for_rewrite(path, self.max_file_size) {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot read file for editing");
                    report.errors.push(e.to_string());
                    continue;
                }
            };

            let rewrite = rewrite_content(&content, &file_edits);
            report.skipped.extend(rewrite.skipped);

            if rewrite.applied.is_empty() {
                continue;
            }

            match write_atomic(path, &rewrite.content) {
                Ok(()) => {
                    if let Some(cache) = self.cache {
                        cache.invalidate(path);
                    }
                    debug!(path = %path.display(), edits = rewrite.applied.len(), "file rewritten");
                    report.files_written.push(path.clone());
                    report.applied.extend(rewrite.applied);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "write failed, file left unchanged");
                    report.errors.push(e.to_string());
                }
            }
        }

        report
    }
}

impl Default for MutationApplier<'_> {
    fn default() -> Self {
        Self::new()
    }
}
