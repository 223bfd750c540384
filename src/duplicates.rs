//! Near-duplicate detection across files.
//!
//! Blocks are fingerprinted, banded into candidate buckets, and only bucketed pairs
//! from different files get the exact similarity check.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::blocks::{extract_blocks, BlockKind, ContentBlock};
use crate::bucket::CandidateBuckets;
use crate::cache::FileCache;
use crate::config::DuplicatesConfig;
use crate::confidence::ChangeCategory;
use crate::edit::{dedupe_edits, ProposedEdit};
use crate::fingerprint::{hamming_distance, Fingerprinter};
use crate::links::link_path;
use crate::similarity::{ratio_chars, ratio_upper_bound};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateAction {
    ReplaceWithLink,
    Merge,
    /// Never applied automatically
    Review,
}

impl DuplicateAction {
    pub fn from_similarity(similarity: f64) -> Self {
        if similarity >= 0.95 {
            DuplicateAction::ReplaceWithLink
        } else if similarity >= 0.85 {
            DuplicateAction::Merge
        } else {
            DuplicateAction::Review
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Duplication {
    pub blocks: [ContentBlock; 2],
    pub similarity: f64,
    pub canonical_file: PathBuf,
    pub action: DuplicateAction,
    pub confidence: f64,
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub files: usize,
    pub blocks: usize,
    pub buckets: usize,
    pub candidate_pairs: usize,
    pub hamming_rejected: usize,
    pub verified: usize,
}

/// Result of one detection run.
#[derive(Debug, Default)]
pub struct DuplicateScan {
    pub duplications: Vec<Duplication>,
    /// Contents read during the run, keyed by path
    pub sources: HashMap<PathBuf, Arc<String>>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub stats: ScanStats,
}

/// Confidence for a confirmed pair.
///
/// Identical texts score 1.0. When the shorter block is under 80% of the longer
/// one it may be an excerpt, so the score is cut by 30%.
pub fn duplicate_confidence(a: &str, b: &str, similarity: f64) -> f64 {
    let mut confidence = if a == b { 1.0 } else { similarity };

    let (len_a, len_b) = (a.chars().count(), b.chars().count());
    let longer = len_a.max(len_b);
    if longer > 0 && (len_a.min(len_b) as f64 / longer as f64) < 0.8 {
        confidence *= 0.7;
    }
    confidence
}

/// Priority of a path under the hierarchy rules; lower is more canonical.
fn hierarchy_priority(path: &str, rules: &[String]) -> usize {
    rules
        .iter()
        .position(|rule| path.contains(rule.as_str()))
        .unwrap_or(rules.len())
}

fn display_path(project_root: &Path, path: &Path) -> String {
    path.strip_prefix(project_root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Pick the canonical file: earliest matching hierarchy rule, then path order.
pub fn choose_canonical(files: &[&Path], rules: &[String], project_root: &Path) -> Option<PathBuf> {
    files
        .iter()
        .map(|f| {
            let shown = display_path(project_root, f);
            (hierarchy_priority(&shown, rules), shown, f.to_path_buf())
        })
        .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, _, path)| path)
}

/// The exact lines a block covers in its source.
fn source_span(content: &str, start_line: usize, end_line: usize) -> Option<String> {
    if start_line == 0 || end_line < start_line {
        return None;
    }
    let lines: Vec<&str> = content
        .lines()
        .skip(start_line - 1)
        .take(end_line - start_line + 1)
        .collect();
    if lines.len() == end_line - start_line + 1 {
        Some(lines.join("\n"))
    } else {
        None
    }
}

pub struct DuplicateDetector<'a> {
    config: &'a DuplicatesConfig,
    project_root: &'a Path,
    link_re: &'a Regex,
    fingerprinter: Fingerprinter,
}

impl<'a> DuplicateDetector<'a> {
    pub fn new(config: &'a DuplicatesConfig, project_root: &'a Path, link_re: &'a Regex) -> Self {
        Self {
            config,
            project_root,
            link_re,
            fingerprinter: Fingerprinter::new(),
        }
    }

    /// Similarity of a candidate pair, if it reaches the threshold.
    ///
    /// Pairs whose fingerprints are too far apart, or whose lengths alone rule out
    /// the threshold, are rejected before the character comparison.
    pub fn verify(&self, a: &str, b: &str, fp_a: u64, fp_b: u64) -> Option<f64> {
        if hamming_distance(fp_a, fp_b) > self.config.max_hamming_distance {
            return None;
        }
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        if ratio_upper_bound(a.len(), b.len()) < self.config.similarity_threshold {
            return None;
        }
        let similarity = ratio_chars(&a, &b);
        (similarity >= self.config.similarity_threshold).then_some(similarity)
    }

    /// Read, extract and compare every file. Unreadable or oversized files are
    /// reported on the scan and skipped.
    pub fn find_duplicates(&self, files: &[PathBuf], cache: &FileCache) -> DuplicateScan {
        let mut scan = DuplicateScan::default();

        let extracted: Vec<_> = files
            .par_iter()
            .map(|path| {
                let result = cache.read(path, self.config.max_file_size).map(|content| {
                    let blocks = extract_blocks(path, &content, self.link_re, self.config.min_block_size);
                    (content, blocks)
                });
                (path, result)
            })
            .collect();

        let mut blocks: Vec<ContentBlock> = Vec::new();
        let mut capped = false;
        for (path, result) in extracted {
            match result {
                Ok((content, file_blocks)) => {
                    scan.stats.files += 1;
                    scan.sources.insert(path.clone(), content);
                    if capped {
                        continue;
                    }
                    for block in file_blocks {
                        if !matches!(block.kind, BlockKind::Paragraph | BlockKind::Code) {
                            continue;
                        }
                        if blocks.len() >= self.config.max_blocks {
                            warn!(max_blocks = self.config.max_blocks, "block limit reached");
                            scan.warnings.push(format!(
                                "Block limit reached ({}); remaining files not compared",
                                self.config.max_blocks
                            ));
                            capped = true;
                            break;
                        }
                        blocks.push(block);
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping file");
                    scan.errors.push(e.to_string());
                }
            }
        }
        scan.stats.blocks = blocks.len();

        let fingerprints: Vec<u64> = blocks
            .par_iter()
            .map(|b| self.fingerprinter.fingerprint(&b.text))
            .collect();

        let buckets = CandidateBuckets::build(&fingerprints, self.config.num_bands);
        let pairs = buckets.candidate_pairs(|i, j| blocks[i].file == blocks[j].file);
        scan.stats.buckets = buckets.len();
        scan.stats.candidate_pairs = pairs.len();

        for (i, j) in pairs {
            let (a, b) = (&blocks[i], &blocks[j]);
            if hamming_distance(fingerprints[i], fingerprints[j]) > self.config.max_hamming_distance {
                scan.stats.hamming_rejected += 1;
                continue;
            }
            let Some(similarity) = self.verify(&a.text, &b.text, fingerprints[i], fingerprints[j]) else {
                continue;
            };
            scan.stats.verified += 1;

            let canonical_file = choose_canonical(
                &[a.file.as_path(), b.file.as_path()],
                &self.config.hierarchy_rules,
                self.project_root,
            )
            .unwrap_or_else(|| a.file.clone());

            scan.duplications.push(Duplication {
                blocks: [a.clone(), b.clone()],
                similarity,
                canonical_file,
                action: DuplicateAction::from_similarity(similarity),
                confidence: duplicate_confidence(&a.text, &b.text, similarity),
            });
        }

        info!(
            files = scan.stats.files,
            blocks = scan.stats.blocks,
            candidates = scan.stats.candidate_pairs,
            duplicates = scan.duplications.len(),
            "duplicate scan finished"
        );
        scan
    }

    /// One edit per non-canonical block, replacing it with a link to the canonical file.
    pub fn to_edits(&self, scan: &DuplicateScan) -> Vec<ProposedEdit> {
        let mut edits = Vec::new();

        for dup in &scan.duplications {
            let name = dup
                .canonical_file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            for block in dup.blocks.iter().filter(|b| b.file != dup.canonical_file) {
                let old_text = scan
                    .sources
                    .get(&block.file)
                    .and_then(|content| source_span(content, block.start_line, block.end_line))
                    .unwrap_or_else(|| block.text.clone());
                let target = link_path(self.project_root, &block.file, &dup.canonical_file);

                debug!(file = %block.file.display(), line = block.start_line, "duplicate block");
                edits.push(ProposedEdit {
                    file: block.file.clone(),
                    anchor_line: block.start_line,
                    old_text,
                    new_text: format!("See [{name}]({target})"),
                    confidence: dup.confidence,
                    reason: format!("Duplicate content (similarity: {:.0}%)", dup.similarity * 100.0),
                    category: ChangeCategory::DuplicateConsolidation,
                    requires_review: dup.action == DuplicateAction::Review,
                });
            }
        }

        dedupe_edits(edits)
    }
}
