//! The edit value passed from the matching paths to the applier.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::confidence::ChangeCategory;

/// A proposed textual replacement. Never mutated once created.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProposedEdit {
    pub file: PathBuf,
    /// 1-based line where `old_text` started when the edit was proposed
    pub anchor_line: usize,
    pub old_text: String,
    pub new_text: String,
    pub confidence: f64,
    pub reason: String,
    pub category: ChangeCategory,
    /// Shown in reports but never applied automatically
    pub requires_review: bool,
}

impl ProposedEdit {
    /// Number of lines `old_text` covers (at least one).
    pub fn old_line_count(&self) -> usize {
        self.old_text.lines().count().max(1)
    }

    pub fn is_applicable(&self, min_confidence: f64) -> bool {
        !self.requires_review && self.confidence >= min_confidence
    }
}

/// Keep one edit per `(file, anchor_line)`, preferring the highest confidence.
///
/// Output is ordered by file, then anchor line.
pub fn dedupe_edits(edits: Vec<ProposedEdit>) -> Vec<ProposedEdit> {
    let mut best: HashMap<(PathBuf, usize), ProposedEdit> = HashMap::new();

    for edit in edits {
        let key = (edit.file.clone(), edit.anchor_line);
        match best.get(&key) {
            Some(existing) if existing.confidence >= edit.confidence => {}
            _ => {
                best.insert(key, edit);
            }
        }
    }

    let mut out: Vec<ProposedEdit> = best.into_values().collect();
    out.sort_by(|a, b| a.file.cmp(&b.file).then(a.anchor_line.cmp(&b.anchor_line)));
    out
}
