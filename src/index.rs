//! Name, stem and lower-case name indices over a file tree.
//!
//! Built once per run. Lookups by name are hash hits; only the bounded fallback
//! scan touches the full file list.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::walk::{collect_files, WalkOptions};

/// A file that might be the intended target of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    /// Exact, lower-case or stem hit
    Indexed,
    /// Found by the bounded fallback scan
    Fallback,
}

#[derive(Debug, Default)]
pub struct ReferenceIndex {
    by_name: HashMap<String, Vec<PathBuf>>,
    by_stem: HashMap<String, Vec<PathBuf>>,
    by_lower_name: HashMap<String, Vec<PathBuf>>,
    all_files: Vec<PathBuf>,
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem().map(|n| n.to_string_lossy().into_owned())
}

impl ReferenceIndex {
    /// Walk `root` and index every file the options allow. Also returns the
    /// entries the walk could not read.
    pub fn build(root: &Path, options: &WalkOptions) -> (Self, Vec<String>) {
        let set = collect_files(root, options);
        let index = Self::from_files(set.files);
        debug!(root = %root.display(), files = index.len(), "reference index built");
        (index, set.errors)
    }

    pub fn from_files<I>(files: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut index = Self::default();
        for path in files {
            index.insert(path);
        }
        index
    }

    fn insert(&mut self, path: PathBuf) {
        let (Some(name), Some(stem)) = (file_name(&path), file_stem(&path)) else {
            return;
        };
        self.by_lower_name
            .entry(name.to_lowercase())
            .or_default()
            .push(path.clone());
        self.by_stem.entry(stem).or_default().push(path.clone());
        self.by_name.entry(name).or_default().push(path.clone());
        self.all_files.push(path);
    }

    pub fn len(&self) -> usize {
        self.all_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all_files.is_empty()
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.all_files
    }

    pub fn find_exact(&self, name: &str) -> &[PathBuf] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find_case_insensitive(&self, name: &str) -> &[PathBuf] {
        self.by_lower_name
            .get(&name.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn find_by_stem(&self, stem: &str) -> &[PathBuf] {
        self.by_stem.get(stem).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Candidate files for a reference to `target` (a path or bare file name).
    ///
    /// Index hits come first. When fewer than `min_indexed` were found, the first
    /// `scan_limit` files are scanned for names sharing at least two distinct
    /// characters with the target. Each path appears once.
    pub fn candidates(
        &self,
        target: &str,
        min_indexed: usize,
        scan_limit: usize,
    ) -> Vec<(PathBuf, CandidateSource)> {
        let target_path = Path::new(target);
        let (Some(name), Some(stem)) = (file_name(target_path), file_stem(target_path)) else {
            return Vec::new();
        };

        let mut seen: BTreeSet<&Path> = BTreeSet::new();
        let mut out = Vec::new();

        let indexed = self
            .find_exact(&name)
            .iter()
            .chain(self.find_case_insensitive(&name))
            .chain(self.find_by_stem(&stem));
        for path in indexed {
            if seen.insert(path.as_path()) {
                out.push((path.clone(), CandidateSource::Indexed));
            }
        }

        if out.len() < min_indexed {
            let target_chars: BTreeSet<char> = name.to_lowercase().chars().collect();
            for path in self.all_files.iter().take(scan_limit) {
                if seen.contains(path.as_path()) {
                    continue;
                }
                let Some(candidate) = file_name(path) else {
                    continue;
                };
                let shared = candidate
                    .to_lowercase()
                    .chars()
                    .collect::<BTreeSet<char>>()
                    .intersection(&target_chars)
                    .count();
                if shared >= 2 {
                    seen.insert(path.as_path());
                    out.push((path.clone(), CandidateSource::Fallback));
                }
            }
        }

        out
    }
}
