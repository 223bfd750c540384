//! Broken reference detection and fuzzy resolution.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::blocks::LinkRef;
use crate::confidence::{
    assess_change_magnitude, calculate_confidence, ChangeCategory, ConfidenceFactors,
    ConfidenceWeights,
};
use crate::config::LinksConfig;
use crate::edit::ProposedEdit;
use crate::error::ConfidenceError;
use crate::index::ReferenceIndex;
use crate::similarity::{levenshtein, ratio};

/// Leading text of every link fix reason.
pub const LINK_FIX_REASON: &str = "Fix broken link";

/// A local reference whose target does not exist.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BrokenReference {
    pub source_file: PathBuf,
    pub source_line: usize,
    pub original_target: String,
    pub text: String,
    pub full_match: String,
    pub suggested_target: Option<String>,
    pub confidence: Option<f64>,
}

/// The resolver's pick for a broken reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub path: PathBuf,
    /// Link target to write, anchor included
    pub target: String,
    /// Name-match score in `[0, 1]`
    pub score: f64,
    pub confidence: f64,
}

/// Targets never checked on disk: web and mail links, in-page anchors.
pub fn is_external(target: &str) -> bool {
    let t = target.trim();
    t.starts_with('#')
        || t.starts_with("mailto:")
        || t.starts_with("tel:")
        || t.starts_with("http://")
        || t.starts_with("https://")
        || t.contains("://")
}

/// Split `path#anchor`; the anchor keeps its `#`.
pub fn split_anchor(target: &str) -> (&str, Option<&str>) {
    match target.find('#') {
        Some(pos) => (&target[..pos], Some(&target[pos..])),
        None => (target, None),
    }
}

/// Where a local target points on disk. `/`-prefixed targets are project-rooted.
pub fn resolve_target(project_root: &Path, source_file: &Path, target: &str) -> Option<PathBuf> {
    if is_external(target) {
        return None;
    }
    let (path, _) = split_anchor(target.trim());
    if path.is_empty() {
        return None;
    }
    if let Some(rooted) = path.strip_prefix('/') {
        Some(project_root.join(rooted))
    } else {
        let dir = source_file.parent().unwrap_or_else(|| Path::new(""));
        Some(dir.join(path))
    }
}

/// Links from one file whose local target is missing.
pub fn find_broken(project_root: &Path, source_file: &Path, links: &[LinkRef]) -> Vec<BrokenReference> {
    links
        .iter()
        .filter_map(|link| {
            let resolved = resolve_target(project_root, source_file, &link.target)?;
            if resolved.exists() {
                return None;
            }
            Some(BrokenReference {
                source_file: source_file.to_path_buf(),
                source_line: link.line,
                original_target: link.target.clone(),
                text: link.text.clone(),
                full_match: link.full_match.clone(),
                suggested_target: None,
                confidence: None,
            })
        })
        .collect()
}

/// `/`-joined path for use inside a markdown link.
fn to_link_string(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Link text pointing from `from_file` to `to_file`.
///
/// Relative when the target sits under the linking file's directory, otherwise
/// rooted at the project (`/docs/...`).
pub fn link_path(project_root: &Path, from_file: &Path, to_file: &Path) -> String {
    let from_dir = from_file.parent().unwrap_or_else(|| Path::new(""));
    if let Ok(rel) = to_file.strip_prefix(from_dir) {
        return to_link_string(rel);
    }
    match to_file.strip_prefix(project_root) {
        Ok(rel) => format!("/{}", to_link_string(rel)),
        Err(_) => to_file.display().to_string(),
    }
}

/// Ranks index candidates for broken references.
pub struct FuzzyResolver<'a> {
    index: &'a ReferenceIndex,
    project_root: &'a Path,
    config: &'a LinksConfig,
    weights: ConfidenceWeights,
}

impl<'a> FuzzyResolver<'a> {
    pub fn new(
        index: &'a ReferenceIndex,
        project_root: &'a Path,
        config: &'a LinksConfig,
        weights: ConfidenceWeights,
    ) -> Self {
        Self {
            index,
            project_root,
            config,
            weights,
        }
    }

    /// Name-match score of `candidate` for a broken `target`.
    ///
    /// - 1.0: same file name ignoring case
    /// - 0.95: same stem and a similar parent directory
    /// - 0.95 to 0.90: edit distance up to 2
    /// - 0.90 to 0.85: edit distance 3 to 5
    /// - otherwise the character similarity ratio of the names
    pub fn score(&self, target: &str, candidate: &Path) -> f64 {
        let (target_path, _) = split_anchor(target);
        let target_path = Path::new(target_path);

        let broken_name = target_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let candidate_name = candidate
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let broken_lower = broken_name.to_lowercase();
        let candidate_lower = candidate_name.to_lowercase();
        if broken_lower == candidate_lower {
            return 1.0;
        }

        let broken_stem = target_path.file_stem().map(|s| s.to_string_lossy().to_lowercase());
        let candidate_stem = candidate.file_stem().map(|s| s.to_string_lossy().to_lowercase());
        if broken_stem.is_some() && broken_stem == candidate_stem {
            let broken_dir = to_link_string(target_path.parent().unwrap_or_else(|| Path::new("")));
            let candidate_parent = candidate.parent().unwrap_or_else(|| Path::new(""));
            let candidate_dir =
                to_link_string(candidate_parent.strip_prefix(self.project_root).unwrap_or(candidate_parent));
            if ratio(&broken_dir, &candidate_dir) > 0.7 {
                return 0.95;
            }
        }

        let distance = levenshtein(&broken_lower, &candidate_lower);
        match distance {
            0..=2 => 0.95 - distance as f64 * 0.025,
            3..=5 => 0.90 - (distance - 2) as f64 * (0.05 / 3.0),
            _ => ratio(&broken_name, &candidate_name),
        }
    }

    /// Candidates at or above the fuzzy threshold, best first; ties by path.
    pub fn rank(&self, target: &str) -> Vec<(PathBuf, f64)> {
        let (path_part, _) = split_anchor(target);
        let mut ranked: Vec<(PathBuf, f64)> = self
            .index
            .candidates(
                path_part,
                self.config.min_indexed_candidates,
                self.config.fallback_scan_limit,
            )
            .into_iter()
            .map(|(path, _)| {
                let score = self.score(target, &path);
                (path, score)
            })
            .filter(|(_, score)| *score >= self.config.fuzzy_threshold)
            .collect();

        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }

    /// Best replacement for a broken reference, or `None` when nothing clears the threshold.
    pub fn resolve(&self, broken: &BrokenReference) -> Result<Option<Resolution>, ConfidenceError> {
        let Some((path, score)) = self.rank(&broken.original_target).into_iter().next() else {
            debug!(
                file = %broken.source_file.display(),
                line = broken.source_line,
                target = %broken.original_target,
                "no candidate above threshold"
            );
            return Ok(None);
        };

        let (_, anchor) = split_anchor(&broken.original_target);
        let target = format!(
            "{}{}",
            link_path(self.project_root, &broken.source_file, &path),
            anchor.unwrap_or("")
        );

        let old_link = &broken.full_match;
        let new_link = format!("[{}]({})", broken.text, target);
        let factors = ConfidenceFactors::new(
            score,
            assess_change_magnitude(old_link, &new_link),
            ChangeCategory::BrokenLinkFix.risk_score(),
            self.config.historical_success_rate,
        )?;
        let confidence = calculate_confidence(&factors, &self.weights)?;

        Ok(Some(Resolution {
            path,
            target,
            score,
            confidence,
        }))
    }
}

impl BrokenReference {
    pub fn with_resolution(mut self, resolution: &Resolution) -> Self {
        self.suggested_target = Some(resolution.target.clone());
        self.confidence = Some(resolution.confidence);
        self
    }

    /// Edit replacing the whole source line with one whose link points at the suggestion.
    ///
    /// `None` when no suggestion is set or the link is no longer on `line`.
    pub fn to_edit(&self, line: &str) -> Option<ProposedEdit> {
        let suggested = self.suggested_target.as_ref()?;
        if !line.contains(&self.full_match) {
            return None;
        }
        let new_link = format!("[{}]({})", self.text, suggested);
        Some(ProposedEdit {
            file: self.source_file.clone(),
            anchor_line: self.source_line,
            old_text: line.to_string(),
            new_text: line.replacen(&self.full_match, &new_link, 1),
            confidence: self.confidence.unwrap_or(0.0),
            reason: format!("{LINK_FIX_REASON}: {} -> {}", self.original_target, suggested),
            category: ChangeCategory::BrokenLinkFix,
            requires_review: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{extract_links, DEFAULT_LINK_PATTERN};
    use regex::Regex;
    use std::fs;
    use tempfile::TempDir;

    fn resolver_fixture() -> (TempDir, ReferenceIndex) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        for rel in ["docs/guide.md", "docs/api/reference.md", "docs/installation.md", "scripts/setup.sh"] {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, "x").unwrap();
        }
        let index = ReferenceIndex::from_files(
            ["docs/guide.md", "docs/api/reference.md", "docs/installation.md", "scripts/setup.sh"]
                .iter()
                .map(|rel| root.join(rel)),
        );
        (dir, index)
    }

    fn broken(root: &Path, source: &str, target: &str) -> BrokenReference {
        BrokenReference {
            source_file: root.join(source),
            source_line: 3,
            original_target: target.to_string(),
            text: "Guide".to_string(),
            full_match: format!("[Guide]({target})"),
            suggested_target: None,
            confidence: None,
        }
    }

    #[test]
    fn test_is_external() {
        assert!(is_external("https://example.com/a.md"));
        assert!(is_external("mailto:someone@example.com"));
        assert!(is_external("#section"));
        assert!(is_external("ftp://host/file"));
        assert!(!is_external("../guide.md#intro"));
    }

    #[test]
    fn test_split_anchor() {
        assert_eq!(split_anchor("guide.md#setup"), ("guide.md", Some("#setup")));
        assert_eq!(split_anchor("guide.md"), ("guide.md", None));
    }

    #[test]
    fn test_find_broken() {
        let (dir, _) = resolver_fixture();
        let root = dir.path();
        let source = root.join("docs/guide.md");
        let content = "[ok](installation.md) [bad](instalation.md#steps) [web](https://x.y) [abs](/docs/guide.md)";
        let scan = extract_links(&source, content, &Regex::new(DEFAULT_LINK_PATTERN).unwrap(), 100);

        let found = find_broken(root, &source, &scan.links);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].original_target, "instalation.md#steps");
        assert_eq!(found[0].source_line, 1);
    }

    #[test]
    fn test_scores() {
        let (dir, index) = resolver_fixture();
        let config = LinksConfig::default();
        let resolver = FuzzyResolver::new(&index, dir.path(), &config, ConfidenceWeights::default());
        let root = dir.path();

        assert_eq!(resolver.score("GUIDE.md", &root.join("docs/guide.md")), 1.0);
        assert_eq!(resolver.score("docs/guide.txt", &root.join("docs/guide.md")), 0.95);
        assert!((resolver.score("gide.md", &root.join("docs/guide.md")) - 0.925).abs() < 1e-9);
        // five insertions
        let far = resolver.score("install.md", &root.join("docs/installation.md"));
        assert!((far - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_resolve_preserves_anchor() {
        let (dir, index) = resolver_fixture();
        let root = dir.path();
        let config = LinksConfig::default();
        let resolver = FuzzyResolver::new(&index, root, &config, ConfidenceWeights::default());

        let reference = broken(root, "docs/intro.md", "instalation.md#steps");
        let resolution = resolver.resolve(&reference).unwrap().unwrap();
        assert_eq!(resolution.path, root.join("docs/installation.md"));
        assert_eq!(resolution.target, "installation.md#steps");
        assert!(resolution.confidence > 0.8 && resolution.confidence <= 1.0);

        let outside = broken(root, "docs/api/intro.md", "setup.sh");
        let resolution = resolver.resolve(&outside).unwrap().unwrap();
        assert_eq!(resolution.target, "/scripts/setup.sh");
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let (dir, index) = resolver_fixture();
        let root = dir.path();
        let config = LinksConfig::default();
        let resolver = FuzzyResolver::new(&index, root, &config, ConfidenceWeights::default());
        let reference = broken(root, "docs/intro.md", "refrence.md");

        let first = resolver.resolve(&reference).unwrap();
        let second = resolver.resolve(&reference).unwrap();
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_candidate_is_none() {
        let (dir, index) = resolver_fixture();
        let root = dir.path();
        let config = LinksConfig {
            fuzzy_threshold: 0.99,
            ..LinksConfig::default()
        };
        let resolver = FuzzyResolver::new(&index, root, &config, ConfidenceWeights::default());
        let reference = broken(root, "docs/intro.md", "qqqqqq.md");
        assert_eq!(resolver.resolve(&reference).unwrap(), None);
    }

    #[test]
    fn test_to_edit_rewrites_only_the_link() {
        let root = Path::new("/project");
        let reference = broken(root, "docs/intro.md", "gide.md").with_resolution(&Resolution {
            path: root.join("docs/guide.md"),
            target: "guide.md".to_string(),
            score: 0.925,
            confidence: 0.93,
        });

        let line = "Read the [Guide](gide.md) and the [Guide](gide.md) again.";
        let edit = reference.to_edit(line).unwrap();
        assert_eq!(edit.old_text, line);
        assert_eq!(edit.new_text, "Read the [Guide](guide.md) and the [Guide](gide.md) again.");
        assert_eq!(edit.anchor_line, 3);
        assert_eq!(edit.category, ChangeCategory::BrokenLinkFix);

        assert!(reference.to_edit("unrelated line").is_none());
    }

    #[test]
    fn test_link_path() {
        let root = Path::new("/p");
        assert_eq!(link_path(root, Path::new("/p/docs/a.md"), Path::new("/p/docs/sub/b.md")), "sub/b.md");
        assert_eq!(link_path(root, Path::new("/p/docs/a.md"), Path::new("/p/README.md")), "/README.md");
    }
}
