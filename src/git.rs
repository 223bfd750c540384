//! Version control through the `git` binary.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, FixedOffset};
use tracing::debug;

use crate::confidence::{ActionThresholds, ActionTier};
use crate::edit::ProposedEdit;
use crate::error::GitError;

/// A working tree driven by shelling out to `git`.
#[derive(Debug, Clone)]
pub struct Git {
    root: PathBuf,
}

impl Git {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Whether a `git` binary can be run at all.
    pub fn is_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Paths under the root are passed relative to it, since git runs inside the root.
    fn run(&self, args: &[&str], paths: &[&Path]) -> Result<String, GitError> {
        debug!(?args, files = paths.len(), "git");
        let output = Command::new("git")
            .current_dir(&self.root)
            .args(args)
            .args(paths.iter().map(|p| self.in_root(p)))
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => GitError::NotInstalled,
                _ => GitError::Io(e),
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(GitError::CommandFailed {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn in_root<'a>(&self, path: &'a Path) -> &'a Path {
        match path.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => Path::new("."),
            Ok(rel) => rel,
            Err(_) => path,
        }
    }

    pub fn is_repo(&self) -> bool {
        self.run(&["rev-parse", "--is-inside-work-tree"], &[])
            .map(|out| out.trim() == "true")
            .unwrap_or(false)
    }

    fn ensure_repo(&self) -> Result<(), GitError> {
        if !Self::is_available() {
            return Err(GitError::NotInstalled);
        }
        if !self.is_repo() {
            return Err(GitError::NotARepo(self.root.clone()));
        }
        Ok(())
    }

    pub fn is_tracked(&self, file: &Path) -> Result<bool, GitError> {
        match self.run(&["ls-files", "--error-unmatch", "--"], &[file]) {
            Ok(_) => Ok(true),
            Err(GitError::CommandFailed { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn stage(&self, files: &[PathBuf]) -> Result<(), GitError> {
        if files.is_empty() {
            return Ok(());
        }
        self.ensure_repo()?;
        let paths: Vec<&Path> = files.iter().map(PathBuf::as_path).collect();
        self.run(&["add", "--"], &paths)?;
        Ok(())
    }

    /// Stage and commit exactly `files`.
    pub fn commit(&self, message: &str, files: &[PathBuf]) -> Result<(), GitError> {
        if files.is_empty() {
            return Ok(());
        }
        self.stage(files)?;
        let paths: Vec<&Path> = files.iter().map(PathBuf::as_path).collect();
        self.run(&["commit", "--quiet", "-m", message, "--"], &paths)?;
        Ok(())
    }

    /// Restore a tracked file from `HEAD`.
    pub fn revert_file(&self, file: &Path) -> Result<(), GitError> {
        self.ensure_repo()?;
        if !self.is_tracked(file)? {
            return Err(GitError::Untracked(file.to_path_buf()));
        }
        self.run(&["checkout", "HEAD", "--"], &[file])?;
        Ok(())
    }

    /// Committer timestamp of the last commit touching `file`; `None` if it has none.
    pub fn last_change(&self, file: &Path) -> Result<Option<DateTime<FixedOffset>>, GitError> {
        self.ensure_repo()?;
        let out = self.run(&["log", "-1", "--format=%cI", "--"], &[file])?;
        let stamp = out.trim();
        if stamp.is_empty() {
            return Ok(None);
        }
        DateTime::parse_from_rfc3339(stamp)
            .map(Some)
            .map_err(|e| GitError::CommandFailed {
                command: "log".to_string(),
                stderr: format!("unexpected timestamp '{stamp}': {e}"),
            })
    }
}

/// Files grouped by the weakest tier among their applied edits.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TierPartition {
    pub commit: Vec<PathBuf>,
    pub stage: Vec<PathBuf>,
    pub report_only: Vec<PathBuf>,
}

pub fn partition_by_tier(edits: &[ProposedEdit], thresholds: &ActionThresholds) -> TierPartition {
    let mut weakest: BTreeMap<&Path, ActionTier> = BTreeMap::new();
    for edit in edits {
        let tier = thresholds.tier(edit.confidence);
        weakest
            .entry(edit.file.as_path())
            .and_modify(|t| *t = (*t).min(tier))
            .or_insert(tier);
    }

    let mut out = TierPartition::default();
    for (file, tier) in weakest {
        let bucket = match tier {
            ActionTier::AutoCommit => &mut out.commit,
            ActionTier::AutoStage => &mut out.stage,
            ActionTier::ReportOnly => &mut out.report_only,
        };
        bucket.push(file.to_path_buf());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::ChangeCategory;
    use std::fs;
    use tempfile::TempDir;

    fn edit(file: &str, confidence: f64) -> ProposedEdit {
        ProposedEdit {
            file: PathBuf::from(file),
            anchor_line: 1,
            old_text: "a".to_string(),
            new_text: "b".to_string(),
            confidence,
            reason: "test".to_string(),
            category: ChangeCategory::BrokenLinkFix,
            requires_review: false,
        }
    }

    #[test]
    fn test_partition_uses_weakest_edit() {
        let edits = vec![
            edit("a.md", 0.95),
            edit("a.md", 0.85),
            edit("b.md", 0.99),
            edit("c.md", 0.5),
        ];
        let parts = partition_by_tier(&edits, &ActionThresholds::default());
        assert_eq!(parts.commit, vec![PathBuf::from("b.md")]);
        assert_eq!(parts.stage, vec![PathBuf::from("a.md")]);
        assert_eq!(parts.report_only, vec![PathBuf::from("c.md")]);
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git").current_dir(dir).args(args).output().unwrap();
        assert!(status.status.success(), "git {:?} failed", args);
    }

    fn init_repo() -> Option<TempDir> {
        if !Git::is_available() {
            return None;
        }
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "--quiet"]);
        git(dir.path(), &["config", "user.email", "docs@example.com"]);
        git(dir.path(), &["config", "user.name", "Docs"]);
        git(dir.path(), &["config", "commit.gpgsign", "false"]);
        Some(dir)
    }

    #[test]
    fn test_not_a_repo() {
        if !Git::is_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let repo = Git::new(dir.path());
        assert!(!repo.is_repo());
        assert!(matches!(
            repo.revert_file(Path::new("a.md")),
            Err(GitError::NotARepo(_))
        ));
    }

    #[test]
    fn test_commit_revert_and_history() {
        let Some(dir) = init_repo() else {
            return;
        };
        let root = dir.path();
        let file = root.join("guide.md");
        fs::write(&file, "original\n").unwrap();

        let repo = Git::new(root);
        assert!(repo.is_repo());

        repo.commit("docs: add guide", &[file.clone()]).unwrap();
        assert!(repo.is_tracked(&file).unwrap());
        assert!(repo.last_change(&file).unwrap().is_some());

        fs::write(&file, "healed\n").unwrap();
        repo.revert_file(&file).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "original\n");

        let untracked = root.join("new.md");
        fs::write(&untracked, "x\n").unwrap();
        assert!(matches!(
            repo.revert_file(&untracked),
            Err(GitError::Untracked(_))
        ));
    }

    #[test]
    fn test_in_root_strips_prefix() {
        let repo = Git::new("proj");
        assert_eq!(repo.in_root(Path::new("proj/docs/index.md")), Path::new("docs/index.md"));
        assert_eq!(repo.in_root(Path::new("proj")), Path::new("."));
        assert_eq!(repo.in_root(Path::new("/elsewhere/a.md")), Path::new("/elsewhere/a.md"));
    }

    #[test]
    fn test_commit_with_relative_root() {
        if !Git::is_available() {
            return;
        }
        let dir = TempDir::new_in(".").unwrap();
        let cwd = std::env::current_dir().unwrap();
        let root = dir.path().strip_prefix(&cwd).unwrap_or(dir.path()).to_path_buf();
        assert!(root.is_relative());
        git(&root, &["init", "--quiet"]);
        git(&root, &["config", "user.email", "docs@example.com"]);
        git(&root, &["config", "user.name", "Docs"]);
        git(&root, &["config", "commit.gpgsign", "false"]);

        fs::create_dir_all(root.join("docs")).unwrap();
        let file = root.join("docs/index.md");
        fs::write(&file, "index\n").unwrap();

        let repo = Git::new(&root);
        repo.commit("docs: add index", &[file.clone()]).unwrap();
        assert!(repo.is_tracked(&file).unwrap());
        assert!(repo.last_change(&file).unwrap().is_some());
    }
}
