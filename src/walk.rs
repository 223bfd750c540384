//! Collecting files from a tree: excluded directories, globs and extension filters.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use tracing::{debug, warn};

/// What to collect from a tree.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Directory names skipped wherever they appear
    pub excluded_dirs: HashSet<String>,
    /// Glob patterns matched against the path relative to the walk root
    pub exclude: Vec<String>,
    /// Lower-case extensions with a leading dot
    pub extensions: HashSet<String>,
}

impl WalkOptions {
    pub fn new(excluded_dirs: &[String], exclude: &[String], extensions: &[String]) -> Self {
        Self {
            excluded_dirs: excluded_dirs.iter().cloned().collect(),
            exclude: exclude.to_vec(),
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    /// Compiled exclude globs. Invalid patterns are left out and reported in `errors`.
    fn exclude_set(&self, errors: &mut Vec<String>) -> GlobSet {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude {
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "skipping invalid exclude glob");
                    errors.push(format!("Invalid exclude glob '{pattern}': {e}"));
                }
            }
        }
        match builder.build() {
            Ok(set) => set,
            Err(e) => {
                errors.push(format!("Exclude globs could not be compiled: {e}"));
                GlobSet::empty()
            }
        }
    }
}

/// Files found by a walk, and everything that could not be read along the way.
#[derive(Debug, Default)]
pub struct FileSet {
    pub files: Vec<PathBuf>,
    pub errors: Vec<String>,
}

/// Extension of `path` as `.ext`, lower-cased.
pub fn dotted_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
}

/// All matching files under `root`, sorted.
///
/// `.gitignore` rules are honored. A missing root yields no files. Entries the
/// walker cannot read are skipped and listed in [`FileSet::errors`].
pub fn collect_files(root: &Path, options: &WalkOptions) -> FileSet {
    let mut set = FileSet::default();
    if root.is_file() {
        if dotted_extension(root).is_some_and(|ext| options.extensions.contains(&ext)) {
            set.files.push(root.to_path_buf());
        }
        return set;
    }
    if !root.is_dir() {
        debug!(root = %root.display(), "walk root does not exist");
        return set;
    }

    let excludes = options.exclude_set(&mut set.errors);
    let excluded_dirs = options.excluded_dirs.clone();

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .git_ignore(true)
        .git_global(false)
        .require_git(true)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && entry.depth() > 0 && excluded_dirs.contains(&*entry.file_name().to_string_lossy()))
        });

    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "walk error");
                set.errors.push(format!("Failed to walk {}: {}", root.display(), e));
                continue;
            }
        };
        let path = entry.path();

        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let ext = match dotted_extension(path) {
            Some(ext) => ext,
            None => continue,
        };
        if !options.extensions.contains(&ext) {
            continue;
        }

        let rel = path.strip_prefix(root).unwrap_or(path);
        if excludes.is_match(rel) {
            continue;
        }

        set.files.push(path.to_path_buf());
    }

    set.files.sort();
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    fn names(root: &Path, files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_collect_files_filters() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(root, "guide.md");
        touch(root, "api/Setup.MD");
        touch(root, "notes.txt");
        touch(root, "node_modules/pkg/readme.md");
        touch(root, "drafts/old.md");

        let options = WalkOptions::new(
            &["node_modules".to_string()],
            &["drafts/**".to_string()],
            &[".md".to_string()],
        );
        let set = collect_files(root, &options);
        assert_eq!(names(root, &set.files), vec!["api/Setup.MD", "guide.md"]);
        assert!(set.errors.is_empty());
    }

    #[test]
    fn test_single_file_root() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "one.md");
        let options = WalkOptions::new(&[], &[], &[".md".to_string()]);
        let set = collect_files(&dir.path().join("one.md"), &options);
        assert_eq!(set.files.len(), 1);
    }

    #[test]
    fn test_missing_root_is_empty() {
        let options = WalkOptions::new(&[], &[], &[".md".to_string()]);
        let set = collect_files(Path::new("/no/such/dir"), &options);
        assert!(set.files.is_empty());
        assert!(set.errors.is_empty());
    }

    #[test]
    fn test_invalid_exclude_glob_is_reported() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "guide.md");
        let options = WalkOptions::new(&[], &["docs/[".to_string()], &[".md".to_string()]);
        let set = collect_files(dir.path(), &options);
        assert_eq!(set.files.len(), 1);
        assert_eq!(set.errors.len(), 1);
        assert!(set.errors[0].contains("docs/["));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_reported() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(root, "guide.md");
        touch(root, "locked/hidden.md");
        let locked = root.join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users can still list the directory.
        let readable = fs::read_dir(&locked).is_ok();
        let options = WalkOptions::new(&[], &[], &[".md".to_string()]);
        let set = collect_files(root, &options);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        if readable {
            return;
        }

        assert_eq!(names(root, &set.files), vec!["guide.md"]);
        assert!(!set.errors.is_empty());
        assert!(set.errors.iter().all(|e| e.contains("Failed to walk")));
    }

    #[test]
    fn test_dotted_extension() {
        assert_eq!(dotted_extension(Path::new("a/B.Md")), Some(".md".to_string()));
        assert_eq!(dotted_extension(Path::new("Makefile")), None);
    }
}
