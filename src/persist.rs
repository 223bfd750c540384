//! Atomic whole-file writes.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::PersistError;

/// Replace `path` with `content` via a temp file in the same directory and a rename.
///
/// A crash or failure at any point leaves the original file untouched. Existing
/// permissions are carried over to the new file.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), PersistError> {
    let parent = match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Path::new("."),
        Some(p) => p,
        None => {
            return Err(PersistError::NoParent {
                path: path.to_path_buf(),
            })
        }
    };

    let to_write_error = |source: std::io::Error| PersistError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut temp = NamedTempFile::new_in(parent).map_err(to_write_error)?;
    temp.write_all(content.as_bytes()).map_err(to_write_error)?;
    temp.as_file().sync_all().map_err(to_write_error)?;

    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(temp.path(), metadata.permissions()).map_err(to_write_error)?;
    }

    temp.persist(path).map_err(|e| to_write_error(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("guide.md");
        fs::write(&path, "old content\n").unwrap();

        write_atomic(&path, "new content\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new content\n");
        // No temp files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_atomic_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fresh.md");
        write_atomic(&path, "hello").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn test_write_atomic_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("file.md");
        let err = write_atomic(&path, "x").unwrap_err();
        assert!(matches!(err, PersistError::Write { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("script.md");
        fs::write(&path, "a").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        write_atomic(&path, "b").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }
}
