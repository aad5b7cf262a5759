//! Filesystem primitives used by the command handlers.
//!
//! The handlers only ever talk to the [`FileSystem`] trait; [`LocalFs`] maps
//! it onto `std::fs`. Every operation reports success or a typed [`FsError`],
//! and none of them overwrite an existing target.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use thiserror::Error;

/// Result type alias for filesystem primitives.
pub type FsResult<T> = std::result::Result<T, FsError>;

/// Failure reported by a filesystem primitive.
#[derive(Debug, Error)]
pub enum FsError {
    /// Target path is already taken.
    #[error("already exists")]
    AlreadyExists,
    /// Source path does not exist.
    #[error("not found")]
    NotFound,
    /// Directory copy whose destination lies inside the source.
    #[error("cannot copy a directory into itself")]
    IntoItself,
    /// Any other I/O failure (permissions, not a directory, bad encoding...).
    #[error("io error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => FsError::NotFound,
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists,
            _ => FsError::Io(e),
        }
    }
}

/// Primitive operations on the served directory tree.
///
/// Paths are already resolved against the server root by the caller.
pub trait FileSystem {
    /// Check if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Check if a path exists and is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Create an empty file; fails if anything exists at `path`.
    fn create_file(&self, path: &Path) -> FsResult<()>;

    /// Create a single directory; fails if anything exists at `path`.
    fn create_dir(&self, path: &Path) -> FsResult<()>;

    /// Names of the entries in a directory, sorted.
    fn list(&self, path: &Path) -> FsResult<Vec<String>>;

    /// Read a text file as lines (line terminators stripped).
    fn read_lines(&self, path: &Path) -> FsResult<Vec<String>>;

    /// Remove a file, or a directory with everything below it.
    fn remove(&self, path: &Path) -> FsResult<()>;

    /// Copy a file or a directory tree to `to`, which must not exist.
    fn copy(&self, from: &Path, to: &Path) -> FsResult<()>;
}

/// [`FileSystem`] backed by the host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl FileSystem for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_file(&self, path: &Path) -> FsResult<()> {
        OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(())
    }

    fn create_dir(&self, path: &Path) -> FsResult<()> {
        fs::create_dir(path)?;
        Ok(())
    }

    fn list(&self, path: &Path) -> FsResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn read_lines(&self, path: &Path) -> FsResult<Vec<String>> {
        let contents = fs::read_to_string(path)?;
        Ok(contents.lines().map(str::to_owned).collect())
    }

    fn remove(&self, path: &Path) -> FsResult<()> {
        let metadata = fs::symlink_metadata(path)?;
        if metadata.is_dir() {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> FsResult<()> {
        if self.exists(to) {
            return Err(FsError::AlreadyExists);
        }

        let metadata = fs::metadata(from)?;
        if metadata.is_dir() {
            if to.starts_with(from) {
                return Err(FsError::IntoItself);
            }
            fs::create_dir(to)?;
            if let Err(e) = copy_entries(from, to) {
                // Leave no partial tree behind
                let _ = fs::remove_dir_all(to);
                return Err(e);
            }
            Ok(())
        } else {
            fs::copy(from, to)?;
            Ok(())
        }
    }
}

/// Copy the contents of directory `from` into the existing directory `to`.
fn copy_entries(from: &Path, to: &Path) -> FsResult<()> {
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            fs::create_dir(&target)?;
            copy_entries(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_file_refuses_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");

        LocalFs.create_file(&path).unwrap();
        fs::write(&path, "keep me").unwrap();

        assert!(matches!(
            LocalFs.create_file(&path),
            Err(FsError::AlreadyExists)
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep me");
    }

    #[test]
    fn test_create_dir_missing_parent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("child");

        assert!(matches!(LocalFs.create_dir(&path), Err(FsError::NotFound)));
    }

    #[test]
    fn test_list_sorted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), "").unwrap();
        fs::write(dir.path().join("a.txt"), "").unwrap();
        fs::create_dir(dir.path().join("c")).unwrap();

        let names = LocalFs.list(dir.path()).unwrap();
        assert_eq!(names, vec!["a.txt", "b.txt", "c"]);
    }

    #[test]
    fn test_read_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "first\r\nsecond\nthird").unwrap();

        let lines = LocalFs.read_lines(&path).unwrap();
        assert_eq!(lines, vec!["first", "second", "third"]);

        assert!(matches!(
            LocalFs.read_lines(&dir.path().join("nope")),
            Err(FsError::NotFound)
        ));
    }

    #[test]
    fn test_remove_file_and_tree() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f");
        let tree = dir.path().join("t");
        fs::write(&file, "").unwrap();
        fs::create_dir_all(tree.join("inner")).unwrap();
        fs::write(tree.join("inner").join("x"), "x").unwrap();

        LocalFs.remove(&file).unwrap();
        LocalFs.remove(&tree).unwrap();

        assert!(!file.exists());
        assert!(!tree.exists());
        assert!(matches!(LocalFs.remove(&file), Err(FsError::NotFound)));
    }

    #[test]
    fn test_copy_file_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        fs::write(&src, "new").unwrap();
        fs::write(&dst, "old").unwrap();

        assert!(matches!(
            LocalFs.copy(&src, &dst),
            Err(FsError::AlreadyExists)
        ));
        assert_eq!(fs::read_to_string(&dst).unwrap(), "old");
    }

    #[test]
    fn test_copy_tree() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("nested").join("leaf.txt"), "leaf").unwrap();

        let dst = dir.path().join("dst");
        LocalFs.copy(&src, &dst).unwrap();

        assert_eq!(
            fs::read_to_string(dst.join("nested").join("leaf.txt")).unwrap(),
            "leaf"
        );
    }

    #[test]
    fn test_copy_dir_into_itself() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("loop");
        fs::create_dir(&src).unwrap();

        assert!(matches!(
            LocalFs.copy(&src, &src.join("loop")),
            Err(FsError::IntoItself)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_tree_copy_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("nested").join("leaf.txt"), "leaf").unwrap();
        fs::write(src.join("top.txt"), "top").unwrap();
        // Copying a symlink to a directory as a file fails
        std::os::unix::fs::symlink(dir.path(), src.join("link")).unwrap();

        let dst = dir.path().join("dst");
        assert!(matches!(LocalFs.copy(&src, &dst), Err(FsError::Io(_))));
        assert!(!dst.exists());

        // The destination is free for a later attempt
        fs::remove_file(src.join("link")).unwrap();
        LocalFs.copy(&src, &dst).unwrap();
        assert_eq!(fs::read_to_string(dst.join("top.txt")).unwrap(), "top");
    }
}
