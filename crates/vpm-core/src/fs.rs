//! Filesystem capability (spec §6): the pluggable storage surface `install`,
//! `uninstall`, and `list` write through. A WASM host backs this trait with
//! OPFS; the native CLI backs it with the real filesystem rooted at the
//! project directory (default `/home/project`, matching the spec's default
//! for the browser tab).

use std::fs;
use std::path::PathBuf;

use crate::error::PmError;

/// Required operations for the project's virtual filesystem. Paths passed
/// in are POSIX-shaped and relative to the project root; a `None` result
/// vs. a hard error is left to each implementation the way the teacher's
/// disk-backed helpers do (a missing file on `read_file` is an error here,
/// since callers need to distinguish "absent" from "I/O failure" the same
/// way either way).
pub trait FileSystem: Send + Sync {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, PmError>;
    fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), PmError>;
    fn readdir(&self, path: &str) -> Result<Vec<String>, PmError>;
    fn mkdir(&self, path: &str, recursive: bool) -> Result<(), PmError>;
    fn rmdir(&self, path: &str, recursive: bool) -> Result<(), PmError>;
    fn exists(&self, path: &str) -> bool;
}

/// A `FileSystem` backed by the real filesystem, rooted at `project_root`.
pub struct NativeFileSystem {
    root: PathBuf,
}

impl NativeFileSystem {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self { root: project_root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            self.root.clone()
        } else {
            self.root.join(trimmed)
        }
    }

    fn io_err(path: &str, e: std::io::Error) -> PmError {
        PmError::TarballError { message: format!("filesystem error at {}: {}", path, e) }
    }
}

impl FileSystem for NativeFileSystem {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, PmError> {
        fs::read(self.resolve(path)).map_err(|e| Self::io_err(path, e))
    }

    fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), PmError> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| Self::io_err(path, e))?;
        }
        fs::write(&full, bytes).map_err(|e| Self::io_err(path, e))
    }

    fn readdir(&self, path: &str) -> Result<Vec<String>, PmError> {
        let full = self.resolve(path);
        let mut names = Vec::new();
        let entries = fs::read_dir(&full).map_err(|e| Self::io_err(path, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Self::io_err(path, e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn mkdir(&self, path: &str, recursive: bool) -> Result<(), PmError> {
        let full = self.resolve(path);
        let result = if recursive { fs::create_dir_all(&full) } else { fs::create_dir(&full) };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(Self::io_err(path, e)),
        }
    }

    fn rmdir(&self, path: &str, recursive: bool) -> Result<(), PmError> {
        let full = self.resolve(path);
        if !full.exists() {
            return Ok(());
        }
        let result = if recursive { fs::remove_dir_all(&full) } else { fs::remove_dir(&full) };
        result.map_err(|e| Self::io_err(path, e))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }
}

/// Joins a `node_modules/...`-style hoisted path with a file's relative
/// path inside the package, always with `/` separators regardless of host
/// OS (paths crossing the `FileSystem` trait boundary are POSIX-shaped).
pub fn join_package_path(package_path: &str, relative_file: &str) -> String {
    if relative_file.is_empty() {
        package_path.to_string()
    } else {
        format!("{}/{}", package_path, relative_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let fs = NativeFileSystem::new(dir.path());
        fs.write_file("node_modules/foo/index.js", b"hello").unwrap();
        assert_eq!(fs.read_file("node_modules/foo/index.js").unwrap(), b"hello");
    }

    #[test]
    fn mkdir_recursive_then_readdir_lists_entries() {
        let dir = tempfile::tempdir().unwrap();
        let fs = NativeFileSystem::new(dir.path());
        fs.mkdir("node_modules/a", true).unwrap();
        fs.mkdir("node_modules/b", true).unwrap();
        let mut names = fs.readdir("node_modules").unwrap();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn rmdir_recursive_removes_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let fs = NativeFileSystem::new(dir.path());
        fs.write_file("node_modules/foo/index.js", b"hello").unwrap();
        fs.rmdir("node_modules/foo", true).unwrap();
        assert!(!fs.exists("node_modules/foo"));
    }

    #[test]
    fn rmdir_on_missing_path_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let fs = NativeFileSystem::new(dir.path());
        assert!(fs.rmdir("node_modules/never-existed", true).is_ok());
    }

    #[test]
    fn join_package_path_joins_with_forward_slash() {
        assert_eq!(join_package_path("node_modules/foo", "index.js"), "node_modules/foo/index.js");
        assert_eq!(join_package_path("node_modules/foo", ""), "node_modules/foo");
    }
}
