use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, trace};

/// File access used by `include`, `.file` and `parse_file`.
pub trait FileSystem: Debug + Send + Sync {
    fn read(&self, path: &Path) -> io::Result<String>;

    /// Resolves `relative` against `base_dir`, returning the path only when
    /// it names an existing file.
    fn resolve_path(&self, relative: &str, base_dir: &Path) -> Option<PathBuf>;

    /// Files matching `pattern` relative to `base_dir`, in sorted order.
    fn glob(&self, pattern: &str, base_dir: &Path) -> Vec<PathBuf>;

    fn exists(&self, path: &Path) -> bool;

    fn is_file(&self, path: &Path) -> bool;
}

/// [`FileSystem`] backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read(&self, path: &Path) -> io::Result<String> {
        trace!("OsFileSystem::read {}", path.display());
        std::fs::read_to_string(path)
    }

    fn resolve_path(&self, relative: &str, base_dir: &Path) -> Option<PathBuf> {
        let candidate = base_dir.join(relative);
        if !candidate.is_file() {
            debug!("Unable to resolve '{}' from {}", relative, base_dir.display());
            return None;
        }
        Some(candidate.canonicalize().unwrap_or(candidate))
    }

    fn glob(&self, pattern: &str, base_dir: &Path) -> Vec<PathBuf> {
        let full_pattern = base_dir.join(pattern);
        let Ok(paths) = glob::glob(&full_pattern.to_string_lossy()) else {
            debug!("Invalid glob pattern '{}'", pattern);
            return Vec::new();
        };

        let mut files: Vec<PathBuf> = paths
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .map(|path| path.canonicalize().unwrap_or(path))
            .collect();
        files.sort();
        files
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }
}
