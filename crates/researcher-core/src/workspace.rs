//! Workspace boundary
//!
//! The workspace is the single directory an agent family may touch. Every
//! path-accepting tool asks [`Workspace::is_within`] before any side effect.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace directory cannot be empty")]
    EmptyRoot,

    #[error("path {path} is not within workspace {root}")]
    PathOutsideWorkspace { path: PathBuf, root: PathBuf },

    #[error("must pass confirm=true to clear workspace")]
    ClearNotConfirmed,

    #[error("invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("workspace I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WorkspaceError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Snapshot of the workspace directory
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceInfo {
    pub path: PathBuf,
    pub exists: bool,
    pub is_directory: bool,
    pub total_files: usize,
    pub total_directories: usize,
}

/// An authorized root directory
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open a workspace, creating the directory if it doesn't exist
    pub fn open(root: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        Self::new(root, true)
    }

    /// Open a workspace. With `create_if_missing` unset the directory is
    /// not created, and the root is kept in normalized absolute form.
    pub fn new(root: impl AsRef<Path>, create_if_missing: bool) -> Result<Self, WorkspaceError> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            return Err(WorkspaceError::EmptyRoot);
        }

        let absolute = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| WorkspaceError::io(root, e))?
                .join(root)
        };

        if create_if_missing && !absolute.exists() {
            std::fs::create_dir_all(&absolute).map_err(|e| WorkspaceError::io(&absolute, e))?;
            debug!(path = %absolute.display(), "Created workspace directory");
        }

        let root = canonicalize_lenient(&absolute);
        info!(path = %root.display(), "Workspace initialized");
        Ok(Self { root })
    }

    /// Canonical absolute root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Interpret `path` against the root.
    ///
    /// Absolute paths come back unchanged; relative paths are joined onto the
    /// root and canonicalized (`..` and symlinks resolved where they exist).
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            canonicalize_lenient(&self.root.join(path))
        }
    }

    /// The path the filesystem will actually reach for `path`, with every
    /// existing symlink followed
    pub fn canonical(&self, path: impl AsRef<Path>) -> PathBuf {
        canonicalize_lenient(&self.resolve(path))
    }

    /// True iff the canonical form of `path` is the root or lies beneath it
    pub fn is_within(&self, path: impl AsRef<Path>) -> bool {
        self.canonical(path).starts_with(&self.root)
    }

    /// Express `path` relative to the root. Display only; authorization
    /// always goes through [`Workspace::is_within`].
    pub fn relative_to(&self, path: impl AsRef<Path>) -> Result<PathBuf, WorkspaceError> {
        let path = path.as_ref();
        self.canonical(path)
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .map_err(|_| WorkspaceError::PathOutsideWorkspace {
                path: path.to_path_buf(),
                root: self.root.clone(),
            })
    }

    /// Relative form for messages, falling back to the resolved path
    pub fn display_path(&self, path: impl AsRef<Path>) -> String {
        let path = path.as_ref();
        match self.relative_to(path) {
            Ok(rel) => rel.display().to_string(),
            Err(_) => self.resolve(path).display().to_string(),
        }
    }

    /// Files (never directories) under the root matching a glob pattern.
    ///
    /// With `recursive` set, a pattern without `**` is matched at any depth.
    pub fn list_matching(
        &self,
        pattern: &str,
        recursive: bool,
    ) -> Result<Vec<PathBuf>, WorkspaceError> {
        let pattern = if recursive && !pattern.contains("**") {
            format!("**/{}", pattern)
        } else {
            pattern.to_string()
        };

        let full = self.root.join(&pattern);
        let full = full.to_string_lossy();
        let entries = glob::glob(&full).map_err(|e| WorkspaceError::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        Ok(files)
    }

    /// Create a directory (and parents) inside the workspace
    pub fn create_subdirectory(&self, subdir: impl AsRef<Path>) -> Result<PathBuf, WorkspaceError> {
        let subdir = subdir.as_ref();
        if !self.is_within(subdir) {
            return Err(WorkspaceError::PathOutsideWorkspace {
                path: subdir.to_path_buf(),
                root: self.root.clone(),
            });
        }

        let resolved = self.canonical(subdir);
        std::fs::create_dir_all(&resolved).map_err(|e| WorkspaceError::io(&resolved, e))?;
        debug!(path = %resolved.display(), "Created subdirectory");
        Ok(resolved)
    }

    pub fn info(&self) -> WorkspaceInfo {
        let exists = self.root.exists();
        let is_directory = self.root.is_dir();
        let mut total_files = 0;
        let mut total_directories = 0;

        if is_directory {
            for entry in walkdir::WalkDir::new(&self.root)
                .min_depth(1)
                .into_iter()
                .filter_map(Result::ok)
            {
                if entry.file_type().is_dir() {
                    total_directories += 1;
                } else if entry.file_type().is_file() {
                    total_files += 1;
                }
            }
        }

        WorkspaceInfo {
            path: self.root.clone(),
            exists,
            is_directory,
            total_files,
            total_directories,
        }
    }

    /// Remove everything under the root, keeping the root itself.
    /// Destructive, so `confirm` must be true.
    pub fn clear(&self, confirm: bool) -> Result<(), WorkspaceError> {
        if !confirm {
            return Err(WorkspaceError::ClearNotConfirmed);
        }

        if !self.root.exists() {
            warn!(path = %self.root.display(), "Workspace doesn't exist, nothing to clear");
            return Ok(());
        }

        let entries = std::fs::read_dir(&self.root).map_err(|e| WorkspaceError::io(&self.root, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| WorkspaceError::io(&self.root, e))?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|e| WorkspaceError::io(&path, e))?;
            let removed = if file_type.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            removed.map_err(|e| WorkspaceError::io(&path, e))?;
        }

        warn!(path = %self.root.display(), "Cleared workspace");
        Ok(())
    }
}

impl std::fmt::Display for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Workspace({})", self.root.display())
    }
}

/// Symlink hops followed before a dangling chain is left as-is
const MAX_SYMLINK_HOPS: usize = 40;

/// Canonicalize a path that may not exist yet.
///
/// Components are walked left to right and each existing prefix is
/// canonicalized before the next one is applied, so a `..` after a symlink
/// climbs out of the link target the way the kernel does. Dangling symlinks
/// are replaced by their target. Missing components are kept as written.
fn canonicalize_lenient(path: &Path) -> PathBuf {
    resolve_components(path, 0)
}

fn resolve_components(path: &Path, hops: usize) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Popping past the root is a no-op, as in the kernel.
                resolved.pop();
            }
            Component::Normal(name) => {
                resolved.push(name);
                resolved = follow_existing(resolved, hops);
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
}

fn follow_existing(path: PathBuf, hops: usize) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match std::fs::read_link(&path) {
        Ok(target) if hops < MAX_SYMLINK_HOPS => {
            let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
            resolve_components(&base.join(target), hops + 1)
        }
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, Workspace) {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        (dir, ws)
    }

    #[test]
    fn test_open_creates_missing_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested/research_001");
        let ws = Workspace::open(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(ws.root(), root.canonicalize().unwrap());
    }

    #[test]
    fn test_new_without_create_leaves_disk_untouched() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("absent");
        let ws = Workspace::new(&root, false).unwrap();
        assert!(!root.exists());
        assert!(ws.is_within("data/x.txt"));
    }

    #[test]
    fn test_empty_root_rejected() {
        assert!(matches!(
            Workspace::open(""),
            Err(WorkspaceError::EmptyRoot)
        ));
    }

    #[test]
    fn test_traversal_is_rejected() {
        let (_dir, ws) = workspace();
        assert!(!ws.is_within("../../etc/passwd"));
        assert!(!ws.is_within("data/../../outside.txt"));
        assert!(!ws.is_within("/etc/passwd"));
    }

    #[test]
    fn test_paths_under_root_are_allowed() {
        let (_dir, ws) = workspace();
        assert!(ws.is_within("data/x.txt"));
        assert!(ws.is_within("a/b/../c.txt"));
        assert!(ws.is_within("."));
        assert!(ws.is_within(ws.root().join("report.md")));
    }

    #[test]
    fn test_absolute_path_with_parent_segments_is_checked_canonically() {
        let (_dir, ws) = workspace();
        let sneaky = ws.root().join("..").join("escape.txt");
        assert_eq!(ws.resolve(&sneaky), sneaky);
        assert!(!ws.is_within(&sneaky));
    }

    #[cfg(unix)]
    #[test]
    fn test_parent_segment_after_symlink_follows_link_target() {
        let (_dir, ws) = workspace();
        let outside = TempDir::new().unwrap();
        std::fs::create_dir(outside.path().join("a")).unwrap();
        std::fs::write(outside.path().join("secret.txt"), "x").unwrap();
        std::os::unix::fs::symlink(outside.path().join("a"), ws.root().join("link")).unwrap();

        let absolute = ws.root().join("link").join("..").join("secret.txt");
        assert!(!ws.is_within(&absolute));
        assert!(!ws.is_within("link/../secret.txt"));
        assert_eq!(
            ws.canonical(&absolute),
            outside.path().canonicalize().unwrap().join("secret.txt")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_is_checked_by_target() {
        let (_dir, ws) = workspace();
        let outside = TempDir::new().unwrap();
        let target = outside.path().canonicalize().unwrap().join("created.txt");
        std::os::unix::fs::symlink(&target, ws.root().join("dangling")).unwrap();

        assert!(!ws.is_within("dangling"));
        assert_eq!(ws.canonical("dangling"), target);
    }

    #[test]
    fn test_canonical_keeps_missing_tail() {
        let (_dir, ws) = workspace();
        assert_eq!(
            ws.canonical(ws.root().join("new/./dir/../file.txt")),
            ws.root().join("new/file.txt")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escaping_root_is_rejected() {
        let (_dir, ws) = workspace();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), ws.root().join("link")).unwrap();
        assert!(!ws.is_within("link/secret.txt"));
    }

    #[test]
    fn test_resolve_relative_joins_root() {
        let (_dir, ws) = workspace();
        assert_eq!(ws.resolve("notes/a.txt"), ws.root().join("notes/a.txt"));
    }

    #[test]
    fn test_relative_to() {
        let (_dir, ws) = workspace();
        let rel = ws.relative_to(ws.root().join("data/x.txt")).unwrap();
        assert_eq!(rel, PathBuf::from("data/x.txt"));

        let err = ws.relative_to("/etc/passwd").unwrap_err();
        assert!(matches!(err, WorkspaceError::PathOutsideWorkspace { .. }));
    }

    #[test]
    fn test_list_matching_returns_files_only() {
        let (_dir, ws) = workspace();
        std::fs::write(ws.root().join("a.txt"), "a").unwrap();
        std::fs::create_dir_all(ws.root().join("sub/dir.txt")).unwrap();
        std::fs::write(ws.root().join("sub/b.txt"), "b").unwrap();
        std::fs::write(ws.root().join("sub/c.md"), "c").unwrap();

        let top = ws.list_matching("*.txt", false).unwrap();
        assert_eq!(top, vec![ws.root().join("a.txt")]);

        let all = ws.list_matching("*.txt", true).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.contains(&ws.root().join("sub/b.txt")));
        assert!(!all.iter().any(|p| p.is_dir()));
    }

    #[test]
    fn test_create_subdirectory() {
        let (_dir, ws) = workspace();
        let created = ws.create_subdirectory("data/processed").unwrap();
        assert!(created.is_dir());
        assert!(ws.create_subdirectory("../elsewhere").is_err());
    }

    #[test]
    fn test_info_counts_entries() {
        let (_dir, ws) = workspace();
        std::fs::create_dir_all(ws.root().join("docs")).unwrap();
        std::fs::write(ws.root().join("docs/readme.md"), "x").unwrap();
        std::fs::write(ws.root().join("top.txt"), "y").unwrap();

        let info = ws.info();
        assert!(info.exists);
        assert!(info.is_directory);
        assert_eq!(info.total_files, 2);
        assert_eq!(info.total_directories, 1);
    }

    #[test]
    fn test_clear_requires_confirmation() {
        let (_dir, ws) = workspace();
        std::fs::create_dir_all(ws.root().join("docs")).unwrap();
        std::fs::write(ws.root().join("docs/readme.md"), "x").unwrap();

        assert!(matches!(
            ws.clear(false),
            Err(WorkspaceError::ClearNotConfirmed)
        ));
        assert!(ws.root().join("docs/readme.md").exists());

        ws.clear(true).unwrap();
        assert!(ws.root().is_dir());
        assert_eq!(ws.info().total_files, 0);
        assert_eq!(ws.info().total_directories, 0);
    }
}
