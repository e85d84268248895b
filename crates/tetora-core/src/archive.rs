//! Restore path-safety utility (spec §6 "Backup archive format", §8
//! testable property 5).
//!
//! Full backup/restore is an out-of-scope persistence feature; what is
//! specified here is the one piece of logic whose correctness the test
//! suite must verify independent of any concrete archive reader: given the
//! restore root and a tar entry's path, compute where it would land on disk
//! and refuse anything that would escape the root.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("entry path escapes restore root: {0}")]
    PathTraversal(String),

    #[error("entry path is absolute: {0}")]
    AbsolutePath(String),
}

/// Resolve `entry_path` (as read from a tar header) against `root`, rejecting
/// any path that would normalize to something outside `root`.
///
/// Entries are rejected, not silently clamped: `..` components and absolute
/// paths both abort the *single entry* before anything is written, matching
/// spec §6's "reject `..` and absolute escape" and §8 scenario G ("Error
/// returned before any file written; target directory unchanged").
pub fn safe_extract_path(root: &Path, entry_path: &str) -> Result<PathBuf, ArchiveError> {
    let rel = Path::new(entry_path);

    if rel.is_absolute() {
        return Err(ArchiveError::AbsolutePath(entry_path.to_string()));
    }

    let mut resolved = root.to_path_buf();
    for component in rel.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(ArchiveError::PathTraversal(entry_path.to_string()));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::AbsolutePath(entry_path.to_string()));
            }
        }
    }

    // Belt-and-suspenders: even if component-walking above let something
    // through, confirm the final path is still rooted under `root`.
    if !resolved.starts_with(root) {
        return Err(ArchiveError::PathTraversal(entry_path.to_string()));
    }

    Ok(resolved)
}

/// Excluded top-level path prefixes for the backup archive, per spec §6.
pub const BACKUP_EXCLUDED_PREFIXES: &[&str] =
    &["bin/", "outputs/", "logs/", "backups/", "mcp/"];

/// Included top-level paths for the backup archive, per spec §6.
pub const BACKUP_INCLUDED_PATHS: &[&str] =
    &["config.json", "jobs.json", "history.db", "prompts/", "knowledge/", "souls/"];

/// Whether a top-level archive entry name should be included in a backup,
/// per spec §6's include/exclude lists (dot-prefixed paths other than `.`
/// itself are excluded; `*.tar.gz` and `*.backup.*` are excluded anywhere).
pub fn should_include_in_backup(name: &str) -> bool {
    if name == "." {
        return true;
    }
    if name.starts_with('.') {
        return false;
    }
    if name.ends_with(".tar.gz") || name.contains(".backup.") {
        return false;
    }
    if BACKUP_EXCLUDED_PREFIXES.iter().any(|p| name.starts_with(p)) {
        return false;
    }
    if name.starts_with("SOUL") && name.ends_with(".md") {
        return true;
    }
    BACKUP_INCLUDED_PATHS
        .iter()
        .any(|p| name == *p || name.starts_with(p))
}
