//! Workspace sandbox.
//!
//! Every filesystem path an operation touches goes through [`PathGuard`]
//! right before it is opened. The guard enforces two rules:
//!
//! 1. Containment: after lexical normalization the path must live under the
//!    workspace root. A path whose existing prefix resolves (through
//!    symlinks) outside the root is rejected as well.
//! 2. Write permission: an existing regular file requested for writing must
//!    be writable by the current process (`access(2)` with `W_OK`) and carry
//!    at least one write bit. Files that do not exist yet only need a
//!    contained parent directory.
//!
//! Nothing stronger is attempted: no chroot, no quotas, no extension
//! allow-list.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use nix::unistd::{access, AccessFlags};
use tracing::warn;

/// What the caller intends to do with a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessIntent {
    Read,
    Write,
}

impl fmt::Display for AccessIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessIntent::Read => f.write_str("read"),
            AccessIntent::Write => f.write_str("write"),
        }
    }
}

/// Why a path was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    OutsideWorkspace,
    InsufficientPermission,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::OutsideWorkspace => f.write_str("outside workspace"),
            DenyReason::InsufficientPermission => f.write_str("insufficient permission"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("access denied for `{path}`: {reason}")]
pub struct AccessDenied {
    pub path: String,
    pub reason: DenyReason,
}

/// Validates paths against a fixed workspace root.
///
/// Cheap to clone; holds no open handles and never touches the filesystem
/// beyond `stat`/`canonicalize` lookups.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
    canonical_root: PathBuf,
}

impl PathGuard {
    /// Creates a guard rooted at `root`, which must be an existing absolute
    /// directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_absolute() {
            bail!("workspace root must be an absolute path: {}", root.display());
        }
        let Some(root) = normalize(root) else {
            bail!("workspace root escapes the filesystem root: {}", root.display());
        };
        if !root.is_dir() {
            bail!("workspace root is not a directory: {}", root.display());
        }
        let canonical_root = std::fs::canonicalize(&root)
            .with_context(|| format!("cannot resolve workspace root {}", root.display()))?;

        Ok(Self {
            root,
            canonical_root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Checks `raw` for the given intent and returns its normalized absolute
    /// form. Relative paths are taken relative to the workspace root.
    pub fn validate(
        &self,
        raw: impl AsRef<Path>,
        intent: AccessIntent,
    ) -> Result<PathBuf, AccessDenied> {
        let raw = raw.as_ref();
        let joined = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.root.join(raw)
        };

        let Some(path) = normalize(&joined) else {
            return Err(self.deny(raw, DenyReason::OutsideWorkspace));
        };
        if !path.starts_with(&self.root) || !self.resolves_inside(&path) {
            return Err(self.deny(raw, DenyReason::OutsideWorkspace));
        }

        if intent == AccessIntent::Write {
            // The root itself is never a write target: its parent is outside.
            let parent_contained = path.parent().is_some_and(|p| p.starts_with(&self.root));
            if !parent_contained {
                return Err(self.deny(raw, DenyReason::OutsideWorkspace));
            }
            if let Ok(meta) = std::fs::metadata(&path) {
                // Root passes access(2) on any file, so the mode bits count too
                let writable = !meta.permissions().readonly()
                    && access(&path, AccessFlags::W_OK).is_ok();
                if meta.is_file() && !writable {
                    return Err(self.deny(raw, DenyReason::InsufficientPermission));
                }
            }
        }

        Ok(path)
    }

    /// True when the deepest existing ancestor of `path` canonicalizes to a
    /// location under the canonical root.
    fn resolves_inside(&self, path: &Path) -> bool {
        let Some(existing) = path.ancestors().find(|p| p.symlink_metadata().is_ok()) else {
            return false;
        };
        // A dangling symlink fails to canonicalize and is refused.
        std::fs::canonicalize(existing)
            .map(|resolved| resolved.starts_with(&self.canonical_root))
            .unwrap_or(false)
    }

    fn deny(&self, raw: &Path, reason: DenyReason) -> AccessDenied {
        warn!("Access denied for {}: {reason}", raw.display());
        AccessDenied {
            path: raw.display().to_string(),
            reason,
        }
    }
}

/// Lexically resolves `.` and `..` without consulting the filesystem.
/// Returns `None` when `..` would climb above the filesystem root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> (tempfile::TempDir, PathGuard) {
        let dir = tempfile::tempdir().unwrap();
        let guard = PathGuard::new(dir.path()).unwrap();
        (dir, guard)
    }

    // ── normalize ────────────────────────────────────────

    #[test]
    fn test_normalize_resolves_dots() {
        assert_eq!(
            normalize(Path::new("/data/./a/../b.txt")),
            Some(PathBuf::from("/data/b.txt"))
        );
    }

    #[test]
    fn test_normalize_rejects_climb_past_root() {
        // `..` directly under `/` has nothing left to pop
        assert_eq!(normalize(Path::new("/../../etc")), None);
    }

    // ── construction ─────────────────────────────────────

    #[test]
    fn test_new_rejects_relative_root() {
        assert!(PathGuard::new("data").is_err());
    }

    #[test]
    fn test_new_rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PathGuard::new(dir.path().join("missing")).is_err());
    }

    // ── containment ──────────────────────────────────────

    #[test]
    fn test_relative_path_is_joined_to_root() {
        let (dir, guard) = workspace();
        let path = guard.validate("dates.txt", AccessIntent::Read).unwrap();
        assert_eq!(path, dir.path().join("dates.txt"));
    }

    #[test]
    fn test_absolute_path_inside_root() {
        let (dir, guard) = workspace();
        let inside = dir.path().join("docs/a.md");
        assert_eq!(guard.validate(&inside, AccessIntent::Read).unwrap(), inside);
    }

    #[test]
    fn test_dot_segments_normalized_inside_root() {
        let (dir, guard) = workspace();
        let path = guard
            .validate("sub/./a/../b.txt", AccessIntent::Read)
            .unwrap();
        assert_eq!(path, dir.path().join("sub/b.txt"));
    }

    #[test]
    fn test_parent_traversal_denied() {
        let (_dir, guard) = workspace();
        for raw in ["../secret", "sub/../../secret", "./../../../../etc/passwd"] {
            for intent in [AccessIntent::Read, AccessIntent::Write] {
                let err = guard.validate(raw, intent).unwrap_err();
                assert_eq!(err.reason, DenyReason::OutsideWorkspace, "{raw}");
            }
        }
    }

    #[test]
    fn test_absolute_path_outside_denied() {
        let (_dir, guard) = workspace();
        let err = guard.validate("/etc/passwd", AccessIntent::Read).unwrap_err();
        assert_eq!(err.reason, DenyReason::OutsideWorkspace);
        assert!(err.to_string().contains("outside workspace"));
    }

    #[test]
    fn test_sibling_with_shared_prefix_denied() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("ws");
        std::fs::create_dir(&root).unwrap();
        std::fs::create_dir(parent.path().join("ws-evil")).unwrap();
        let guard = PathGuard::new(&root).unwrap();

        let sibling = parent.path().join("ws-evil/file.txt");
        assert!(guard.validate(&sibling, AccessIntent::Read).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_denied() {
        let (dir, guard) = workspace();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "s3cret").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let err = guard
            .validate("link/secret.txt", AccessIntent::Read)
            .unwrap_err();
        assert_eq!(err.reason, DenyReason::OutsideWorkspace);
        // New files beneath the link would land outside as well
        assert!(guard.validate("link/new.txt", AccessIntent::Write).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_within_root_allowed() {
        let (dir, guard) = workspace();
        std::fs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("alias")).unwrap();
        assert!(guard.validate("alias/file.txt", AccessIntent::Write).is_ok());
    }

    // ── write permission ─────────────────────────────────

    #[test]
    fn test_readonly_file_write_denied_read_allowed() {
        let (dir, guard) = workspace();
        let file = dir.path().join("locked.txt");
        std::fs::write(&file, "x").unwrap();
        let mut perms = std::fs::metadata(&file).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&file, perms).unwrap();

        let err = guard.validate("locked.txt", AccessIntent::Write).unwrap_err();
        assert_eq!(err.reason, DenyReason::InsufficientPermission);
        assert!(err.to_string().contains("insufficient permission"));
        assert!(guard.validate("locked.txt", AccessIntent::Read).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_not_writable_by_owner_denied() {
        use std::os::unix::fs::PermissionsExt;

        if nix::unistd::geteuid().is_root() {
            return;
        }
        let (dir, guard) = workspace();
        let file = dir.path().join("shared.txt");
        std::fs::write(&file, "x").unwrap();
        // Group and others may write, the owning process may not
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o466)).unwrap();
        assert!(!std::fs::metadata(&file).unwrap().permissions().readonly());

        let err = guard.validate("shared.txt", AccessIntent::Write).unwrap_err();
        assert_eq!(err.reason, DenyReason::InsufficientPermission);
        assert!(guard.validate("shared.txt", AccessIntent::Read).is_ok());
    }

    #[test]
    fn test_writable_existing_file_allowed() {
        let (dir, guard) = workspace();
        std::fs::write(dir.path().join("out.txt"), "x").unwrap();
        assert!(guard.validate("out.txt", AccessIntent::Write).is_ok());
    }

    #[test]
    fn test_new_file_write_allowed() {
        let (_dir, guard) = workspace();
        assert!(guard.validate("new.txt", AccessIntent::Write).is_ok());
        assert!(guard
            .validate("nested/dir/new.txt", AccessIntent::Write)
            .is_ok());
    }

    #[test]
    fn test_root_itself_not_writable() {
        let (dir, guard) = workspace();
        assert!(guard.validate(dir.path(), AccessIntent::Read).is_ok());
        assert!(guard.validate(dir.path(), AccessIntent::Write).is_err());
        assert!(guard.validate(".", AccessIntent::Write).is_err());
    }
}
