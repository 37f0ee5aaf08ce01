//! Workspace path confinement.
//!
//! Every path-bearing tool resolves its input against a workspace root:
//! trim, normalize unicode spaces, strip a leading `@`, expand `~`, make
//! absolute, canonicalize symlinks, then reject anything that escapes the
//! root. The write tool may resolve still-missing terminal components.

use std::path::{Path, PathBuf};

use super::error::ToolError;

/// A configured workspace root that tools resolve paths against.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// A workspace rooted at `root`; an empty path means the current
    /// working directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The canonicalized workspace root.
    pub fn root(&self) -> Result<PathBuf, ToolError> {
        let raw = if self.root.as_os_str().is_empty() {
            std::env::current_dir().map_err(|e| ToolError::Failed(format!(
                "resolve working directory: {e}"
            )))?
        } else {
            self.root.clone()
        };
        std::fs::canonicalize(&raw)
            .map_err(|e| ToolError::Failed(format!("resolve workspace root {}: {e}", raw.display())))
    }

    /// Resolve `input` to a canonical path inside the workspace.
    pub fn resolve(&self, input: &str, allow_create: bool) -> Result<PathBuf, ToolError> {
        let raw = normalize_path_input(input);
        if raw.trim().is_empty() {
            return Err(ToolError::InvalidParams("path is required".to_string()));
        }

        let root = self.root()?;
        let candidate = if Path::new(&raw).is_absolute() {
            PathBuf::from(&raw)
        } else {
            root.join(&raw)
        };

        let resolved = canonicalize_allow_missing(&candidate, allow_create)
            .map_err(|e| ToolError::Failed(format!("resolve path {raw}: {e}")))?;

        if !resolved.starts_with(&root) {
            return Err(ToolError::PathOutsideWorkspace {
                path: raw,
                workspace: root,
            });
        }
        Ok(resolved)
    }
}

/// Trim, unify unicode spaces, strip a leading `@`, and expand `~`.
fn normalize_path_input(input: &str) -> String {
    let trimmed: String = input
        .trim()
        .chars()
        .map(|c| match c {
            '\u{00A0}' | '\u{2000}'..='\u{200A}' | '\u{202F}' | '\u{205F}' | '\u{3000}' => ' ',
            other => other,
        })
        .collect();

    let stripped = trimmed.strip_prefix('@').unwrap_or(&trimmed);

    if stripped == "~" {
        if let Some(home) = home_dir() {
            return home;
        }
        return stripped.to_string();
    }
    if let Some(rest) = stripped.strip_prefix("~/") {
        if let Some(home) = home_dir() {
            return Path::new(&home).join(rest).to_string_lossy().into_owned();
        }
    }
    stripped.to_string()
}

fn home_dir() -> Option<String> {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()
        .filter(|home| !home.trim().is_empty())
}

/// Canonicalize a path, optionally tolerating missing trailing components
/// (peeled off and re-joined after the existing prefix resolves).
fn canonicalize_allow_missing(path: &Path, allow_create: bool) -> std::io::Result<PathBuf> {
    if !allow_create {
        return std::fs::canonicalize(path);
    }

    let mut missing: Vec<std::ffi::OsString> = Vec::new();
    let mut probe = path.to_path_buf();
    loop {
        match std::fs::canonicalize(&probe) {
            Ok(resolved) => {
                let mut out = resolved;
                for component in missing.iter().rev() {
                    out.push(component);
                }
                return Ok(out);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let Some(parent) = probe.parent() else {
                    return Err(e);
                };
                let Some(name) = probe.file_name() else {
                    return Err(e);
                };
                missing.push(name.to_os_string());
                let parent = parent.to_path_buf();
                probe = parent;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn resolves_relative_path_inside_workspace() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("file.txt"), "x").unwrap();
        let workspace = Workspace::new(dir.path());

        let resolved = workspace.resolve("file.txt", false).unwrap();
        assert!(resolved.ends_with("file.txt"));
        assert!(resolved.starts_with(workspace.root().unwrap()));
    }

    #[test]
    fn rejects_escape_via_dotdot() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(dir.path());

        let err = workspace.resolve("../outside.txt", true).unwrap_err();
        assert!(matches!(err, ToolError::PathOutsideWorkspace { .. }));
    }

    #[test]
    fn rejects_absolute_path_outside_workspace() {
        let inside = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let target = outside.path().join("secret.txt");
        std::fs::write(&target, "x").unwrap();

        let workspace = Workspace::new(inside.path());
        let err = workspace
            .resolve(target.to_str().unwrap(), false)
            .unwrap_err();
        assert!(matches!(err, ToolError::PathOutsideWorkspace { .. }));
    }

    #[test]
    fn allow_create_resolves_missing_components() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(dir.path());

        let resolved = workspace.resolve("new/nested/file.txt", true).unwrap();
        assert!(resolved.ends_with("new/nested/file.txt"));
        assert!(resolved.starts_with(workspace.root().unwrap()));
    }

    #[test]
    fn missing_file_without_allow_create_fails() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(dir.path());
        let err = workspace.resolve("absent.txt", false).unwrap_err();
        assert!(matches!(err, ToolError::Failed(_)));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink_escaping_workspace() {
        let inside = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let target = outside.path().join("real.txt");
        std::fs::write(&target, "x").unwrap();
        std::os::unix::fs::symlink(&target, inside.path().join("link.txt")).unwrap();

        let workspace = Workspace::new(inside.path());
        let err = workspace.resolve("link.txt", false).unwrap_err();
        assert!(matches!(err, ToolError::PathOutsideWorkspace { .. }));
    }

    #[test]
    fn strips_at_prefix() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("tagged.txt"), "x").unwrap();
        let workspace = Workspace::new(dir.path());
        let resolved = workspace.resolve("@tagged.txt", false).unwrap();
        assert!(resolved.ends_with("tagged.txt"));
    }

    #[test]
    fn empty_path_is_rejected() {
        let workspace = Workspace::new(TempDir::new().unwrap().path());
        assert!(matches!(
            workspace.resolve("   ", false),
            Err(ToolError::InvalidParams(_))
        ));
    }
}
