//! Path jail — containment checks for reference resolution.
//!
//! Every `$ref` target must stay inside the configured root directory.
//! Containment is a component-wise prefix test on normalized absolute paths,
//! never a substring match, and existing paths are canonicalized before the
//! final check so symlinks cannot smuggle a read outside the root.

use std::path::{Component, Path, PathBuf};

use crate::error::ComposeError;

/// Lexically normalize an absolute path: fold `.` and `..` components without
/// touching the filesystem. `..` at the root stays at the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// The directory outside of which resolution must never read.
#[derive(Debug, Clone)]
pub struct PathJail {
    root: PathBuf,
}

impl PathJail {
    /// Build a jail rooted at `root`. The root must exist; it is
    /// canonicalized once so later prefix checks compare like with like.
    pub fn new(root: &Path) -> Result<Self, ComposeError> {
        let root = root
            .canonicalize()
            .map_err(|source| match source.kind() {
                std::io::ErrorKind::NotFound => ComposeError::NotFound {
                    path: root.to_path_buf(),
                },
                _ => ComposeError::Io {
                    path: root.to_path_buf(),
                    source,
                },
            })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check whether an already-normalized absolute path lies inside the root.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    /// Admit a candidate path for reading, or reject it.
    ///
    /// Existing paths are judged by their canonical form (symlinks resolved),
    /// so a link pointing outside the root is rejected no matter how its
    /// lexical form reads. Nonexistent paths are judged lexically, so an
    /// escaping `..` chain is a `SecurityViolation` rather than a `NotFound`.
    pub fn admit(&self, candidate: &Path) -> Result<PathBuf, ComposeError> {
        let lexical = normalize(candidate);
        match lexical.canonicalize() {
            Ok(canonical) => {
                if !self.contains(&canonical) {
                    return Err(ComposeError::SecurityViolation {
                        path: canonical,
                        root: self.root.clone(),
                    });
                }
                Ok(canonical)
            }
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                if !self.contains(&lexical) {
                    return Err(ComposeError::SecurityViolation {
                        path: lexical,
                        root: self.root.clone(),
                    });
                }
                Err(ComposeError::NotFound { path: lexical })
            }
            Err(source) => Err(ComposeError::Io {
                path: lexical,
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn normalize_folds_dot_and_dot_dot() {
        assert_eq!(
            normalize(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(normalize(Path::new("/a/../../b")), PathBuf::from("/b"));
    }

    #[test]
    fn admit_accepts_inside_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("wf.yaml");
        fs::write(&file, "kind: agent_workflow\n").unwrap();

        let jail = PathJail::new(dir.path()).unwrap();
        let admitted = jail.admit(&file).unwrap();
        assert!(admitted.starts_with(jail.root()));
    }

    #[test]
    fn admit_rejects_traversal_escape() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("inner");
        fs::create_dir(&inner).unwrap();
        fs::write(dir.path().join("secret.yaml"), "x: 1\n").unwrap();

        let jail = PathJail::new(&inner).unwrap();
        let escape = inner.join("../secret.yaml");
        let err = jail.admit(&escape).unwrap_err();
        assert!(matches!(err, ComposeError::SecurityViolation { .. }));
    }

    #[test]
    fn admit_rejects_nonexistent_escape_before_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("inner");
        fs::create_dir(&inner).unwrap();

        let jail = PathJail::new(&inner).unwrap();
        let escape = inner.join("../../does/not/exist.yaml");
        let err = jail.admit(&escape).unwrap_err();
        assert!(matches!(err, ComposeError::SecurityViolation { .. }));
    }

    #[test]
    fn admit_reports_missing_file_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let jail = PathJail::new(dir.path()).unwrap();
        let missing = dir.path().join("missing.yaml");
        let err = jail.admit(&missing).unwrap_err();
        assert!(matches!(err, ComposeError::NotFound { .. }));
    }
}
