use crate::error::{OverseerError, Result};
use std::path::{Path, PathBuf};

/// The directory tree a guarded operation is allowed to mutate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationTarget {
    root: PathBuf,
}

impl MutationTarget {
    /// Canonicalise `path` and check it is a directory with a parent.
    pub fn open(path: &Path) -> Result<Self> {
        let root = path.canonicalize().map_err(|e| OverseerError::InvalidTarget {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !root.is_dir() {
            return Err(OverseerError::InvalidTarget {
                path: root,
                reason: "not a directory".to_string(),
            });
        }
        if root.parent().is_none() || root.file_name().is_none() {
            return Err(OverseerError::InvalidTarget {
                path: root,
                reason: "the filesystem root cannot be a target".to_string(),
            });
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn parent(&self) -> &Path {
        // open() guarantees a parent exists
        self.root.parent().unwrap_or(&self.root)
    }

    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// True if `path`, or its nearest existing ancestor, lies inside the target.
    pub fn contains(&self, path: &Path) -> bool {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            match std::env::current_dir() {
                Ok(cwd) => cwd.join(path),
                Err(_) => return false,
            }
        };

        let mut cursor = absolute.as_path();
        let mut suffix = Vec::new();
        loop {
            if let Ok(canonical) = cursor.canonicalize() {
                let resolved = suffix
                    .iter()
                    .rev()
                    .fold(canonical, |acc: PathBuf, part| acc.join(part));
                return resolved.starts_with(&self.root);
            }
            match (cursor.parent(), cursor.file_name()) {
                (Some(parent), Some(name)) => {
                    suffix.push(name.to_os_string());
                    cursor = parent;
                }
                _ => return false,
            }
        }
    }

    /// Fail if a storage location (`what`) would land inside the target.
    pub fn ensure_outside(&self, path: &Path, what: &str) -> Result<()> {
        if self.contains(path) {
            return Err(OverseerError::InvalidTarget {
                path: self.root.clone(),
                reason: format!("{what} {} lies inside the target tree", path.display()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_requires_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(
            MutationTarget::open(&file),
            Err(OverseerError::InvalidTarget { .. })
        ));
        assert!(MutationTarget::open(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn open_rejects_filesystem_root() {
        assert!(MutationTarget::open(Path::new("/")).is_err());
    }

    #[test]
    fn contains_handles_missing_paths() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("repo");
        std::fs::create_dir(&repo).unwrap();
        let target = MutationTarget::open(&repo).unwrap();

        assert!(target.contains(&repo.join("not/yet/created")));
        assert!(target.contains(&repo));
        assert!(!target.contains(&dir.path().join("backups")));
        assert!(!target.contains(&dir.path().join("repo-sibling")));
    }

    #[test]
    fn ensure_outside_rejects_nested_storage() {
        let dir = TempDir::new().unwrap();
        let target = MutationTarget::open(dir.path()).unwrap();
        let err = target
            .ensure_outside(&dir.path().join("backups"), "backup directory")
            .unwrap_err();
        assert!(err.to_string().contains("backup directory"));
    }

    #[test]
    fn name_and_parent() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("labs");
        std::fs::create_dir(&repo).unwrap();
        let target = MutationTarget::open(&repo).unwrap();
        assert_eq!(target.name(), "labs");
        assert_eq!(target.parent(), dir.path().canonicalize().unwrap());
    }
}
