use crate::error::{OverseerError, Result};
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Prevents partial writes from corrupting state files.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tree copy
// ---------------------------------------------------------------------------

/// Totals reported by [`copy_tree`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: u64,
    pub bytes: u64,
}

/// Recursively copy the contents of `src` into `dst` (which must exist).
///
/// Symlinks are recreated as links rather than followed. Directory
/// permissions are applied after their children so read-only directories
/// can still be populated. If `deadline` passes before the copy finishes
/// the call fails with `SnapshotIo`; the caller owns cleanup of `dst`.
pub fn copy_tree(src: &Path, dst: &Path, deadline: Option<Instant>) -> Result<CopyStats> {
    let mut stats = CopyStats::default();
    let mut dirs = Vec::new();

    for entry in WalkDir::new(src).follow_links(false).min_depth(1) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(OverseerError::SnapshotIo(format!(
                "copy of {} timed out",
                src.display()
            )));
        }
        let entry = entry.map_err(|e| OverseerError::SnapshotIo(e.to_string()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| OverseerError::SnapshotIo(e.to_string()))?;
        let dest = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            let link = std::fs::read_link(entry.path())?;
            copy_symlink(&link, entry.path(), &dest)?;
            stats.files += 1;
        } else if file_type.is_dir() {
            std::fs::create_dir(&dest)?;
            let perms = entry
                .metadata()
                .map_err(|e| OverseerError::SnapshotIo(e.to_string()))?
                .permissions();
            dirs.push((dest, perms));
        } else {
            stats.bytes += std::fs::copy(entry.path(), &dest)?;
            stats.files += 1;
        }
    }

    // Deepest directories first.
    for (dir, perms) in dirs.into_iter().rev() {
        std::fs::set_permissions(&dir, perms)?;
    }
    Ok(stats)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, _original: &Path, dest: &Path) -> Result<()> {
    std::os::unix::fs::symlink(link, dest)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(_link: &Path, original: &Path, dest: &Path) -> Result<()> {
    if original.is_dir() {
        std::fs::create_dir_all(dest)?;
    } else {
        std::fs::copy(original, dest)?;
    }
    Ok(())
}

/// Remove every entry inside `dir`, leaving `dir` itself in place.
pub fn clear_dir(dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            make_writable(&path)?;
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Remove `dir` and everything under it, read-only subdirectories included.
pub fn remove_tree(dir: &Path) -> Result<()> {
    make_writable(dir)?;
    std::fs::remove_dir_all(dir)?;
    Ok(())
}

/// Read-only directories cannot have children removed; open them up first.
fn make_writable(dir: &Path) -> Result<()> {
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| OverseerError::Io(e.into()))?;
        if entry.file_type().is_dir() {
            let mut perms = std::fs::metadata(entry.path())?.permissions();
            if perms.readonly() {
                perms.set_readonly(false);
                std::fs::set_permissions(entry.path(), perms)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.yaml");
        atomic_write(&path, b"hello: world").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello: world");
    }

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c/test.yaml");
        atomic_write(&path, b"data").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn atomic_write_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("existing.txt");
        std::fs::write(&path, b"old").unwrap();
        atomic_write(&path, b"new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn copy_tree_copies_nested_files() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        std::fs::create_dir_all(src.path().join("a/b")).unwrap();
        std::fs::create_dir_all(src.path().join("empty")).unwrap();
        std::fs::write(src.path().join("top.txt"), "top").unwrap();
        std::fs::write(src.path().join("a/b/deep.txt"), "deep").unwrap();

        let stats = copy_tree(src.path(), dst.path(), None).unwrap();
        assert_eq!(stats.files, 2);
        assert_eq!(stats.bytes, 7);
        assert_eq!(
            std::fs::read_to_string(dst.path().join("a/b/deep.txt")).unwrap(),
            "deep"
        );
        assert!(dst.path().join("empty").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn copy_tree_preserves_symlinks() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        std::fs::write(src.path().join("real.txt"), "x").unwrap();
        std::os::unix::fs::symlink("real.txt", src.path().join("link.txt")).unwrap();

        copy_tree(src.path(), dst.path(), None).unwrap();
        let link = dst.path().join("link.txt");
        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_link(&link).unwrap(), Path::new("real.txt"));
    }

    #[test]
    fn copy_tree_honours_expired_deadline() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        std::fs::write(src.path().join("f.txt"), "x").unwrap();
        let past = Instant::now() - std::time::Duration::from_secs(1);
        let err = copy_tree(src.path(), dst.path(), Some(past)).unwrap_err();
        assert!(matches!(err, OverseerError::SnapshotIo(m) if m.contains("timed out")));
    }

    #[test]
    fn clear_dir_keeps_root() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("sub/inner")).unwrap();
        std::fs::write(dir.path().join("sub/inner/f"), "x").unwrap();
        std::fs::write(dir.path().join("g"), "y").unwrap();

        clear_dir(dir.path()).unwrap();
        assert!(dir.path().is_dir());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
