//! Filesystem root discovery.
//!
//! The chain store and the engine's key tables are scoped to a mounted
//! filesystem, so every command first maps its path argument to the mount
//! root: canonicalize, then walk up until the parent directory sits on a
//! different device. Where a mount table is available the filesystem type is
//! verified, unless the caller asked to ignore it.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use keyfs_core::{KeyfsError, KeyfsResult};

/// Filesystem type the driver registers under.
pub const FS_TYPE: &str = "keyfs";

pub fn resolve_fs_root(path: &Path, ignore_type: bool) -> KeyfsResult<PathBuf> {
    let start = path.canonicalize().map_err(|e| {
        KeyfsError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {e}", path.display()),
        ))
    })?;
    let meta = std::fs::metadata(&start)?;
    let dev = meta.dev();

    let mut root = if meta.is_dir() {
        start.clone()
    } else {
        start.parent().unwrap_or(&start).to_path_buf()
    };
    while let Some(parent) = root.parent() {
        if std::fs::metadata(parent)?.dev() != dev {
            break;
        }
        root = parent.to_path_buf();
    }

    if !ignore_type {
        check_fs_type(&root)?;
    }
    Ok(root)
}

fn check_fs_type(root: &Path) -> KeyfsResult<()> {
    // /proc/self/mounts: device mountpoint fstype options ...
    let Ok(mounts) = std::fs::read_to_string("/proc/self/mounts") else {
        // No mount table (non-Linux); leave type enforcement to the engine.
        return Ok(());
    };
    for line in mounts.lines() {
        let mut fields = line.split_whitespace();
        let _device = fields.next();
        let (Some(mountpoint), Some(fstype)) = (fields.next(), fields.next()) else {
            continue;
        };
        if Path::new(mountpoint) == root {
            if fstype == FS_TYPE {
                return Ok(());
            }
            return Err(KeyfsError::WrongType(format!(
                "{} is mounted as {fstype}",
                root.display()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_path_is_io_error() {
        assert!(matches!(
            resolve_fs_root(Path::new("/nonexistent/keyfs/path"), true),
            Err(KeyfsError::Io(_))
        ));
    }

    #[test]
    fn test_resolves_to_an_existing_ancestor_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.bin");
        std::fs::write(&file, b"x").unwrap();

        let root = resolve_fs_root(&file, true).unwrap();
        assert!(root.is_dir());
        assert!(dir.path().canonicalize().unwrap().starts_with(&root));
    }

    #[test]
    fn test_file_and_directory_share_a_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.bin");
        std::fs::write(&file, b"x").unwrap();

        let from_dir = resolve_fs_root(dir.path(), true).unwrap();
        let from_file = resolve_fs_root(&file, true).unwrap();
        assert_eq!(from_dir, from_file);
    }
}
