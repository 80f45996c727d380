//! File-tree copy used to move build output into the runtime image.

use filetime::FileTime;
use shiplite_shared::errors::{ShipliteError, ShipliteResult};
use std::path::Path;
use walkdir::WalkDir;

/// Recursively copy `src` into `dst`, preserving modification times.
///
/// Symlinks are recreated, not followed. Returns the number of regular
/// files copied.
pub fn copy_tree(src: &Path, dst: &Path) -> ShipliteResult<u64> {
    let mut copied = 0;

    for entry in WalkDir::new(src) {
        let entry = entry.map_err(std::io::Error::from)?;
        let rel = entry.path().strip_prefix(src).map_err(|_| {
            ShipliteError::Internal(format!("walked outside of {}", src.display()))
        })?;
        let target = dst.join(rel);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link = std::fs::read_link(entry.path())?;
            if target.symlink_metadata().is_ok() {
                std::fs::remove_file(&target)?;
            }
            std::os::unix::fs::symlink(&link, &target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
            let metadata = entry.metadata().map_err(std::io::Error::from)?;
            filetime::set_file_mtime(&target, FileTime::from_last_modification_time(&metadata))?;
            copied += 1;
        }
    }

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn copies_nested_trees_and_mtimes() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        std::fs::create_dir_all(src.join("a/b")).unwrap();
        std::fs::write(src.join("top.txt"), "top").unwrap();
        std::fs::write(src.join("a/b/deep.txt"), "deep").unwrap();
        filetime::set_file_mtime(src.join("top.txt"), FileTime::from_unix_time(1_500_000_000, 0))
            .unwrap();

        let dst = temp.path().join("dst");
        let copied = copy_tree(&src, &dst).unwrap();

        assert_eq!(copied, 2);
        assert_eq!(std::fs::read_to_string(dst.join("a/b/deep.txt")).unwrap(), "deep");
        let meta = std::fs::metadata(dst.join("top.txt")).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta).unix_seconds(), 1_500_000_000);
    }

    #[test]
    fn recreates_symlinks() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("real.so"), "elf").unwrap();
        std::os::unix::fs::symlink("real.so", src.join("alias.so")).unwrap();

        let dst = temp.path().join("dst");
        copy_tree(&src, &dst).unwrap();

        let link = std::fs::read_link(dst.join("alias.so")).unwrap();
        assert_eq!(link.to_str().unwrap(), "real.so");
    }
}
