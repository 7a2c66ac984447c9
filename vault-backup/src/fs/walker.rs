//! Directory traversal for copying and measuring state trees.

use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Count regular files under `root` and their total size.
pub fn tree_stats(root: &Path) -> io::Result<(usize, u64)> {
    let mut files = 0usize;
    let mut bytes = 0u64;

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() {
            files += 1;
            bytes += entry.metadata()?.len();
        }
    }

    Ok((files, bytes))
}

/// Recursively copy `src` into `dst`, creating `dst`. Symlinks are
/// recreated, not followed. Returns the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<usize> {
    let mut copied = 0;
    fs::create_dir_all(dst)?;

    for entry in WalkDir::new(src).follow_links(false).min_depth(1) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    let link = fs::read_link(src)?;
    std::os::unix::fs::symlink(link, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst).map(|_| ())
}

/// Remove a file or a directory tree; a missing path is not an error.
pub fn remove_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tree_stats_empty_directory() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        assert_eq!(tree_stats(temp_dir.path())?, (0, 0));
        Ok(())
    }

    #[test]
    fn test_tree_stats_with_subdirectories() -> io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("file1.txt"), b"12345")?;
        fs::write(temp_dir.path().join("subdir/file2.txt"), b"1234567")?;

        assert_eq!(tree_stats(temp_dir.path())?, (2, 12));
        Ok(())
    }

    #[test]
    fn test_copy_tree() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");

        fs::create_dir_all(src.join("a/b"))?;
        fs::create_dir(src.join("empty"))?;
        fs::write(src.join("top.bin"), b"top")?;
        fs::write(src.join("a/b/deep.bin"), b"deep")?;

        assert_eq!(copy_tree(&src, &dst)?, 2);
        assert_eq!(fs::read(dst.join("top.bin"))?, b"top");
        assert_eq!(fs::read(dst.join("a/b/deep.bin"))?, b"deep");
        assert!(dst.join("empty").is_dir());
        Ok(())
    }

    #[test]
    fn test_remove_path() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let dir = temp_dir.path().join("dir");
        let file = temp_dir.path().join("file");
        fs::create_dir_all(dir.join("nested"))?;
        fs::write(dir.join("nested/x"), b"x")?;
        fs::write(&file, b"y")?;

        remove_path(&dir)?;
        remove_path(&file)?;
        remove_path(&temp_dir.path().join("missing"))?;

        assert!(!dir.exists());
        assert!(!file.exists());
        Ok(())
    }
}
