//! Filesystem helpers shared by the fetchers and the output writers.
//!
//! These wrap `std::fs` with context-rich errors; none of them are atomic,
//! matching the fact that every on-disk slot is owned by exactly one caller
//! at a time (the clone cache single-flights writers, the CLI serializes
//! component/config writes).

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Ensures `path` exists as a directory, creating parents as needed.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create directory {}", path.display()))?;
    }
    Ok(())
}

/// Removes a directory tree if it exists; missing directories are not an
/// error.
pub fn remove_dir_idempotent(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => {
            Err(err).with_context(|| format!("failed to remove directory {}", path.display()))
        }
    }
}

/// Recursively copies `src` into `dst`, creating `dst` as needed.
///
/// Symlinks and other special file types are skipped.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    ensure_dir(dst)?;

    for entry in
        fs::read_dir(src).with_context(|| format!("failed to read directory {}", src.display()))?
    {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if file_type.is_dir() {
            copy_dir(&src_path, &dst_path)?;
        } else if file_type.is_file() {
            fs::copy(&src_path, &dst_path).with_context(|| {
                format!(
                    "failed to copy {} to {}",
                    src_path.display(),
                    dst_path.display()
                )
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn copy_dir_is_recursive() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();

        fs::create_dir_all(src.path().join("nested/deep")).unwrap();
        fs::write(src.path().join("top.txt"), "top").unwrap();
        fs::write(src.path().join("nested/deep/leaf.txt"), "leaf").unwrap();

        let target = dst.path().join("out");
        copy_dir(src.path(), &target).unwrap();

        assert_eq!(fs::read_to_string(target.join("top.txt")).unwrap(), "top");
        assert_eq!(
            fs::read_to_string(target.join("nested/deep/leaf.txt")).unwrap(),
            "leaf"
        );
    }

    #[test]
    fn remove_dir_idempotent_tolerates_missing() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("not-there");
        remove_dir_idempotent(&missing).unwrap();

        let present = dir.path().join("there");
        fs::create_dir(&present).unwrap();
        fs::write(present.join("file"), "x").unwrap();
        remove_dir_idempotent(&present).unwrap();
        assert!(!present.exists());
    }
}
