//! Atomic file replacement.

use std::io::Write;
use std::path::{Path, PathBuf};

/// Write `contents` to `target` via a temporary file in the same directory,
/// then rename it over the target. Readers see either the old document or
/// the new one, never a partial write.
pub async fn write_atomic(target: &Path, contents: Vec<u8>) -> std::io::Result<()> {
    let target: PathBuf = target.to_path_buf();
    let dir = target
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    tokio::task::spawn_blocking(move || {
        let mut tmp = tempfile::Builder::new()
            .prefix(".runbook-")
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        tmp.write_all(&contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok::<(), std::io::Error>(())
    })
    .await
    .map_err(std::io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn writes_new_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_atomic(&path, b"{}".to_vec()).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "{}");
    }

    #[tokio::test]
    async fn replaces_existing_file_without_leftovers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_atomic(&path, b"old".to_vec()).await.unwrap();
        write_atomic(&path, b"new".to_vec()).await.unwrap();

        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "new");
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent").join("doc.json");
        assert!(write_atomic(&path, b"x".to_vec()).await.is_err());
    }
}
