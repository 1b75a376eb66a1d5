//! Chunk writes to stored files
//!
//! Both primitives open the destination per call and flush before returning, so a
//! successful return means the bytes have been handed to the operating system. No fsync is
//! issued.

use crate::{FilesError, FilesResult};
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Writes payload bytes to stored files.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChunkWriter;

impl ChunkWriter {
    /// Creates `path`, replacing any existing content, and writes `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::Write`] if the parent directory is missing, permissions
    /// disallow the write, or the write itself fails.
    pub async fn create_and_write(&self, path: &Path, bytes: &[u8]) -> FilesResult<()> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        write_with(&options, path, bytes).await
    }

    /// Appends `bytes` to an existing file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::Write`] if the file does not exist or cannot be written.
    pub async fn append_write(&self, path: &Path, bytes: &[u8]) -> FilesResult<()> {
        let mut options = OpenOptions::new();
        options.append(true);
        write_with(&options, path, bytes).await
    }
}

async fn write_with(options: &OpenOptions, path: &Path, bytes: &[u8]) -> FilesResult<()> {
    let write_err = |source| FilesError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut file = options.open(path).await.map_err(write_err)?;
    file.write_all(bytes).await.map_err(write_err)?;
    file.flush().await.map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_then_append() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f1.txt");

        ChunkWriter.create_and_write(&path, b"hello ").await.unwrap();
        ChunkWriter.append_write(&path, b"world").await.unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_create_truncates_existing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f1.txt");
        fs::write(&path, b"a much longer previous body").unwrap();

        ChunkWriter.create_and_write(&path, b"short").await.unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"short");
    }

    #[tokio::test]
    async fn test_create_empty_payload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty");

        ChunkWriter.create_and_write(&path, b"").await.unwrap();

        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_create_missing_parent_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing").join("f1.txt");

        let result = ChunkWriter.create_and_write(&path, b"x").await;

        assert!(matches!(result, Err(FilesError::Write { .. })));
    }

    #[tokio::test]
    async fn test_append_requires_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("never-created");

        let result = ChunkWriter.append_write(&path, b"x").await;

        assert!(matches!(result, Err(FilesError::Write { .. })));
        assert!(!path.exists());
    }
}
