//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{FileMetadata, FileSystemAccess},
};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Tokio-based file system implementation
///
/// Appends are followed by `sync_data` so that cache rows and ledger rows are
/// on disk before the call returns.
pub struct TokioFileSystem {
    data_dir: PathBuf,
}

impl TokioFileSystem {
    /// Create a new file system accessor using the platform data directory
    pub fn new() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".local")
                    .join("share")
            })
            .join("creative-flow");

        Self { data_dir }
    }

    /// Create a new file system accessor rooted at a custom data directory
    pub fn with_data_directory(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Convert std::io::Error to BridgeError
    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }

    async fn ensure_parent(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                self.create_dir_all(parent).await?;
            }
        }
        Ok(())
    }
}

impl Default for TokioFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn get_data_directory(&self) -> Result<PathBuf> {
        if !self.data_dir.exists() {
            fs::create_dir_all(&self.data_dir)
                .await
                .map_err(Self::map_io_error)?;
            debug!(path = ?self.data_dir, "Created data directory");
        }
        Ok(self.data_dir.clone())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(Self::map_io_error)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path).await.map_err(Self::map_io_error)?;

        Ok(FileMetadata {
            size: metadata.len(),
            created_at: metadata
                .created()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64),
            modified_at: metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64),
            is_directory: metadata.is_dir(),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(Self::map_io_error)?;
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, size = data.len(), "Read file");
        Ok(Bytes::from(data))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        self.ensure_parent(path).await?;

        fs::write(path, data.as_ref())
            .await
            .map_err(Self::map_io_error)?;
        debug!(path = ?path, size = data.len(), "Wrote file");
        Ok(())
    }

    async fn append_file(&self, path: &Path, data: Bytes) -> Result<()> {
        self.ensure_parent(path).await?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(Self::map_io_error)?;

        file.write_all(data.as_ref())
            .await
            .map_err(Self::map_io_error)?;
        file.flush().await.map_err(Self::map_io_error)?;
        file.sync_data().await.map_err(Self::map_io_error)?;

        debug!(path = ?path, size = data.len(), "Appended to file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_custom_data_directory_is_created() {
        let root = tempdir().unwrap();
        let data = root.path().join("nested").join("data");
        let fs = TokioFileSystem::with_data_directory(data.clone());

        let dir = fs.get_data_directory().await.unwrap();
        assert_eq!(dir, data);
        assert!(fs.exists(&data).await.unwrap());
    }

    #[tokio::test]
    async fn test_append_creates_parent_and_accumulates() {
        let root = tempdir().unwrap();
        let fs = TokioFileSystem::with_data_directory(root.path().to_path_buf());
        let path = root.path().join("logs").join("ledger.jsonl");

        fs.append_file(&path, Bytes::from("first\n")).await.unwrap();
        fs.append_file(&path, Bytes::from("second\n")).await.unwrap();

        let contents = fs.read_file(&path).await.unwrap();
        assert_eq!(contents, Bytes::from("first\nsecond\n"));
    }

    #[tokio::test]
    async fn test_missing_file_does_not_exist() {
        let root = tempdir().unwrap();
        let fs = TokioFileSystem::with_data_directory(root.path().to_path_buf());

        assert!(!fs.exists(&root.path().join("nope.mp4")).await.unwrap());
        assert!(fs.metadata(&root.path().join("nope.mp4")).await.is_err());
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let root = tempdir().unwrap();
        let fs = TokioFileSystem::with_data_directory(root.path().to_path_buf());
        let path = root.path().join("creative.jpg");

        let data = Bytes::from("Hello, World!");
        fs.write_file(&path, data.clone()).await.unwrap();

        assert_eq!(fs.read_file(&path).await.unwrap(), data);
        assert_eq!(fs.metadata(&path).await.unwrap().size, 13);
    }
}
