//! ArtifactStorage - Binary artifact persistence
//!
//! ## Responsibilities
//!
//! - Store uploaded photo bytes under a collision-resistant name
//! - Hand back the name and a retrievable reference (URL path)
//! - List stored artifacts

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Extension used when the filename hint carries none
pub const DEFAULT_EXTENSION: &str = ".jpg";

/// Attempts before giving up on finding a free name
const MAX_NAME_ATTEMPTS: usize = 8;

/// A stored artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Unique file name, e.g. `1700000000000-123456789.jpg`
    pub filename: String,
    /// Retrievable reference, e.g. `/uploads/1700000000000-123456789.jpg`
    pub url: String,
}

/// Artifact storage collaborator
#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// Persist raw bytes, naming them uniquely
    async fn store(&self, data: &[u8], filename_hint: Option<&str>) -> Result<StoredArtifact>;
}

/// Build a unique artifact name: `<unix-millis>-<random><ext>`
pub fn unique_name(filename_hint: Option<&str>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!(
        "{}-{}{}",
        Utc::now().timestamp_millis(),
        suffix,
        extension_of(filename_hint)
    )
}

/// Extension (with leading dot) taken from the hint, or the default
fn extension_of(filename_hint: Option<&str>) -> String {
    filename_hint
        .and_then(|hint| Path::new(hint).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 10)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Local filesystem storage
pub struct LocalArtifactStorage {
    dir: PathBuf,
    url_prefix: String,
}

impl LocalArtifactStorage {
    /// Create storage rooted at `dir`, creating the directory if needed
    ///
    /// # Arguments
    /// * `dir` - Directory holding the artifacts (e.g., ./uploads)
    /// * `url_prefix` - Path the directory is served under (e.g., /uploads)
    pub async fn new(dir: PathBuf, url_prefix: impl Into<String>) -> Result<Self> {
        fs::create_dir_all(&dir).await?;

        let url_prefix = url_prefix.into().trim_end_matches('/').to_string();

        Ok(Self { dir, url_prefix })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reference for a stored name
    pub fn url_for(&self, filename: &str) -> String {
        format!("{}/{}", self.url_prefix, filename)
    }

    /// Names of all stored artifacts, sorted
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| Error::Storage(format!("Cannot read upload directory: {}", e)))?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();

        Ok(names)
    }
}

#[async_trait]
impl ArtifactStorage for LocalArtifactStorage {
    async fn store(&self, data: &[u8], filename_hint: Option<&str>) -> Result<StoredArtifact> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let filename = unique_name(filename_hint);
            let path = self.dir.join(&filename);

            // create_new: a concurrent ingest can never share the file
            let mut file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::debug!(filename = %filename, "Artifact name taken, retrying");
                    continue;
                }
                Err(e) => {
                    return Err(Error::Storage(format!(
                        "Cannot create {}: {}",
                        path.display(),
                        e
                    )))
                }
            };

            if let Err(e) = write_all(&mut file, data).await {
                let _ = fs::remove_file(&path).await;
                return Err(Error::Storage(format!(
                    "Cannot write {}: {}",
                    path.display(),
                    e
                )));
            }

            tracing::debug!(
                filename = %filename,
                size = data.len(),
                "Artifact stored"
            );

            return Ok(StoredArtifact {
                url: self.url_for(&filename),
                filename,
            });
        }

        Err(Error::Storage(
            "Could not allocate a unique artifact name".to_string(),
        ))
    }
}

async fn write_all(file: &mut fs::File, data: &[u8]) -> std::io::Result<()> {
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_extension_from_hint() {
        assert_eq!(extension_of(Some("photo.png")), ".png");
        assert_eq!(extension_of(Some("capture.JPEG")), ".JPEG");
        assert_eq!(extension_of(Some("noext")), ".jpg");
        assert_eq!(extension_of(Some("weird.p/ng")), ".jpg");
        assert_eq!(extension_of(None), ".jpg");
    }

    #[test]
    fn test_unique_name_shape() {
        let name = unique_name(Some("x.png"));
        let (stem, ext) = name.split_once('.').unwrap();
        assert_eq!(ext, "png");

        let (millis, suffix) = stem.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert!(suffix.parse::<u32>().unwrap() < 1_000_000_000);
    }

    #[tokio::test]
    async fn test_store_writes_file_and_url() {
        let dir = tempdir().unwrap();
        let storage = LocalArtifactStorage::new(dir.path().join("uploads"), "/uploads/")
            .await
            .unwrap();

        let stored = storage.store(b"jpeg-bytes", Some("cam.jpg")).await.unwrap();
        assert!(stored.filename.ends_with(".jpg"));
        assert_eq!(stored.url, format!("/uploads/{}", stored.filename));

        let content = tokio::fs::read(storage.dir().join(&stored.filename)).await.unwrap();
        assert_eq!(content, b"jpeg-bytes");

        assert_eq!(storage.list().await.unwrap(), vec![stored.filename]);
    }

    #[tokio::test]
    async fn test_concurrent_stores_never_collide() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(
            LocalArtifactStorage::new(dir.path().to_path_buf(), "/uploads")
                .await
                .unwrap(),
        );

        let mut handles = Vec::new();
        for i in 0..50u8 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage.store(&[i], None).await.unwrap().filename
            }));
        }

        let mut names = HashSet::new();
        for handle in handles {
            assert!(names.insert(handle.await.unwrap()));
        }
        assert_eq!(storage.list().await.unwrap().len(), 50);
    }

    #[tokio::test]
    async fn test_store_fails_when_directory_missing() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("gone");
        let storage = LocalArtifactStorage::new(root.clone(), "/uploads").await.unwrap();
        tokio::fs::remove_dir_all(&root).await.unwrap();

        let err = storage.store(b"data", None).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}
