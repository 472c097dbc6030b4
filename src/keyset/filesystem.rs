/// Filesystem-backed key set: one file per version plus a `meta` file in a
/// directory. The simplest base backend, used by the CLI and as the inner
/// end of layered pipelines in tests.
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Result, StrataError};
use crate::keyset::metadata::KeyMetadata;
use crate::keyset::{KeySet, KeySetWriter};

pub struct FileSystemKeySet {
    path: PathBuf,
}

impl FileSystemKeySet {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path.join(name);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StrataError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl KeySet for FileSystemKeySet {
    async fn metadata(&self) -> Result<KeyMetadata> {
        let data = self.read_file("meta").await?;
        let json = String::from_utf8(data)
            .map_err(|e| StrataError::Serialization(format!("meta is not UTF-8: {e}")))?;
        KeyMetadata::from_json(&json)
    }

    async fn get_key_data(&self, version: u32) -> Result<Vec<u8>> {
        self.read_file(&version.to_string()).await
    }
}

pub struct FileSystemKeySetWriter {
    path: PathBuf,
}

impl FileSystemKeySetWriter {
    /// Create the key set directory (and parents) if absent.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self { path })
    }
}

#[async_trait]
impl KeySetWriter for FileSystemKeySetWriter {
    async fn write_key(&mut self, key_data: &[u8], version: u32) -> Result<()> {
        tokio::fs::write(self.path.join(version.to_string()), key_data).await?;
        Ok(())
    }

    async fn write_metadata(&mut self, metadata: &KeyMetadata) -> Result<()> {
        tokio::fs::write(self.path.join("meta"), metadata.to_json()?).await?;
        Ok(())
    }

    async fn finish(&mut self) -> Result<bool> {
        Ok(true)
    }
}
