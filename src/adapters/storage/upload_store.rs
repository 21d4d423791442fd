use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::application::ports::UploadStorePort;
use crate::domain::errors::{DomainError, DomainResult};

/// Vídeos subidos en el directorio temporal. Se borran al terminar su stream.
pub struct FsUploadStore {
    dir: PathBuf,
}

impl FsUploadStore {
    pub async fn new(dir: impl AsRef<Path>) -> DomainResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, file_name: &str) -> DomainResult<PathBuf> {
        let plain = !file_name.is_empty()
            && !file_name.starts_with('.')
            && !file_name.contains(|c| c == '/' || c == '\\');
        if !plain {
            return Err(DomainError::InvalidInput(format!("invalid video name: {file_name:?}")));
        }
        Ok(self.dir.join(file_name))
    }
}

#[async_trait]
impl UploadStorePort for FsUploadStore {
    async fn store(&self, file_name: &str, bytes: &[u8]) -> DomainResult<PathBuf> {
        let path = self.path_for(file_name)?;
        fs::write(&path, bytes)
            .await
            .map_err(|e| DomainError::ResourceUnavailable(format!("Failed to save file: {e}")))?;
        Ok(path)
    }

    async fn resolve(&self, file_name: &str) -> DomainResult<PathBuf> {
        let path = self.path_for(file_name)?;
        if fs::try_exists(&path).await? {
            Ok(path)
        } else {
            Err(DomainError::NotFound("Video not found".into()))
        }
    }
}
