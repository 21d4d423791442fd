use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::application::ports::SnapshotStorePort;
use crate::domain::errors::{DomainError, DomainResult};

/// Snapshots JPEG en disco, uno por fichero `{uuid}.jpg`.
pub struct FsSnapshotStore {
    dir: PathBuf,
}

impl FsSnapshotStore {
    pub async fn new(dir: impl AsRef<Path>) -> DomainResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, image_id: &str) -> DomainResult<PathBuf> {
        validate_image_id(image_id)?;
        Ok(self.dir.join(image_id))
    }
}

/// Sólo `{uuid}.jpg`: nada de rutas ni nombres arbitrarios.
pub fn validate_image_id(image_id: &str) -> DomainResult<()> {
    let valid = image_id
        .strip_suffix(".jpg")
        .is_some_and(|stem| Uuid::parse_str(stem).is_ok());
    if valid {
        Ok(())
    } else {
        Err(DomainError::InvalidInput(format!("malformed image id: {image_id:?}")))
    }
}

#[async_trait]
impl SnapshotStorePort for FsSnapshotStore {
    async fn save(&self, jpeg: &[u8]) -> DomainResult<String> {
        let image_id = format!("{}.jpg", Uuid::new_v4());
        let path = self.dir.join(&image_id);
        fs::write(&path, jpeg)
            .await
            .map_err(|e| DomainError::ResourceUnavailable(format!("snapshot write {}: {e}", path.display())))?;
        debug!(image_id = %image_id, bytes = jpeg.len(), "Snapshot guardado");
        Ok(image_id)
    }

    async fn load(&self, image_id: &str) -> DomainResult<Vec<u8>> {
        let path = self.path_for(image_id)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DomainError::NotFound("Image not found".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn latest(&self) -> DomainResult<Option<String>> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut newest: Option<(SystemTime, String)> = None;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".jpg") {
                continue;
            }
            let modified = entry.metadata().await?.modified()?;
            if newest.as_ref().map_or(true, |(t, _)| modified >= *t) {
                newest = Some((modified, name));
            }
        }
        Ok(newest.map(|(_, name)| name))
    }
}
