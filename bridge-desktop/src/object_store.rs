//! Object store backed by a local directory.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{validate_key, ObjectReader, ObjectStore},
};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Filesystem object store.
///
/// Each key maps to a file under `root`. Writes go to a uniquely named
/// temporary file in the same directory and are renamed into place, so a
/// crashed or failed upload never leaves a truncated object behind.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted in the platform data directory (`~/.local/share/photo-sync/assets` on Linux).
    pub fn in_data_dir() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(base.join("photo-sync").join("assets"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, segment| path.join(segment)))
    }
}

/// Copy `body` into a new file at `path` and flush it to disk.
async fn write_file(path: &Path, body: &mut ObjectReader) -> std::io::Result<u64> {
    let mut file = fs::File::create(path).await?;
    let written = tokio::io::copy(body, &mut file).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put_stream(
        &self,
        key: &str,
        mut body: ObjectReader,
        content_type: Option<&str>,
    ) -> Result<u64> {
        let target = self.path_for(key)?;
        let parent = target
            .parent()
            .ok_or_else(|| BridgeError::InvalidKey(key.to_string()))?;
        fs::create_dir_all(parent).await?;

        let temp = parent.join(format!(".{}.partial", uuid::Uuid::new_v4()));
        let stored = async {
            let written = write_file(&temp, &mut body).await?;
            fs::rename(&temp, &target).await?;
            Ok::<_, std::io::Error>(written)
        }
        .await;

        let written = match stored {
            Ok(written) => written,
            Err(e) => {
                fs::remove_file(&temp).await.ok();
                return Err(BridgeError::Io(e));
            }
        };

        debug!(key, bytes = written, content_type, "Stored object");
        Ok(written)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        Ok(fs::try_exists(path).await?)
    }
}
