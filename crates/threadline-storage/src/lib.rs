use anyhow::{Result, bail};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

/// Manages on-disk attachment blobs.
///
/// Blobs live at `{storage_dir}/{path}` where `path` is a relative,
/// slash-separated key such as `{owner_id}/{upload_id}-{file_name}`. Every
/// upload gets a fresh key, so a blob is never shared between two uploads.
/// The same key is served publicly under `{public_base_url}/attachments/{path}`.
pub struct Storage {
    dir: PathBuf,
    public_base_url: String,
}

impl Storage {
    pub async fn new(dir: PathBuf, public_base_url: impl Into<String>) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Attachment storage directory: {}", dir.display());
        Ok(Self {
            dir,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Storage key for a new blob: owner directory, upload id and a
    /// sanitized file name.
    pub fn blob_path(owner: Uuid, upload_id: Uuid, file_name: &str) -> String {
        format!("{}/{}-{}", owner, upload_id.simple(), sanitize_file_name(file_name))
    }

    /// Hex SHA-256 of a blob, recorded alongside the upload.
    pub fn digest(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Resolve a storage key to a file path, refusing anything that could
    /// escape the storage directory.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if path.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("Invalid storage path: {:?}", path);
        }
        Ok(self.dir.join(relative))
    }

    /// Write a blob and return its storage key.
    pub async fn upload(&self, path: &str, bytes: &[u8]) -> Result<String> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(&full).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        info!("Stored blob {} ({} bytes)", path, bytes.len());
        Ok(path.to_string())
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}/attachments/{}", self.public_base_url, path)
    }

    pub async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        Ok(fs::read(&full).await?)
    }

    /// Delete a blob. A blob that is already gone is not an error.
    pub async fn remove(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full).await {
            Ok(()) => {
                info!("Deleted blob {}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Blob {} already gone", path);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}
