use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::application::ports::MediaStorePort;
use crate::domain::errors::{DomainError, DomainResult};

/// Uploads and annotated outputs under the directory served as `/static`.
///
/// Same-named uploads overwrite each other; nothing is ever cleaned up.
pub struct LocalMediaStore {
    root: PathBuf,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }

    pub async fn prepare(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(self.uploads_dir()).await?;
        tokio::fs::create_dir_all(self.outputs_dir()).await
    }
}

/// Only the final path component of a client-supplied name is kept.
fn sanitize_file_name(name: &str) -> Option<&str> {
    let base = name.rsplit(['/', '\\']).next()?.trim();
    (!base.is_empty() && base != "." && base != "..").then_some(base)
}

#[async_trait]
impl MediaStorePort for LocalMediaStore {
    async fn save_upload(&self, file_name: &str, data: &[u8]) -> DomainResult<PathBuf> {
        let name = sanitize_file_name(file_name).ok_or_else(|| {
            DomainError::invalid_input(format!("invalid upload file name {file_name:?}"))
        })?;

        let dir = self.uploads_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| DomainError::failed(format!("creating {}: {e}", dir.display())))?;

        let path = dir.join(name);
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| DomainError::failed(format!("writing {}: {e}", path.display())))?;
        debug!("Stored {} bytes at {}", data.len(), path.display());
        Ok(path)
    }

    fn outputs_dir(&self) -> PathBuf {
        self.root.join("outputs")
    }

    fn public_url(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = rel.iter().map(|c| c.to_string_lossy()).collect();
        Some(format!("/static/{}", parts.join("/")))
    }
}
