//! Local image storage
//!
//! Files live under `<root>/uploads` and are served by the router at
//! `/uploads/<key>`. Keys are relative, slash-separated paths such as
//! `rooms/<job id>/photo.jpg`.

use roomai_common::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// URL prefix the upload directory is mounted at
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Storage rooted at `<root_folder>/uploads`
    pub fn in_root_folder(root_folder: &Path) -> Self {
        Self::new(root_folder.join("uploads"))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Write `bytes` under `key` and return the public URL
    pub async fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(key, bytes = bytes.len(), "Stored file");
        Ok(self.url_for(key))
    }

    /// Read a stored file
    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Stored file not found: {}", key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", UPLOADS_URL_PREFIX, key.trim_start_matches('/'))
    }

    /// Map a key to a path, refusing anything that escapes the base dir
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));
        if key.trim().is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::InvalidInput(format!("Invalid storage key: {}", key)));
        }
        Ok(self.base_dir.join(relative))
    }
}

/// Reduce a client-supplied file name to a safe single path segment
pub fn sanitize_filename(name: &str, fallback_extension: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
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

    if cleaned.is_empty() || !cleaned.contains('.') {
        format!("upload.{}", fallback_extension)
    } else {
        cleaned.to_string()
    }
}
