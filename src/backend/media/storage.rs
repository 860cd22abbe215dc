//! Media file storage
//!
//! References are relative, `/`-separated paths such as
//! `messages/4/images/<uuid>.png`. They are what the store persists and what
//! the `/media` route serves.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::MediaError;

/// Where attachment bytes live
#[async_trait]
pub trait MediaStore: Send + Sync + 'static {
    /// Write `bytes` at `reference`, replacing any existing file
    async fn save(&self, reference: &str, bytes: &[u8]) -> Result<(), MediaError>;

    /// Remove the file at `reference`; a missing file is not an error
    async fn delete(&self, reference: &str) -> Result<(), MediaError>;

    /// Local filesystem path for `reference`, for handing to external tools
    fn local_path(&self, reference: &str) -> Result<PathBuf, MediaError>;
}

/// Media store rooted at a local directory
#[derive(Debug, Clone)]
pub struct FsMediaStore {
    root: PathBuf,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Reject references that are absolute or climb out of the root
fn validate_reference(reference: &str) -> Result<&Path, MediaError> {
    let path = Path::new(reference);
    let mut components = path.components().peekable();
    if components.peek().is_none()
        || !components.all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(MediaError::InvalidReference(reference.to_string()));
    }
    Ok(path)
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn save(&self, reference: &str, bytes: &[u8]) -> Result<(), MediaError> {
        let path = self.local_path(reference)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!("[Media] Stored {} ({} bytes)", reference, bytes.len());
        Ok(())
    }

    async fn delete(&self, reference: &str) -> Result<(), MediaError> {
        let path = self.local_path(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("[Media] Deleted {}", reference);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn local_path(&self, reference: &str) -> Result<PathBuf, MediaError> {
        Ok(self.root.join(validate_reference(reference)?))
    }
}
