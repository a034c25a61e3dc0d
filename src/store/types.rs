//! Store types

use std::io;
use std::path::PathBuf;

use tokio::fs::File;

use super::key::BlobKey;

/// Result of a put
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    pub key: BlobKey,

    /// False when a blob with this key was already present and nothing was written
    pub created: bool,
}

/// An open stored blob, ready to be streamed
#[derive(Debug)]
pub struct Blob {
    pub key: BlobKey,
    pub size: u64,
    pub file: File,
}

/// Store error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Blob not found: {0}")]
    NotFound(BlobKey),

    #[error("Failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Stored content for {0} differs from the uploaded bytes")]
    Collision(BlobKey),
}

impl StoreError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
