//! Blob-store abstraction the reconciler reads source documents from.

pub mod fs;
pub mod scanner;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;

pub use fs::LocalDirStore;
pub use scanner::{ScanError, scan_sources};

/// Errors surfaced by a [`SourceStore`] backend.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The container could not be enumerated.
    #[error("Failed to list source container: {0}")]
    List(String),
    /// A single object could not be opened or read.
    #[error("Failed to read source object '{name}': {source}")]
    Read {
        /// Object name that failed.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Reference to a single object in the source container.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Container-relative name, used verbatim as the fingerprint key.
    pub name: String,
}

impl ObjectRef {
    /// Build a reference from an object name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Readable byte stream returned by [`SourceStore::open`].
pub type ObjectStream = Box<dyn AsyncRead + Send + Unpin>;

/// Interface implemented by source containers.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Enumerate every object currently in the container.
    async fn list(&self) -> Result<Vec<ObjectRef>, SourceError>;

    /// Open an object for streaming reads.
    async fn open(&self, object: &ObjectRef) -> Result<ObjectStream, SourceError>;

    /// Read an object fully into memory.
    async fn read_all(&self, object: &ObjectRef) -> Result<Vec<u8>, SourceError> {
        use tokio::io::AsyncReadExt;

        let mut stream = self.open(object).await?;
        let mut bytes = Vec::new();
        stream
            .read_to_end(&mut bytes)
            .await
            .map_err(|source| SourceError::Read {
                name: object.name.clone(),
                source,
            })?;
        Ok(bytes)
    }
}
