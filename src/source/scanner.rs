//! Fingerprint every eligible object in the source container.

use std::collections::BTreeMap;

use thiserror::Error;

use super::{SourceError, SourceStore};
use crate::hashing::hash_stream;

/// Fatal scan failure; diffing against a partial source view is unsafe.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Listing or opening failed.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// Hashing a stream failed midway.
    #[error("Failed to hash source object '{name}': {source}")]
    Hash {
        /// Object being hashed.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Whether `name` ends with `suffix`, ignoring ASCII case.
pub fn has_suffix(name: &str, suffix: &str) -> bool {
    let name = name.as_bytes();
    let suffix = suffix.as_bytes();
    name.len() >= suffix.len() && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

/// Return `filename → sha256` for every object whose name carries `suffix`.
///
/// The first failing object aborts the scan.
pub async fn scan_sources(
    store: &dyn SourceStore,
    suffix: &str,
) -> Result<BTreeMap<String, String>, ScanError> {
    let objects = store.list().await?;
    let listed = objects.len();
    let mut fingerprints = BTreeMap::new();

    for object in objects.into_iter().filter(|obj| has_suffix(&obj.name, suffix)) {
        let stream = store.open(&object).await?;
        let hash = hash_stream(stream)
            .await
            .map_err(|source| ScanError::Hash {
                name: object.name.clone(),
                source,
            })?;
        tracing::trace!(file = %object.name, hash = %hash, "Fingerprinted source object");
        fingerprints.insert(object.name, hash);
    }

    tracing::info!(
        listed,
        eligible = fingerprints.len(),
        suffix,
        "Scanned source container"
    );
    Ok(fingerprints)
}
