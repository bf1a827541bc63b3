//! Read back the fingerprint the index holds for every source file.

use std::collections::{BTreeMap, BTreeSet};

use super::SearchIndex;
use super::filters::extract_fingerprint;
use super::types::{IndexError, IndexedPoint};

const SELECT_FINGERPRINT: [&str; 2] = ["metadata.source", "metadata.file_hash"];

/// Fingerprints on record in the index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexState {
    /// `filename → file_hash`, first-seen hash per filename.
    pub files: BTreeMap<String, String>,
    /// Filenames whose chunks disagree on the hash.
    pub divergent: BTreeSet<String>,
    /// Set when the query failed and the state was assumed empty.
    pub degraded: Option<String>,
}

/// Fold chunk payloads into one fingerprint per filename.
pub fn fold_fingerprints<I>(points: I) -> IndexState
where
    I: IntoIterator<Item = IndexedPoint>,
{
    let mut state = IndexState::default();
    for point in points {
        let Some((source, hash)) = extract_fingerprint(&point.payload) else {
            continue;
        };
        match state.files.get(&source) {
            None => {
                state.files.insert(source, hash);
            }
            Some(existing) if *existing != hash => {
                tracing::warn!(
                    file = %source,
                    kept = %existing,
                    other = %hash,
                    "Chunks of one file carry different hashes"
                );
                state.divergent.insert(source);
            }
            Some(_) => {}
        }
    }
    state
}

/// Query the index for its current fingerprints.
///
/// A missing index is a first run and yields empty state. Any other failure is logged and also
/// yields empty state, so the run degrades to a full re-ingest instead of aborting.
pub async fn read_index_state(index: &dyn SearchIndex, name: &str) -> IndexState {
    match index.query(name, None, &SELECT_FINGERPRINT).await {
        Ok(points) => {
            let chunks = points.len();
            let state = fold_fingerprints(points);
            tracing::info!(
                index = name,
                chunks,
                files = state.files.len(),
                "Read index state"
            );
            state
        }
        Err(IndexError::NotFound(_)) => {
            tracing::info!(index = name, "Index absent; starting from empty state");
            IndexState::default()
        }
        Err(error) => {
            tracing::warn!(
                index = name,
                error = %error,
                "Could not read index state; treating index as empty"
            );
            IndexState {
                degraded: Some(error.to_string()),
                ..IndexState::default()
            }
        }
    }
}
