//! Local directory backend: a folder on disk acting as the blob container.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use super::{ObjectRef, ObjectStream, SourceError, SourceStore};

/// Source container rooted at a local directory. Object names are root-relative paths using
/// `/` separators, mirroring blob names with virtual folders.
#[derive(Debug, Clone)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    /// Create a store over `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, object: &ObjectRef) -> PathBuf {
        object
            .name
            .split('/')
            .fold(self.root.clone(), |path, part| path.join(part))
    }
}

fn list_blocking(root: &Path) -> Result<Vec<ObjectRef>, SourceError> {
    if !root.is_dir() {
        return Err(SourceError::List(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut objects = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|err| SourceError::List(err.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|err| SourceError::List(err.to_string()))?;
        let name = relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        objects.push(ObjectRef::new(name));
    }
    objects.sort();
    Ok(objects)
}

#[async_trait]
impl SourceStore for LocalDirStore {
    async fn list(&self) -> Result<Vec<ObjectRef>, SourceError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || list_blocking(&root))
            .await
            .map_err(|err| SourceError::List(format!("listing task failed: {err}")))?
    }

    async fn open(&self, object: &ObjectRef) -> Result<ObjectStream, SourceError> {
        let file = tokio::fs::File::open(self.resolve(object))
            .await
            .map_err(|source| SourceError::Read {
                name: object.name.clone(),
                source,
            })?;
        Ok(Box::new(file))
    }
}
