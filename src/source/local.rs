use std::path::{Path, PathBuf};

use futures_util::TryStreamExt;
use tokio_util::io::ReaderStream;
use walkdir::WalkDir;

use super::{ContentStream, Enumerator, Fetcher, SourceError};

/// Files under a local directory, identified by their path relative to the root.
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    root: PathBuf,
    recursive: bool,
}

impl LocalDirectory {
    /// Source rooted at `root`, listing only its direct children.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recursive: false,
        }
    }

    /// Descend into subdirectories while listing.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Root directory served by this source.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn list_files(root: &Path, recursive: bool) -> Result<Vec<String>, SourceError> {
    let metadata = std::fs::metadata(root).map_err(|source| SourceError::Io {
        path: root.display().to_string(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(SourceError::Io {
            path: root.display().to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "provided path is not a directory",
            ),
        });
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut items = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(max_depth) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        items.push(relative.to_string_lossy().into_owned());
    }
    items.sort();
    Ok(items)
}

#[async_trait::async_trait]
impl Enumerator for LocalDirectory {
    async fn list(&self) -> Result<Vec<String>, SourceError> {
        let root = self.root.clone();
        let recursive = self.recursive;
        let items = tokio::task::spawn_blocking(move || list_files(&root, recursive))
            .await
            .map_err(|err| SourceError::Io {
                path: self.root.display().to_string(),
                source: std::io::Error::other(err),
            })??;
        tracing::debug!(root = %self.root.display(), count = items.len(), "Listed local items");
        Ok(items)
    }
}

#[async_trait::async_trait]
impl Fetcher for LocalDirectory {
    async fn fetch(&self, item: &str) -> Result<ContentStream, SourceError> {
        let path = self.root.join(item);
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|source| SourceError::Io {
                path: path.display().to_string(),
                source,
            })?;
        let display = path.display().to_string();
        Ok(Box::pin(ReaderStream::new(file).map_err(move |source| {
            SourceError::Io {
                path: display.clone(),
                source,
            }
        })))
    }
}
