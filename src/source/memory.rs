use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_stream::stream;
use bytes::Bytes;

use super::{ContentStream, Enumerator, Fetcher, SourceError};

/// Map-backed source that serves content from memory.
///
/// Content is streamed in pieces of `piece_size` bytes to mimic network reads, and chosen
/// identifiers can be made to fail on fetch. Every fetch is recorded so callers can check how
/// many times each identifier was requested.
pub struct MemorySource {
    items: BTreeMap<String, Bytes>,
    piece_size: usize,
    failing: HashSet<String>,
    fetches: Mutex<Vec<String>>,
}

impl MemorySource {
    /// Build a source from `(identifier, content)` pairs.
    pub fn new<I, K, V>(items: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bytes>,
    {
        Self {
            items: items
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
            piece_size: usize::MAX,
            failing: HashSet::new(),
            fetches: Mutex::new(Vec::new()),
        }
    }

    /// Stream content in pieces of at most `piece_size` bytes (minimum 1).
    pub fn with_piece_size(mut self, piece_size: usize) -> Self {
        self.piece_size = piece_size.max(1);
        self
    }

    /// Make every fetch of `item` fail.
    pub fn failing(mut self, item: impl Into<String>) -> Self {
        self.failing.insert(item.into());
        self
    }

    /// Identifiers requested so far, in fetch order.
    pub fn fetch_log(&self) -> Vec<String> {
        self.fetches
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Enumerator for MemorySource {
    async fn list(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.items.keys().cloned().collect())
    }
}

#[async_trait::async_trait]
impl Fetcher for MemorySource {
    async fn fetch(&self, item: &str) -> Result<ContentStream, SourceError> {
        if let Ok(mut log) = self.fetches.lock() {
            log.push(item.to_string());
        }
        if self.failing.contains(item) {
            return Err(SourceError::Unavailable {
                item: item.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        let content = self
            .items
            .get(item)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(item.to_string()))?;
        let piece_size = self.piece_size;

        Ok(Box::pin(stream! {
            let mut offset = 0;
            while offset < content.len() {
                let end = content.len().min(offset.saturating_add(piece_size));
                yield Ok::<Bytes, SourceError>(content.slice(offset..end));
                offset = end;
                tokio::task::yield_now().await;
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn serves_content_in_pieces() {
        let source = MemorySource::new([("a.txt", "abcdefg")]).with_piece_size(3);
        let pieces: Vec<Bytes> = source
            .fetch("a.txt")
            .await
            .expect("fetch")
            .map(|piece| piece.expect("piece"))
            .collect()
            .await;
        assert_eq!(pieces, vec!["abc", "def", "g"]);
        assert_eq!(source.fetch_log(), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn injected_failure_and_missing_items_error() {
        let source = MemorySource::new([("a.txt", "x")]).failing("a.txt");
        assert!(matches!(
            source.fetch("a.txt").await,
            Err(SourceError::Unavailable { .. })
        ));
        assert!(matches!(
            source.fetch("b.txt").await,
            Err(SourceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn lists_identifiers_sorted() {
        let source = MemorySource::new([("b", ""), ("a", "")]);
        assert_eq!(source.list().await.expect("list"), vec!["a", "b"]);
    }
}
