//! Item sources: enumeration of identifiers and on-demand content streams.
//!
//! A source answers two questions for the pipeline: which items exist ([`Enumerator`]) and what
//! bytes an item holds ([`Fetcher`]). Content is always handed out as a [`ContentStream`] so
//! extractors can consume arbitrarily large items piece by piece.

mod local;
mod memory;
mod remote;

use bytes::Bytes;
use futures_core::Stream;
use std::pin::Pin;
use thiserror::Error;

pub use local::LocalDirectory;
pub use memory::MemorySource;
pub use remote::{ObjectStore, ObjectStoreSettings};

/// Streamed item content, delivered in pieces of arbitrary size.
pub type ContentStream = Pin<Box<dyn Stream<Item = Result<Bytes, SourceError>> + Send>>;

/// Errors raised while listing items or fetching their content.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Local filesystem operation failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// Path involved in the failing operation.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Directory traversal failed while listing items.
    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),
    /// HTTP layer failed before or while receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Object store responded with an unexpected status code.
    #[error("Unexpected object store response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the object store.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Listing payload could not be decoded.
    #[error("Malformed listing response: {0}")]
    MalformedListing(String),
    /// Requested item does not exist in the source.
    #[error("Item not found: {0}")]
    NotFound(String),
    /// Source refused to serve the item.
    #[error("Failed to fetch '{item}': {reason}")]
    Unavailable {
        /// Identifier of the item that could not be served.
        item: String,
        /// Human readable failure description.
        reason: String,
    },
}

/// Produces the finite, ordered list of item identifiers available in a source.
#[async_trait::async_trait]
pub trait Enumerator: Send + Sync {
    /// List every item identifier currently present in the source.
    async fn list(&self) -> Result<Vec<String>, SourceError>;
}

/// Opens a streamed view of one item's content.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Start streaming the content of `item`.
    async fn fetch(&self, item: &str) -> Result<ContentStream, SourceError>;
}

/// Content stream serving already-available pieces in order.
pub fn content_from_pieces<I, P>(pieces: I) -> ContentStream
where
    I: IntoIterator<Item = P>,
    P: Into<Bytes>,
{
    let pieces: Vec<Result<Bytes, SourceError>> =
        pieces.into_iter().map(|piece| Ok(piece.into())).collect();
    Box::pin(futures_util::stream::iter(pieces))
}

/// Keep only identifiers ending with `suffix`, preserving listing order.
///
/// An empty suffix keeps everything.
pub fn filter_by_suffix(items: Vec<String>, suffix: &str) -> Vec<String> {
    if suffix.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| item.ends_with(suffix))
        .collect()
}
