//! Extraction strategies: turning one item's content into output units.
//!
//! The pipeline knows nothing about how an item becomes units; it hands each claimed item to an
//! [`Extractor`] together with a [`UnitSink`]. Two strategies ship with the crate:
//!
//! - [`ParagraphExtractor`] streams plain text and emits [`Paragraph`] units as soon as each
//!   paragraph is complete, so large items are never held in memory.
//! - [`SectionExtractor`] parses Markdown and emits heading-delimited [`Section`] units with
//!   their code blocks.

pub mod paragraph;
pub mod section;
pub mod types;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{Producer, fan_in};
use crate::source::ContentStream;

pub use paragraph::{ParagraphExtractor, ParagraphPolicy, ParagraphSplitter};
pub use section::{SectionExtractor, sections_from_markdown};
pub use types::{CodeBlock, ExtractError, Paragraph, Section};

/// Strategy that turns the content of one item into units.
#[async_trait]
pub trait Extractor: Send + Sync + 'static {
    /// Unit produced by this strategy.
    type Unit: Send + 'static;

    /// Consume `content` for `item`, handing every finished unit to `sink` in document order.
    async fn extract(
        &self,
        item: &str,
        content: ContentStream,
        sink: &mut UnitSink<'_, Self::Unit>,
    ) -> Result<(), ExtractError>;
}

/// Destination for the units of one item, bound to a worker's producer handle.
pub struct UnitSink<'a, U> {
    producer: &'a Producer<U>,
    cancel: &'a CancellationToken,
    emitted: usize,
}

impl<'a, U: Send> UnitSink<'a, U> {
    pub(crate) fn new(producer: &'a Producer<U>, cancel: &'a CancellationToken) -> Self {
        Self {
            producer,
            cancel,
            emitted: 0,
        }
    }

    /// Push a fully constructed unit to the pipeline output.
    ///
    /// Fails when the run was cancelled or the consumer went away; extractors should return the
    /// error so the worker can stop.
    pub async fn emit(&mut self, unit: U) -> Result<(), ExtractError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ExtractError::Cancelled),
            pushed = self.producer.push(unit) => {
                pushed?;
                self.emitted += 1;
                Ok(())
            }
        }
    }

    /// Units emitted through this sink so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

/// Run `extractor` over a single item outside of a pipeline and collect its units.
pub async fn extract_all<E: Extractor>(
    extractor: &E,
    item: &str,
    content: ContentStream,
) -> Result<Vec<E::Unit>, ExtractError> {
    let (mut producers, mut output) = fan_in::channel(1, None);
    let Some(producer) = producers.pop() else {
        return Ok(Vec::new());
    };
    let cancel = CancellationToken::new();
    {
        let mut sink = UnitSink::new(&producer, &cancel);
        extractor.extract(item, content, &mut sink).await?;
    }
    producer.mark_worker_done();

    let mut units = Vec::new();
    while let Some(unit) = output.next().await {
        units.push(unit);
    }
    Ok(units)
}
