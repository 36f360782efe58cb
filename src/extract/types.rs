//! Unit types produced by extraction and the errors raised while producing them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::pipeline::BufferClosed;
use crate::source::SourceError;

/// Errors raised while turning one item's content into units.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Content could not be fetched or streamed.
    #[error("Failed to read item content: {0}")]
    Fetch(#[from] SourceError),
    /// Content is not valid UTF-8.
    #[error("Content of '{item}' is not valid UTF-8: {source}")]
    InvalidUtf8 {
        /// Identifier of the offending item.
        item: String,
        /// Decoder error describing the invalid sequence.
        #[source]
        source: std::str::Utf8Error,
    },
    /// The consumer dropped the output sequence.
    #[error(transparent)]
    Closed(#[from] BufferClosed),
    /// The pipeline run was cancelled.
    #[error("extraction cancelled")]
    Cancelled,
}

impl ExtractError {
    /// True when the error means the worker should stop rather than move to the next item.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed(_) | Self::Cancelled)
    }
}

/// Plain-text paragraph tagged with the item it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    /// Identifier of the originating item.
    pub item: String,
    /// Paragraph text.
    pub text: String,
}

impl Paragraph {
    /// Paragraph `text` extracted from `item`.
    pub fn new(item: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            text: text.into(),
        }
    }

    /// Stable digest of the paragraph text, usable for dedupe downstream.
    pub fn fingerprint(&self) -> String {
        compute_unit_hash(&[self.text.as_bytes()])
    }
}

/// Fenced or indented code attached to a section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    /// First word of the fence info string; empty when absent.
    pub language: String,
    /// Code content without the closing line break.
    pub value: String,
}

/// Heading-delimited chunk of a Markdown document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Flattened heading text; empty for content before the first heading.
    pub heading: String,
    /// Heading depth (1-6), or 0 for content before the first heading.
    pub level: u8,
    /// Paragraph and list text, one block per line.
    pub body: String,
    /// Code blocks in document order.
    pub code_blocks: Vec<CodeBlock>,
}

impl Section {
    /// A section is worth emitting when it has body text or at least one code block.
    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty() && self.code_blocks.is_empty()
    }

    /// Rebuild Markdown for the section: heading, body, then fenced code blocks.
    pub fn to_markdown(&self) -> String {
        let mut markdown = String::new();
        if !self.heading.is_empty() {
            markdown.push_str(&"#".repeat(usize::from(self.level.max(1))));
            markdown.push(' ');
            markdown.push_str(&self.heading);
            markdown.push('\n');
        }
        markdown.push_str(&self.body);
        for block in &self.code_blocks {
            markdown.push_str("```");
            markdown.push_str(&block.language);
            markdown.push('\n');
            markdown.push_str(&block.value);
            markdown.push_str("\n```\n");
        }
        markdown
    }

    /// Stable digest over heading, body and code, usable for dedupe downstream.
    pub fn fingerprint(&self) -> String {
        let level = [self.level];
        let mut parts: Vec<&[u8]> = vec![self.heading.as_bytes(), &level[..], self.body.as_bytes()];
        for block in &self.code_blocks {
            parts.push(block.language.as_bytes());
            parts.push(block.value.as_bytes());
        }
        compute_unit_hash(&parts)
    }
}

fn compute_unit_hash(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}
