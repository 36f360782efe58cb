//! Paragraph splitting over streamed plain text.
//!
//! Content arrives in pieces of arbitrary size. [`ParagraphSplitter`] keeps the unconsumed tail
//! as raw bytes, so a line, a delimiter, or a multi-byte UTF-8 sequence split across two pieces
//! yields the same paragraphs as one contiguous read. Two delimiter policies exist:
//!
//! - [`ParagraphPolicy::BlankLine`]: line oriented. Non-blank lines are right-trimmed and joined
//!   with a single space; a blank or whitespace-only line ends the paragraph.
//! - [`ParagraphPolicy::DoubleBreak`]: a line break, optional horizontal whitespace, and another
//!   line break end the paragraph. Paragraphs are trimmed and keep their interior line breaks.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use super::{ExtractError, Extractor, Paragraph, UnitSink};
use crate::source::ContentStream;

/// How paragraph boundaries are recognised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParagraphPolicy {
    /// Blank or whitespace-only lines separate paragraphs; lines are joined with spaces.
    #[default]
    BlankLine,
    /// A double line break separates paragraphs; interior line breaks are kept.
    DoubleBreak,
}

/// Incremental paragraph splitter fed with content pieces.
#[derive(Debug)]
pub struct ParagraphSplitter {
    policy: ParagraphPolicy,
    carry: Vec<u8>,
    resume: usize,
    lines: Vec<String>,
}

impl ParagraphSplitter {
    /// Splitter applying `policy`.
    pub fn new(policy: ParagraphPolicy) -> Self {
        Self {
            policy,
            carry: Vec::new(),
            resume: 0,
            lines: Vec::new(),
        }
    }

    /// Consume the next piece and return every paragraph it completes.
    pub fn feed(&mut self, piece: &[u8]) -> Result<Vec<String>, std::str::Utf8Error> {
        self.carry.extend_from_slice(piece);
        let mut paragraphs = Vec::new();
        match self.policy {
            ParagraphPolicy::BlankLine => self.drain_lines(&mut paragraphs)?,
            ParagraphPolicy::DoubleBreak => self.drain_blocks(&mut paragraphs)?,
        }
        Ok(paragraphs)
    }

    /// Flush whatever remains once the content is exhausted.
    pub fn finish(mut self) -> Result<Vec<String>, std::str::Utf8Error> {
        let mut paragraphs = Vec::new();
        let tail = std::mem::take(&mut self.carry);
        let tail = std::str::from_utf8(&tail)?;
        match self.policy {
            ParagraphPolicy::BlankLine => {
                self.push_line(tail, &mut paragraphs);
                self.flush_lines(&mut paragraphs);
            }
            ParagraphPolicy::DoubleBreak => push_block(tail, &mut paragraphs),
        }
        Ok(paragraphs)
    }

    fn drain_lines(&mut self, paragraphs: &mut Vec<String>) -> Result<(), std::str::Utf8Error> {
        let mut start = 0;
        while let Some(offset) = self.carry[start..].iter().position(|&byte| byte == b'\n') {
            let end = start + offset;
            let line = std::str::from_utf8(&self.carry[start..end])?.to_string();
            self.push_line(&line, paragraphs);
            start = end + 1;
        }
        self.carry.drain(..start);
        Ok(())
    }

    fn push_line(&mut self, line: &str, paragraphs: &mut Vec<String>) {
        if line.trim().is_empty() {
            self.flush_lines(paragraphs);
        } else {
            self.lines.push(line.trim_end().to_string());
        }
    }

    fn flush_lines(&mut self, paragraphs: &mut Vec<String>) {
        if !self.lines.is_empty() {
            paragraphs.push(self.lines.join(" "));
            self.lines.clear();
        }
    }

    fn drain_blocks(&mut self, paragraphs: &mut Vec<String>) -> Result<(), std::str::Utf8Error> {
        let mut start = 0;
        let mut cursor = self.resume;
        loop {
            let Some(offset) = self.carry[cursor..].iter().position(|&byte| byte == b'\n') else {
                cursor = self.carry.len();
                break;
            };
            let newline = cursor + offset;
            let mut next = newline + 1;
            while next < self.carry.len() && matches!(self.carry[next], b' ' | b'\t' | b'\r') {
                next += 1;
            }
            if next == self.carry.len() {
                // Possibly the first half of a delimiter; wait for more input.
                cursor = newline;
                break;
            }
            if self.carry[next] == b'\n' {
                push_block(std::str::from_utf8(&self.carry[start..newline])?, paragraphs);
                start = next + 1;
                cursor = start;
            } else {
                cursor = newline + 1;
            }
        }
        self.carry.drain(..start);
        self.resume = cursor - start;
        Ok(())
    }
}

fn push_block(block: &str, paragraphs: &mut Vec<String>) {
    let trimmed = block.trim();
    if !trimmed.is_empty() {
        paragraphs.push(trimmed.to_string());
    }
}

/// Streams plain text and emits one [`Paragraph`] per paragraph, tagged with the item.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParagraphExtractor {
    policy: ParagraphPolicy,
}

impl ParagraphExtractor {
    /// Extractor applying `policy`.
    pub fn new(policy: ParagraphPolicy) -> Self {
        Self { policy }
    }

    /// Delimiter policy in use.
    pub fn policy(&self) -> ParagraphPolicy {
        self.policy
    }
}

#[async_trait]
impl Extractor for ParagraphExtractor {
    type Unit = Paragraph;

    async fn extract(
        &self,
        item: &str,
        mut content: ContentStream,
        sink: &mut UnitSink<'_, Paragraph>,
    ) -> Result<(), ExtractError> {
        let invalid = |source| ExtractError::InvalidUtf8 {
            item: item.to_string(),
            source,
        };
        let mut splitter = ParagraphSplitter::new(self.policy);
        while let Some(piece) = content.next().await {
            let piece = piece?;
            for text in splitter.feed(&piece).map_err(invalid)? {
                sink.emit(Paragraph::new(item, text)).await?;
            }
        }
        for text in splitter.finish().map_err(invalid)? {
            sink.emit(Paragraph::new(item, text)).await?;
        }
        Ok(())
    }
}
