//! Markdown sectioning: heading-delimited chunks with their code blocks.

use async_trait::async_trait;
use futures_util::StreamExt;
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use super::{CodeBlock, ExtractError, Extractor, Section, UnitSink};
use crate::source::ContentStream;

/// Top-level block currently being walked.
enum Block {
    Heading(u8),
    Paragraph,
    Code(String),
    List,
    Ignored,
}

#[derive(Default)]
struct SectionBuilder {
    sections: Vec<Section>,
    current: Section,
}

impl SectionBuilder {
    fn close_current(&mut self) {
        let section = std::mem::take(&mut self.current);
        if !section.is_empty() {
            self.sections.push(section);
        }
    }

    fn open(&mut self, heading: String, level: u8) {
        self.close_current();
        self.current.heading = heading;
        self.current.level = level;
    }

    fn push_line(&mut self, line: &str) {
        self.current.body.push_str(line);
        self.current.body.push('\n');
    }

    fn push_code(&mut self, language: String, mut value: String) {
        if value.ends_with('\n') {
            value.pop();
        }
        self.current.code_blocks.push(CodeBlock { language, value });
    }

    fn finish(mut self) -> Vec<Section> {
        self.close_current();
        self.sections
    }
}

/// Split Markdown into sections, one per heading, in document order.
///
/// Paragraphs contribute their flattened text (inline code verbatim, emphasis markers dropped)
/// followed by a line break; list items contribute `- <text>` lines; code blocks are collected
/// separately. Quotes, tables, HTML and rules are ignored. Sections with neither body text nor
/// code are skipped. Text before the first heading forms a section with an empty heading and
/// level 0.
pub fn sections_from_markdown(markdown: &str) -> Vec<Section> {
    let mut builder = SectionBuilder::default();
    let mut block = Block::Ignored;
    let mut depth = 0usize;
    let mut image_depth = 0usize;
    let mut text = String::new();
    let mut item_parts: Vec<String> = Vec::new();

    for event in Parser::new_ext(markdown, Options::empty()) {
        match event {
            Event::Start(tag) => {
                if depth == 0 {
                    block = match &tag {
                        Tag::Heading { level, .. } => Block::Heading(*level as u8),
                        Tag::Paragraph => Block::Paragraph,
                        Tag::CodeBlock(kind) => Block::Code(fence_language(kind)),
                        Tag::List(_) => Block::List,
                        _ => Block::Ignored,
                    };
                    text.clear();
                } else if matches!(block, Block::List) {
                    if depth == 1 {
                        item_parts.clear();
                    } else if depth == 2 {
                        item_parts.push(String::new());
                    }
                }
                if matches!(tag, Tag::Image { .. }) {
                    image_depth += 1;
                }
                depth += 1;
            }
            Event::End(end) => {
                depth = depth.saturating_sub(1);
                if matches!(end, TagEnd::Image) {
                    image_depth = image_depth.saturating_sub(1);
                }
                if depth == 0 {
                    match std::mem::replace(&mut block, Block::Ignored) {
                        Block::Heading(level) => builder.open(std::mem::take(&mut text), level),
                        Block::Paragraph => builder.push_line(&text),
                        Block::Code(language) => builder.push_code(language, std::mem::take(&mut text)),
                        Block::List | Block::Ignored => {}
                    }
                } else if depth == 1 && matches!(block, Block::List) && matches!(end, TagEnd::Item) {
                    let item = item_parts
                        .iter()
                        .map(|part| part.trim())
                        .filter(|part| !part.is_empty())
                        .collect::<Vec<_>>()
                        .join(" ");
                    builder.push_line(&format!("- {item}"));
                }
            }
            Event::Text(value) | Event::Code(value) if image_depth == 0 => {
                push_text(&block, &mut text, &mut item_parts, &value);
            }
            Event::SoftBreak | Event::HardBreak => {
                push_text(&block, &mut text, &mut item_parts, "\n");
            }
            _ => {}
        }
    }

    builder.finish()
}

fn push_text(block: &Block, text: &mut String, item_parts: &mut Vec<String>, value: &str) {
    match block {
        Block::List => {
            if item_parts.is_empty() {
                item_parts.push(String::new());
            }
            if let Some(part) = item_parts.last_mut() {
                part.push_str(value);
            }
        }
        Block::Ignored => {}
        _ => text.push_str(value),
    }
}

fn fence_language(kind: &CodeBlockKind<'_>) -> String {
    match kind {
        CodeBlockKind::Fenced(info) => info.split_whitespace().next().unwrap_or("").to_string(),
        CodeBlockKind::Indented => String::new(),
    }
}

/// Reads a Markdown item in full and emits one [`Section`] per non-empty heading chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionExtractor;

impl SectionExtractor {
    /// Construct the Markdown sectioning strategy.
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Extractor for SectionExtractor {
    type Unit = Section;

    async fn extract(
        &self,
        item: &str,
        mut content: ContentStream,
        sink: &mut UnitSink<'_, Section>,
    ) -> Result<(), ExtractError> {
        let mut raw = Vec::new();
        while let Some(piece) = content.next().await {
            raw.extend_from_slice(&piece?);
        }
        let markdown = std::str::from_utf8(&raw).map_err(|source| ExtractError::InvalidUtf8 {
            item: item.to_string(),
            source,
        })?;
        let sections = sections_from_markdown(markdown);
        tracing::trace!(item, sections = sections.len(), "Parsed markdown item");
        for section in sections {
            sink.emit(section).await?;
        }
        Ok(())
    }
}
