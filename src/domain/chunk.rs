use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Structural classification of a contiguous run of document lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Heading,
    Paragraph,
    CodeBlock,
    MathBlock,
    List,
    Blockquote,
    Table,
    Separator,
    BlankLine,
}

impl ElementType {
    /// Whether a chunk boundary may be placed directly before an element of this type.
    ///
    /// Code blocks, math blocks and headings are atomic.
    pub fn can_split(self) -> bool {
        !matches!(
            self,
            ElementType::Heading | ElementType::CodeBlock | ElementType::MathBlock
        )
    }

    pub fn is_atomic(self) -> bool {
        !self.can_split()
    }

    /// Ordinal importance, lower is more important. Never used for reordering.
    pub fn priority(self) -> u8 {
        match self {
            ElementType::Heading => 0,
            ElementType::CodeBlock | ElementType::MathBlock => 1,
            ElementType::Table => 2,
            ElementType::List | ElementType::Blockquote => 3,
            ElementType::Paragraph => 4,
            ElementType::Separator => 5,
            ElementType::BlankLine => 6,
        }
    }
}

/// A classified span borrowed from the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralElement<'a> {
    pub kind: ElementType,
    /// Source text of the element, line terminators included.
    pub content: &'a str,
    /// Byte range of `content` within the source.
    pub span: Range<usize>,
    /// Character count of `content`.
    pub chars: usize,
}

impl StructuralElement<'_> {
    pub fn can_split(&self) -> bool {
        self.kind.can_split()
    }

    pub fn priority(&self) -> u8 {
        self.kind.priority()
    }
}

/// One unit of document text handed to the render sink in a single call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Zero-based delivery position.
    pub index: usize,
    pub content: String,
    /// Byte range of the source the chunk was cut from.
    pub span: Range<usize>,
    /// Character count of `content`.
    pub chars: usize,
    /// Set when a closing fence was appended so the chunk is well-formed on its own.
    pub synthetic_fence: bool,
}

impl Chunk {
    pub fn new(index: usize, content: String, span: Range<usize>) -> Self {
        let chars = content.chars().count();
        Self {
            index,
            content,
            span,
            chars,
            synthetic_fence: false,
        }
    }

    /// A chunk spanning the entire source, used when no chunking is applied.
    pub fn whole(source: &str) -> Self {
        Self::new(0, source.to_string(), 0..source.len())
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
