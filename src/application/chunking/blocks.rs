//! Line table with fence pairing and whole-block detection.

use std::ops::Range;

use crate::application::syntax::{LineKind, LineSpan, classify_line, line_spans};

/// Kind of a block the boundary chunker may isolate into its own chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    CodeFence,
    Table,
    /// A heading plus everything up to the next heading of the same or higher level.
    HeadingSection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    /// Line indices covered by the block.
    pub lines: Range<usize>,
}

/// Per-line classification of a source, computed once and indexed by line.
pub struct LineTable<'a> {
    source: &'a str,
    spans: Vec<LineSpan>,
    kinds: Vec<LineKind>,
    in_code: Vec<bool>,
    opens_fence: Vec<bool>,
    fence_close: Vec<Option<usize>>,
    prefix_chars: Vec<usize>,
}

impl<'a> LineTable<'a> {
    pub fn new(source: &'a str) -> Self {
        let spans = line_spans(source);
        let len = spans.len();
        let mut kinds = Vec::with_capacity(len);
        let mut in_code = vec![false; len];
        let mut opens_fence = vec![false; len];
        let mut fence_close = vec![None; len];
        let mut prefix_chars = Vec::with_capacity(len + 1);
        prefix_chars.push(0);

        let mut open: Option<usize> = None;
        for (index, span) in spans.iter().enumerate() {
            let kind = classify_line(span.text(source));
            match (kind, open) {
                (LineKind::Fence, None) => {
                    open = Some(index);
                    opens_fence[index] = true;
                    in_code[index] = true;
                }
                (LineKind::Fence, Some(opener)) => {
                    fence_close[opener] = Some(index);
                    open = None;
                    in_code[index] = true;
                }
                (_, Some(_)) => in_code[index] = true,
                (_, None) => {}
            }
            kinds.push(kind);
            prefix_chars.push(prefix_chars[index] + span.chars);
        }

        Self {
            source,
            spans,
            kinds,
            in_code,
            opens_fence,
            fence_close,
            prefix_chars,
        }
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn kind(&self, line: usize) -> LineKind {
        self.kinds[line]
    }

    pub fn text(&self, line: usize) -> &'a str {
        self.spans[line].text(self.source)
    }

    /// Fence lines and every line between a fence pair.
    pub fn is_code(&self, line: usize) -> bool {
        self.in_code[line]
    }

    /// Classification outside code; `None` for lines that belong to a fence.
    pub fn prose_kind(&self, line: usize) -> Option<LineKind> {
        (!self.in_code[line]).then_some(self.kinds[line])
    }

    pub fn is_fence(&self, line: usize) -> bool {
        self.kinds[line] == LineKind::Fence
    }

    pub fn is_blank(&self, line: usize) -> bool {
        self.kinds[line] == LineKind::Blank
    }

    /// Characters in `lines`, terminators included.
    pub fn chars(&self, lines: Range<usize>) -> usize {
        self.prefix_chars[lines.end] - self.prefix_chars[lines.start]
    }

    /// Byte range of `lines` within the source, terminators included.
    pub fn byte_range(&self, lines: Range<usize>) -> Range<usize> {
        if lines.is_empty() {
            let at = self.spans.get(lines.start).map_or(self.source.len(), |s| s.start);
            return at..at;
        }
        self.spans[lines.start].start..self.spans[lines.end - 1].next
    }

    pub fn slice(&self, lines: Range<usize>) -> &'a str {
        &self.source[self.byte_range(lines)]
    }

    /// Detect a whole block starting at `line`.
    ///
    /// Heading sections are only reported when they fit within `max_chars`;
    /// fences and tables are reported regardless of size.
    pub fn block_at(&self, line: usize, max_chars: usize) -> Option<Block> {
        match self.kinds[line] {
            LineKind::Fence if self.opens_fence[line] => {
                let end = self.fence_close[line].unwrap_or(self.len() - 1);
                Some(Block {
                    kind: BlockKind::CodeFence,
                    lines: line..end + 1,
                })
            }
            LineKind::TableRow
                if !self.in_code[line] && (line == 0 || !self.is_table_row(line - 1)) =>
            {
                let mut end = line + 1;
                while self.is_table_row(end) {
                    end += 1;
                }
                Some(Block {
                    kind: BlockKind::Table,
                    lines: line..end,
                })
            }
            LineKind::Heading { level } if !self.in_code[line] => {
                let mut end = line + 1;
                while end < self.len() {
                    if matches!(
                        self.prose_kind(end),
                        Some(LineKind::Heading { level: next }) if next <= level
                    ) {
                        break;
                    }
                    if self.chars(line..end) > max_chars {
                        return None;
                    }
                    end += 1;
                }
                (self.chars(line..end) <= max_chars).then_some(Block {
                    kind: BlockKind::HeadingSection,
                    lines: line..end,
                })
            }
            _ => None,
        }
    }

    fn is_table_row(&self, line: usize) -> bool {
        line < self.len() && !self.in_code[line] && self.kinds[line] == LineKind::TableRow
    }
}

/// Fence marker lines in `text`, counted with the shared recogniser.
pub fn fence_count(text: &str) -> usize {
    text.lines()
        .filter(|line| classify_line(line) == LineKind::Fence)
        .count()
}
