//! Size-first line chunker that extends cut points past unterminated structures.
//!
//! Lines are accumulated until the next one would overflow
//! [`BoundaryStrategy::max_chunk_size`]. Before a chunk is cut, the lines
//! around the cut are inspected for an open construct, in this order:
//!
//! 1. an unterminated code fence,
//! 2. a table the cut would split,
//! 3. a list the cut would split,
//! 4. inline HTML tags left open in the trailing window,
//! 5. a blockquote the cut would split.
//!
//! The first construct that can be closed within the extension budget moves
//! the cut forward. Extensions are all or nothing: when the budget runs out the
//! chunk is cut where it was. Chunk contents are exact slices of the source, so
//! concatenating them reproduces the input byte for byte.

use std::ops::Range;

use serde::Deserialize;

use super::blocks::{BlockKind, LineTable};
use crate::application::syntax::LineKind;
use crate::domain::Chunk;

/// Lines scanned backwards when looking for open inline tags.
const TAG_WINDOW_LINES: usize = 20;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BoundaryStrategy {
    pub max_chunk_size: usize,
    /// Extra characters a chunk may grow by to reach a safe boundary.
    pub extension_budget: usize,
    /// Emit large fences, tables and heading sections as standalone chunks.
    pub isolate_blocks: bool,
}

impl BoundaryStrategy {
    pub fn new(max_chunk_size: usize) -> Self {
        let max_chunk_size = max_chunk_size.max(1);
        Self {
            max_chunk_size,
            extension_budget: max_chunk_size / 4,
            isolate_blocks: true,
        }
    }

    pub fn with_extension_budget(mut self, budget: usize) -> Self {
        self.extension_budget = budget;
        self
    }

    pub fn with_block_isolation(mut self, isolate: bool) -> Self {
        self.isolate_blocks = isolate;
        self
    }
}

impl Default for BoundaryStrategy {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BoundaryExtensionChunker;

impl BoundaryExtensionChunker {
    pub fn chunk(&self, text: &str, strategy: &BoundaryStrategy) -> Vec<Chunk> {
        let table = LineTable::new(text);
        let max = strategy.max_chunk_size.max(1);
        let mut cutter = Cutter {
            table: &table,
            budget: strategy.extension_budget,
            chunks: Vec::new(),
        };

        let mut start = 0;
        let mut chars = 0;
        let mut line = 0;
        while line < table.len() {
            if strategy.isolate_blocks
                && let Some(block) = table.block_at(line, max)
            {
                let size = table.chars(block.lines.clone());
                let fits_isolation = match block.kind {
                    BlockKind::HeadingSection => size > max / 2 && size <= max,
                    BlockKind::CodeFence | BlockKind::Table => size > max / 2,
                };
                if fits_isolation {
                    // Blank lines before the block travel with it.
                    if (start..line).all(|l| table.is_blank(l)) {
                        cutter.emit(start..block.lines.end);
                    } else {
                        cutter.emit(start..line);
                        cutter.emit(block.lines.clone());
                    }
                    line = block.lines.end;
                    start = line;
                    chars = 0;
                    continue;
                }
            }

            let line_chars = table.chars(line..line + 1);
            if chars > 0 && chars + line_chars > max {
                let end = cutter.safe_cut(start, line);
                cutter.emit(start..end);
                start = end;
                line = end;
                chars = 0;
                continue;
            }

            chars += line_chars;
            line += 1;
        }
        cutter.emit(start..table.len());
        cutter.chunks
    }
}

struct Cutter<'t, 'a> {
    table: &'t LineTable<'a>,
    budget: usize,
    chunks: Vec<Chunk>,
}

impl Cutter<'_, '_> {
    fn emit(&mut self, lines: Range<usize>) {
        if lines.is_empty() {
            return;
        }
        let span = self.table.byte_range(lines.clone());
        let content = self.table.slice(lines).to_string();
        self.chunks.push(Chunk::new(self.chunks.len(), content, span));
    }

    /// End line (exclusive) for a chunk that starts at `start` and would
    /// overflow when `cut` is added. Always greater than `start`.
    fn safe_cut(&self, start: usize, cut: usize) -> usize {
        if let Some(end) = self.extend_fence(start, cut) {
            return end;
        }
        let extenders: [fn(&Self, usize, usize) -> Option<usize>; 4] = [
            Self::extend_table,
            Self::extend_list,
            Self::extend_tags,
            Self::extend_blockquote,
        ];
        extenders
            .into_iter()
            .find_map(|extend| extend(self, start, cut))
            .unwrap_or(cut)
    }

    fn within_budget(&self, cut: usize, end: usize) -> Option<usize> {
        (end > cut && self.table.chars(cut..end) <= self.budget).then_some(end)
    }

    /// An odd number of fence lines means the chunk stops inside code. Reach
    /// the closing fence within budget, otherwise cut before the opening one.
    fn extend_fence(&self, start: usize, cut: usize) -> Option<usize> {
        let table = self.table;
        let fences: Vec<usize> = (start..cut).filter(|&l| table.is_fence(l)).collect();
        if fences.len() % 2 == 0 {
            return None;
        }

        let close = (cut..table.len()).find(|&l| table.is_fence(l));
        if let Some(end) = close.and_then(|close| self.within_budget(cut, close + 1)) {
            return Some(end);
        }
        fences.last().copied().filter(|&opener| opener > start)
    }

    fn extend_table(&self, start: usize, cut: usize) -> Option<usize> {
        let table = self.table;
        let is_row = |l: usize| table.prose_kind(l) == Some(LineKind::TableRow);
        if cut == start || !is_row(cut - 1) || !is_row(cut) {
            return None;
        }
        let mut end = cut;
        while end < table.len() && is_row(end) {
            end += 1;
        }
        while end < table.len() && table.prose_kind(end) == Some(LineKind::Blank) {
            end += 1;
        }
        self.within_budget(cut, end)
    }

    fn extend_list(&self, start: usize, cut: usize) -> Option<usize> {
        let table = self.table;
        let base = self.list_indent_before(start, cut)?;
        let continues = |l: usize| match table.prose_kind(l) {
            Some(LineKind::ListItem { indent }) => indent >= base,
            Some(LineKind::Text { indent }) => indent > base,
            _ => false,
        };

        let mut end = cut;
        let mut probe = cut;
        while probe < table.len() {
            if continues(probe) {
                probe += 1;
                end = probe;
            } else if table.prose_kind(probe) == Some(LineKind::Blank) {
                probe += 1;
            } else {
                break;
            }
        }
        self.within_budget(cut, end)
    }

    /// Indent of the list item the chunk ends on, looking back over blank and
    /// indented continuation lines.
    fn list_indent_before(&self, start: usize, cut: usize) -> Option<usize> {
        for line in (start..cut).rev() {
            match self.table.prose_kind(line)? {
                LineKind::ListItem { indent } => return Some(indent),
                LineKind::Blank => continue,
                LineKind::Text { indent } if indent > 0 => continue,
                _ => return None,
            }
        }
        None
    }

    fn extend_tags(&self, start: usize, cut: usize) -> Option<usize> {
        let table = self.table;
        let window = cut.saturating_sub(TAG_WINDOW_LINES).max(start);
        let mut open = Vec::new();
        for line in window..cut {
            if !table.is_code(line) {
                track_tags(table.text(line), &mut open);
            }
        }
        if open.is_empty() {
            return None;
        }

        let mut end = cut;
        while end < table.len() {
            if !table.is_code(end) {
                track_tags(table.text(end), &mut open);
            }
            end += 1;
            if open.is_empty() {
                return self.within_budget(cut, end);
            }
            if table.chars(cut..end) > self.budget {
                return None;
            }
        }
        None
    }

    fn extend_blockquote(&self, start: usize, cut: usize) -> Option<usize> {
        let table = self.table;
        if cut == start || table.prose_kind(cut - 1) != Some(LineKind::Blockquote) {
            return None;
        }
        let mut last_quote = None;
        let mut probe = cut;
        while probe < table.len() {
            match table.prose_kind(probe) {
                Some(LineKind::Blockquote) => last_quote = Some(probe),
                Some(LineKind::Blank) => {}
                _ => break,
            }
            probe += 1;
        }
        last_quote.and_then(|line| self.within_budget(cut, line + 1))
    }
}

/// Push opening tag names and pop matching closing tags found on `line`.
fn track_tags<'a>(line: &'a str, open: &mut Vec<&'a str>) {
    let mut rest = line;
    while let Some(at) = rest.find('<') {
        rest = &rest[at + 1..];
        let Some(close) = rest.find('>') else {
            break;
        };
        let tag = &rest[..close];
        rest = &rest[close + 1..];

        if tag.starts_with('!') || tag.ends_with('/') {
            continue;
        }
        let (closing, body) = match tag.strip_prefix('/') {
            Some(body) => (true, body),
            None => (false, tag),
        };
        let name_len = body
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '-')
            .unwrap_or(body.len());
        let name = &body[..name_len];
        if name.is_empty() || !name.as_bytes()[0].is_ascii_alphabetic() {
            continue;
        }
        if VOID_ELEMENTS.iter().any(|void| void.eq_ignore_ascii_case(name)) {
            continue;
        }

        if closing {
            if let Some(position) = open.iter().rposition(|o| o.eq_ignore_ascii_case(name)) {
                open.truncate(position);
            }
        } else {
            open.push(name);
        }
    }
}
