//! Element-merge chunking: classify lines into structural elements, then pack
//! whole elements into chunks of roughly `target_size` characters.

use std::ops::Range;

use crate::application::syntax::{
    LineKind, LineSpan, classify_line, is_fence, is_single_line_math, line_spans,
};
use crate::domain::{Chunk, ElementType, StructuralElement};

const SYNTHETIC_FENCE: &str = "```\n";

/// An element expressed as a range of line indices.
#[derive(Debug, Clone)]
struct Run {
    kind: ElementType,
    lines: Range<usize>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralChunker;

impl StructuralChunker {
    /// Classified elements of `text`, in order, covering every line.
    pub fn elements<'a>(&self, text: &'a str) -> Vec<StructuralElement<'a>> {
        let spans = line_spans(text);
        runs(text, &spans)
            .into_iter()
            .map(|run| {
                let first = &spans[run.lines.start];
                let last = &spans[run.lines.end - 1];
                let span = first.start..last.next;
                StructuralElement {
                    kind: run.kind,
                    content: &text[span.clone()],
                    span,
                    chars: spans[run.lines].iter().map(|s| s.chars).sum(),
                }
            })
            .collect()
    }

    pub fn chunk(&self, text: &str, target_size: usize) -> Vec<Chunk> {
        let target = target_size.max(1);
        let spans = line_spans(text);
        let runs = runs(text, &spans);
        let mut packer = Packer::new(text, &spans);

        for run in runs {
            let chars = packer.chars(run.lines.clone());
            if chars > target.saturating_mul(2) {
                if !packer.ends_on_heading() {
                    packer.flush();
                }
                if run.kind.is_atomic() {
                    packer.push(&run, chars);
                    packer.flush();
                } else {
                    packer.split_lines(&run, target);
                }
                continue;
            }

            let overflows = packer.pending_chars + chars > target;
            if !packer.is_empty()
                && overflows
                && run.kind.can_split()
                && !packer.ends_on_heading()
            {
                packer.flush();
            }
            packer.push(&run, chars);
        }
        packer.flush();
        packer.chunks
    }
}

/// Group lines into runs of one element type.
///
/// Fenced code and `$$` math run from their opening line to the matching
/// closing line, or to the end of the text when unterminated.
fn runs(text: &str, spans: &[LineSpan]) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::new();
    let mut line = 0;
    while line < spans.len() {
        let kind = classify_line(spans[line].text(text));
        let end = match kind {
            LineKind::Fence => closing_line(text, spans, line, is_fence),
            LineKind::MathFence if is_single_line_math(spans[line].text(text).trim_start()) => {
                line + 1
            }
            LineKind::MathFence => closing_line(text, spans, line, |t| t.starts_with("$$")),
            _ => line + 1,
        };
        let element = match kind {
            LineKind::Fence => ElementType::CodeBlock,
            LineKind::MathFence => ElementType::MathBlock,
            LineKind::Heading { .. } => ElementType::Heading,
            LineKind::ListItem { .. } => ElementType::List,
            LineKind::Blockquote => ElementType::Blockquote,
            LineKind::TableRow => ElementType::Table,
            LineKind::Separator => ElementType::Separator,
            LineKind::Blank => ElementType::BlankLine,
            LineKind::Text { indent } => match runs.last() {
                Some(previous) if previous.kind == ElementType::List && indent > 0 => {
                    ElementType::List
                }
                _ => ElementType::Paragraph,
            },
        };

        let mergeable = !element.is_atomic() || element == ElementType::Heading;
        match runs.last_mut() {
            Some(previous)
                if mergeable && previous.kind == element && previous.lines.end == line =>
            {
                previous.lines.end = end;
            }
            _ => runs.push(Run {
                kind: element,
                lines: line..end,
            }),
        }
        line = end;
    }
    runs
}

/// Exclusive end of a block opened at `open`, found by the first later line
/// whose trimmed text satisfies `closes`.
fn closing_line(
    text: &str,
    spans: &[LineSpan],
    open: usize,
    closes: impl Fn(&str) -> bool,
) -> usize {
    (open + 1..spans.len())
        .find(|&line| closes(spans[line].text(text).trim_start()))
        .map_or(spans.len(), |close| close + 1)
}

struct Packer<'s> {
    text: &'s str,
    spans: &'s [LineSpan],
    pending: Option<Range<usize>>,
    pending_chars: usize,
    last_content_kind: Option<ElementType>,
    chunks: Vec<Chunk>,
}

impl<'s> Packer<'s> {
    fn new(text: &'s str, spans: &'s [LineSpan]) -> Self {
        Self {
            text,
            spans,
            pending: None,
            pending_chars: 0,
            last_content_kind: None,
            chunks: Vec::new(),
        }
    }

    fn chars(&self, lines: Range<usize>) -> usize {
        self.spans[lines].iter().map(|s| s.chars).sum()
    }

    fn is_empty(&self) -> bool {
        self.pending.is_none()
    }

    /// A heading stays with the content that follows it.
    fn ends_on_heading(&self) -> bool {
        self.last_content_kind == Some(ElementType::Heading)
    }

    fn push(&mut self, run: &Run, chars: usize) {
        self.extend(run.lines.clone(), chars);
        if run.kind != ElementType::BlankLine {
            self.last_content_kind = Some(run.kind);
        }
    }

    fn extend(&mut self, lines: Range<usize>, chars: usize) {
        self.pending = Some(match self.pending.take() {
            Some(pending) => pending.start..lines.end,
            None => lines,
        });
        self.pending_chars += chars;
    }

    /// Raw line accumulation for oversized non-atomic elements.
    fn split_lines(&mut self, run: &Run, target: usize) {
        for line in run.lines.clone() {
            let chars = self.spans[line].chars;
            let overflows = self.pending_chars + chars > target;
            if !self.is_empty() && !self.ends_on_heading() && overflows {
                self.flush();
            }
            self.extend(line..line + 1, chars);
            self.last_content_kind = Some(run.kind);
        }
        self.flush();
    }

    fn flush(&mut self) {
        self.pending_chars = 0;
        self.last_content_kind = None;
        let Some(lines) = self.pending.take() else {
            return;
        };
        if let Some(chunk) = self.finish(lines) {
            self.chunks.push(chunk);
        }
    }

    /// Trim blank lines at both ends and close an unbalanced fence. The last
    /// kept line keeps its terminator so chunks join back into the source.
    fn finish(&self, lines: Range<usize>) -> Option<Chunk> {
        let is_blank = |line: &usize| self.spans[*line].text(self.text).trim().is_empty();
        let first = lines.clone().find(|line| !is_blank(line))?;
        let last = lines.rev().find(|line| !is_blank(line))?;

        let span = self.spans[first].start..self.spans[last].next;
        let body = &self.text[span.clone()];
        let fences = body.lines().filter(|line| is_fence(line.trim_start())).count();

        let mut chunk = Chunk::new(self.chunks.len(), body.to_string(), span);
        if fences % 2 == 1 {
            if !chunk.content.ends_with('\n') {
                chunk.content.push('\n');
            }
            chunk.content.push_str(SYNTHETIC_FENCE);
            chunk.chars = chunk.content.chars().count();
            chunk.synthetic_fence = true;
        }
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(StructuralChunker.chunk("", 100).is_empty());
        assert!(StructuralChunker.chunk("\n\n   \n", 100).is_empty());
    }

    #[test]
    fn merges_consecutive_lines_of_one_type() {
        let text = "# Title\nfirst line\nsecond line\n\n- a\n- b\n  continued\n```\ncode\n```\n$$\nx\n$$\n";
        let kinds: Vec<_> = StructuralChunker
            .elements(text)
            .iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                ElementType::Heading,
                ElementType::Paragraph,
                ElementType::BlankLine,
                ElementType::List,
                ElementType::CodeBlock,
                ElementType::MathBlock,
            ]
        );
    }

    #[test]
    fn elements_cover_the_source() {
        let text = "# A\n\n| x |\n| y |\ntext\n> q\n---\n";
        let elements = StructuralChunker.elements(text);
        let joined: String = elements.iter().map(|e| e.content).collect();
        assert_eq!(joined, text);
        assert_eq!(elements.iter().map(|e| e.chars).sum::<usize>(), text.chars().count());
    }

    #[test]
    fn small_document_is_one_chunk() {
        let text = "# Title\n\nSome text.\n";
        let chunks = StructuralChunker.chunk(text, 1000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, text);
        assert!(!chunks[0].synthetic_fence);
    }

    #[test]
    fn splits_before_paragraphs_once_target_is_reached() {
        let paragraph = "word ".repeat(10);
        let text = format!("{paragraph}\n\n{paragraph}\n\n{paragraph}\n");
        let chunks = StructuralChunker.chunk(&text, 60);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.content == format!("{paragraph}\n")));
        assert_eq!(
            chunks.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn heading_stays_with_following_content() {
        let text = format!("intro\n\n# Heading\n{}\n", "body ".repeat(20));
        let chunks = StructuralChunker.chunk(&text, 20);
        let heading = chunks
            .iter()
            .find(|c| c.content.contains("# Heading"))
            .map(|c| c.content.as_str());
        assert!(heading.is_some_and(|content| content.contains("body")));
    }

    #[test]
    fn oversized_code_block_is_kept_whole() {
        let body = "let value = compute();\n".repeat(100);
        let text = format!("```rust\n{body}```\n");
        let chunks = StructuralChunker.chunk(&text, 100);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].chars >= body.chars().count());
        assert_eq!(chunks[0].content, text);
        assert!(!chunks[0].synthetic_fence);
    }

    #[test]
    fn oversized_paragraph_is_split_by_lines() {
        let text = "a line of text\n".repeat(50);
        let chunks = StructuralChunker.chunk(&text, 100);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars <= 100));
        assert_eq!(chunks.iter().map(|c| c.content.as_str()).collect::<String>(), text);
    }

    #[test]
    fn paragraphs_in_separate_chunks_keep_their_line_break() {
        let chunks = StructuralChunker.chunk("first paragraph\n\nsecond paragraph\n", 16);
        let contents: Vec<_> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["first paragraph\n", "second paragraph\n"]);
        assert_eq!(contents.concat(), "first paragraph\nsecond paragraph\n");
    }

    #[test]
    fn synthetic_close_follows_an_unterminated_last_line() {
        let chunks = StructuralChunker.chunk("```\ncode", 100);
        assert_eq!(chunks[0].content, "```\ncode\n```\n");
        assert!(chunks[0].synthetic_fence);
    }

    #[test]
    fn unterminated_fence_gets_synthetic_close() {
        let text = "para\n\n```\nopen code\n";
        let chunks = StructuralChunker.chunk(text, 1000);
        let last = chunks.last().map(|c| c.content.as_str());
        assert_eq!(last, Some("para\n\n```\nopen code\n```\n"));
        assert!(chunks.iter().any(|c| c.synthetic_fence));
    }
}
