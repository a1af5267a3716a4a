//! Line-level Markdown recognisers shared by the analyser and the chunkers.
//!
//! Everything here works on borrowed slices of the source and records byte
//! offsets, so callers can cut chunks without re-allocating lines.

/// Position of one source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset just past the line body, terminator excluded.
    pub end: usize,
    /// Byte offset of the following line (terminator included).
    pub next: usize,
    /// Characters in the line including its terminator.
    pub chars: usize,
}

impl LineSpan {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

/// Split `source` into lines, accepting both `\n` and `\r\n` terminators.
pub fn line_spans(source: &str) -> Vec<LineSpan> {
    let mut spans = Vec::new();
    let mut start = 0;
    for piece in source.split_inclusive('\n') {
        let next = start + piece.len();
        let body = piece.strip_suffix('\n').unwrap_or(piece);
        let body = body.strip_suffix('\r').unwrap_or(body);
        spans.push(LineSpan {
            start,
            end: start + body.len(),
            next,
            chars: piece.chars().count(),
        });
        start = next;
    }
    spans
}

/// Prefix-based classification of a single line, independent of its neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    Heading { level: u8 },
    Fence,
    MathFence,
    ListItem { indent: usize },
    Blockquote,
    TableRow,
    Separator,
    Text { indent: usize },
}

pub fn classify_line(line: &str) -> LineKind {
    let trimmed = line.trim_start();
    if trimmed.trim_end().is_empty() {
        return LineKind::Blank;
    }
    let indent = indent_width(line);

    if is_fence(trimmed) {
        LineKind::Fence
    } else if trimmed.starts_with("$$") {
        LineKind::MathFence
    } else if trimmed.starts_with('#') {
        let hashes = trimmed.bytes().take_while(|byte| *byte == b'#').count();
        LineKind::Heading {
            level: hashes.min(6) as u8,
        }
    } else if is_separator(trimmed) {
        LineKind::Separator
    } else if is_list_marker(trimmed) {
        LineKind::ListItem { indent }
    } else if trimmed.starts_with('>') {
        LineKind::Blockquote
    } else if trimmed.contains('|') {
        LineKind::TableRow
    } else {
        LineKind::Text { indent }
    }
}

/// Code fence marker: three backticks after optional indentation.
pub fn is_fence(trimmed: &str) -> bool {
    trimmed.starts_with("```")
}

/// Whether a `$$` line both opens and closes a display formula.
pub fn is_single_line_math(trimmed: &str) -> bool {
    let body = trimmed.trim_end();
    body.len() > 4 && body.starts_with("$$") && body.ends_with("$$")
}

fn is_separator(trimmed: &str) -> bool {
    let body = trimmed.trim_end();
    let Some(marker) = body.chars().next() else {
        return false;
    };
    if marker != '-' && marker != '*' {
        return false;
    }
    body.chars().filter(|c| *c == marker).count() >= 3
        && body.chars().all(|c| c == marker || c == ' ')
}

fn is_list_marker(trimmed: &str) -> bool {
    let bytes = trimmed.as_bytes();
    let followed_by_space = |at: usize| bytes.get(at).is_none_or(|b| b.is_ascii_whitespace());

    match bytes.first() {
        Some(b'-' | b'*' | b'+') => followed_by_space(1),
        Some(b) if b.is_ascii_digit() => {
            let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
            digits <= 9
                && matches!(bytes.get(digits), Some(b'.' | b')'))
                && followed_by_space(digits + 1)
        }
        _ => false,
    }
}

/// Leading whitespace width with tabs counted as four columns.
pub fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_cover_source_exactly() {
        let source = "one\r\ntwo\n\nthree";
        let spans = line_spans(source);
        assert_eq!(spans.len(), 4);
        assert_eq!(spans[0].text(source), "one");
        assert_eq!(spans[0].next, 5);
        assert_eq!(spans[2].text(source), "");
        assert_eq!(spans[3].text(source), "three");
        assert_eq!(spans[3].next, source.len());
        assert_eq!(spans.iter().map(|s| s.chars).sum::<usize>(), source.chars().count());
        assert!(line_spans("").is_empty());
    }

    #[test]
    fn classifies_by_prefix() {
        assert_eq!(classify_line("## Setup"), LineKind::Heading { level: 2 });
        assert_eq!(classify_line("```rust"), LineKind::Fence);
        assert_eq!(classify_line("  ```"), LineKind::Fence);
        assert_eq!(classify_line("$$"), LineKind::MathFence);
        assert_eq!(classify_line("- item"), LineKind::ListItem { indent: 0 });
        assert_eq!(classify_line("    * nested"), LineKind::ListItem { indent: 4 });
        assert_eq!(classify_line("12. twelfth"), LineKind::ListItem { indent: 0 });
        assert_eq!(classify_line("> quoted"), LineKind::Blockquote);
        assert_eq!(classify_line("| a | b |"), LineKind::TableRow);
        assert_eq!(classify_line("---"), LineKind::Separator);
        assert_eq!(classify_line("* * *"), LineKind::Separator);
        assert_eq!(classify_line("   "), LineKind::Blank);
        assert_eq!(classify_line("plain words"), LineKind::Text { indent: 0 });
    }

    #[test]
    fn emphasis_is_not_a_list_or_separator() {
        assert_eq!(classify_line("**bold** text"), LineKind::Text { indent: 0 });
        assert_eq!(classify_line("***both***"), LineKind::Text { indent: 0 });
        assert_eq!(classify_line("-5 degrees"), LineKind::Text { indent: 0 });
    }

    #[test]
    fn single_line_display_math() {
        assert!(is_single_line_math("$$x^2$$"));
        assert!(!is_single_line_math("$$"));
        assert!(!is_single_line_math("$$ x + y"));
    }
}
