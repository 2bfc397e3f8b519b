//! Byte offset ↔ LSP position conversion.
//!
//! The analysis core works in byte offsets; LSP positions are zero-based
//! lines with UTF-16 code-unit characters. The index pre-computes line
//! start offsets once per revision so every conversion is a binary search
//! plus one in-line scan.

use tower_lsp::lsp_types::{Position, Range};

use gscls_base::Span;

#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset where each line begins; index 0 is always 0.
    line_starts: Vec<usize>,
    source: String,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        LineIndex {
            line_starts,
            source: source.to_string(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn position(&self, byte_offset: usize) -> Position {
        let byte_offset = byte_offset.min(self.source.len());
        let line = self
            .line_starts
            .partition_point(|&start| start <= byte_offset)
            .saturating_sub(1);
        let character = self.source[self.line_starts[line]..byte_offset]
            .encode_utf16()
            .count() as u32;
        Position {
            line: line as u32,
            character,
        }
    }

    pub fn range(&self, span: Span) -> Range {
        Range {
            start: self.position(span.start),
            end: self.position(span.end),
        }
    }

    pub fn offset(&self, position: Position) -> usize {
        let line = position.line as usize;
        if line >= self.line_starts.len() {
            return self.source.len();
        }
        let line_start = self.line_starts[line];
        let line_end = self
            .line_starts
            .get(line + 1)
            .copied()
            .unwrap_or(self.source.len());

        let mut utf16_seen = 0u32;
        for (byte_idx, ch) in self.source[line_start..line_end].char_indices() {
            if utf16_seen >= position.character {
                return line_start + byte_idx;
            }
            utf16_seen += ch.len_utf16() as u32;
        }
        line_end
    }

    /// UTF-16 length of a byte range, as semantic-token encoding needs.
    pub fn utf16_len(&self, span: Span) -> u32 {
        let start = span.start.min(self.source.len());
        let end = span.end.min(self.source.len());
        if start >= end {
            return 0;
        }
        self.source[start..end].encode_utf16().count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_across_lines() {
        let idx = LineIndex::new("abc\ndef\nghi");
        assert_eq!(idx.position(0), Position::new(0, 0));
        assert_eq!(idx.position(4), Position::new(1, 0));
        assert_eq!(idx.position(7), Position::new(1, 3));
        assert_eq!(idx.position(8), Position::new(2, 0));
    }

    #[test]
    fn offset_position_round_trip() {
        let src = "function f() {\n    wait 0.05;\n}\n";
        let idx = LineIndex::new(src);
        for offset in 0..src.len() {
            assert_eq!(idx.offset(idx.position(offset)), offset, "offset {offset}");
        }
    }

    #[test]
    fn multibyte_characters_count_in_utf16() {
        // 'é' is two UTF-8 bytes but one UTF-16 unit.
        let src = "é = 1;";
        let idx = LineIndex::new(src);
        let pos = idx.position(2);
        assert_eq!(pos.character, 1);
        assert_eq!(idx.utf16_len(Span::new(0, 2)), 1);
    }

    #[test]
    fn out_of_bounds_clamps() {
        let idx = LineIndex::new("ab");
        assert_eq!(idx.position(99), Position::new(0, 2));
        assert_eq!(idx.offset(Position::new(9, 9)), 2);
    }

    #[test]
    fn crlf_line_breaks() {
        let idx = LineIndex::new("ab\r\ncd");
        assert_eq!(idx.position(4), Position::new(1, 0));
    }

    #[test]
    fn empty_source() {
        let idx = LineIndex::new("");
        assert_eq!(idx.position(0), Position::new(0, 0));
        assert_eq!(idx.offset(Position::new(0, 0)), 0);
        assert_eq!(idx.line_count(), 1);
    }
}
