use crate::diagnostics::Span;
use rustpython_ast::TextSize;
use sha2::{Digest, Sha256};

/// A utility struct to convert byte offsets to line and column numbers.
///
/// This is necessary because the AST parser works with byte offsets,
/// but we want to report findings with line numbers which are more human-readable.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Stores the byte index of the start of each line.
    line_starts: Vec<usize>,
}

impl LineIndex {
    /// Creates a new `LineIndex` by scanning the source code for newlines.
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, ch) in source.char_indices() {
            if ch == '\n' {
                // Record the start of the next line (current newline index + 1)
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// Converts a `TextSize` (byte offset) to a 1-indexed line number.
    pub fn line_index(&self, offset: TextSize) -> usize {
        self.line_of(offset.to_usize())
    }

    fn line_of(&self, offset: usize) -> usize {
        // Binary search to find which line range the offset falls into.
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line + 1,
            Err(line) => line,
        }
    }

    /// Converts a byte offset into a 1-indexed (line, column) pair.
    /// Columns count characters from the start of the line.
    pub fn line_col(&self, source: &str, offset: TextSize) -> (usize, usize) {
        let offset = offset.to_usize().min(source.len());
        let line = self.line_of(offset);
        let start = self.line_starts[line - 1];
        let column = source
            .get(start..offset)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(offset - start);
        (line, column + 1)
    }

    /// Builds a `Span` from a start/end byte offset pair.
    pub fn span(&self, source: &str, start: TextSize, end: TextSize) -> Span {
        let (start_line, start_column) = self.line_col(source, start);
        let (end_line, end_column) = self.line_col(source, end);
        Span::new(start_line, start_column, end_line, end_column)
    }

    /// Number of lines in the indexed source.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

/// SHA-256 hex digest of arbitrary bytes. Used for unit and configuration fingerprints.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index_lines() {
        let source = "a = 1\nb = 2\n\nc = 3\n";
        let index = LineIndex::new(source);

        assert_eq!(index.line_index(TextSize::from(0)), 1);
        assert_eq!(index.line_index(TextSize::from(6)), 2);
        assert_eq!(index.line_index(TextSize::from(13)), 4);
        assert_eq!(index.line_count(), 5);
    }

    #[test]
    fn test_line_col_counts_characters() {
        let source = "x = 'é'; eval(x)\n";
        let index = LineIndex::new(source);
        let eval_offset = source.find("eval").unwrap() as u32;

        let (line, col) = index.line_col(source, TextSize::from(eval_offset));
        assert_eq!(line, 1);
        // 'é' is two bytes but one character.
        assert_eq!(col, 10);
    }

    #[test]
    fn test_sha256_hex_is_stable() {
        let a = sha256_hex(b"print('hi')\n");
        let b = sha256_hex(b"print('hi')\n");
        let c = sha256_hex(b"print('ho')\n");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
