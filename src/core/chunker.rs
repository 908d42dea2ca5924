//! Size-bounded splitting of source text into chunks.
//!
//! Sizes are measured in characters (Unicode scalar values), so a chunk never
//! ends in the middle of a UTF-8 sequence. Splitting is lazy: [`Chunks`] walks
//! the input once and yields each chunk as it is requested.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DocscribeError, Result};

/// Where chunk boundaries may be placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    /// Fixed-width slices of exactly `limit` characters
    Exact,

    /// Whole lines packed greedily; a line longer than the limit is an error
    Line,
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Boundary::Exact => write!(f, "exact"),
            Boundary::Line => write!(f, "line"),
        }
    }
}

/// A contiguous slice of the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Sequence number, starting at 0
    pub index: usize,

    /// The chunk text, borrowed from the input
    pub content: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkSplitter {
    limit: usize,
    boundary: Boundary,
}

impl ChunkSplitter {
    pub fn new(limit: usize, boundary: Boundary) -> Result<Self> {
        if limit == 0 {
            return Err(DocscribeError::Config(
                "Chunk size must be greater than zero".to_string(),
            ));
        }

        Ok(Self { limit, boundary })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn boundary(&self) -> Boundary {
        self.boundary
    }

    /// Lazily split `text`. Input that fits the limit yields exactly one chunk.
    pub fn split<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks {
            rest: text,
            remaining_chars: text.chars().count(),
            limit: self.limit,
            boundary: self.boundary,
            next_index: 0,
            lines_consumed: 0,
            done: false,
        }
    }
}

/// Single-pass iterator over the chunks of one input
pub struct Chunks<'a> {
    rest: &'a str,
    remaining_chars: usize,
    limit: usize,
    boundary: Boundary,
    next_index: usize,
    lines_consumed: usize,
    done: bool,
}

impl<'a> Chunks<'a> {
    fn emit(&mut self, end: usize, chars: usize) -> Chunk<'a> {
        let (content, rest) = self.rest.split_at(end);
        self.rest = rest;
        self.remaining_chars -= chars;

        let chunk = Chunk {
            index: self.next_index,
            content,
        };
        self.next_index += 1;
        chunk
    }

    fn next_exact(&mut self) -> Chunk<'a> {
        let end = self
            .rest
            .char_indices()
            .nth(self.limit)
            .map(|(offset, _)| offset)
            .unwrap_or(self.rest.len());
        let chars = self.limit.min(self.remaining_chars);
        self.emit(end, chars)
    }

    fn next_lines(&mut self) -> Result<Chunk<'a>> {
        let mut end = 0;
        let mut chars = 0;
        let mut lines = 0;

        for line in self.rest.split_inclusive('\n') {
            let length = line.chars().count();

            if length > self.limit {
                if lines == 0 {
                    return Err(DocscribeError::InputTooLarge {
                        line: self.lines_consumed + 1,
                        length,
                        limit: self.limit,
                    });
                }
                break;
            }

            if chars + length > self.limit {
                break;
            }

            end += line.len();
            chars += length;
            lines += 1;
        }

        self.lines_consumed += lines;
        Ok(self.emit(end, chars))
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Result<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        // Whatever is left fits: emit it whole and stop. Covers empty input too.
        if self.remaining_chars <= self.limit {
            self.done = true;
            if self.rest.is_empty() && self.next_index > 0 {
                return None;
            }
            let end = self.rest.len();
            let chars = self.remaining_chars;
            return Some(Ok(self.emit(end, chars)));
        }

        match self.boundary {
            Boundary::Exact => Some(Ok(self.next_exact())),
            Boundary::Line => {
                let result = self.next_lines();
                if result.is_err() {
                    self.done = true;
                }
                Some(result)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(splitter: &ChunkSplitter, text: &str) -> Vec<String> {
        splitter
            .split(text)
            .map(|c| c.unwrap().content.to_string())
            .collect()
    }

    #[test]
    fn test_small_input_is_single_chunk() {
        let splitter = ChunkSplitter::new(100, Boundary::Exact).unwrap();
        let chunks: Vec<_> = splitter.split("fn main() {}").collect::<Result<_>>().unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].content, "fn main() {}");

        let line_splitter = ChunkSplitter::new(12, Boundary::Line).unwrap();
        assert_eq!(collect(&line_splitter, "fn main() {}"), vec!["fn main() {}"]);
    }

    #[test]
    fn test_empty_input_yields_one_empty_chunk() {
        for boundary in [Boundary::Exact, Boundary::Line] {
            let splitter = ChunkSplitter::new(10, boundary).unwrap();
            assert_eq!(collect(&splitter, ""), vec![""]);
        }
    }

    #[test]
    fn test_exact_sizes_for_twelve_thousand_chars() {
        let text = "x".repeat(12_000);
        let splitter = ChunkSplitter::new(5_000, Boundary::Exact).unwrap();
        let sizes: Vec<usize> = splitter.split(&text).map(|c| c.unwrap().content.chars().count()).collect();
        assert_eq!(sizes, vec![5_000, 5_000, 2_000]);
    }

    #[test]
    fn test_exact_concatenation_reconstructs_input() {
        let text: String = (0..997).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let splitter = ChunkSplitter::new(64, Boundary::Exact).unwrap();
        let chunks: Vec<_> = splitter.split(&text).collect::<Result<_>>().unwrap();

        let indices: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, (0..chunks.len()).collect::<Vec<_>>());
        assert_eq!(chunks.iter().map(|c| c.content).collect::<String>(), text);
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 64));
    }

    #[test]
    fn test_exact_respects_multibyte_chars() {
        let text = "héllo wörld ✓✓✓";
        let splitter = ChunkSplitter::new(4, Boundary::Exact).unwrap();
        let chunks = collect(&splitter, text);
        assert_eq!(chunks[0], "héll");
        assert_eq!(chunks.concat(), text);
        assert!(chunks.iter().all(|c| c.chars().count() <= 4));
    }

    #[test]
    fn test_line_mode_keeps_lines_whole() {
        let text = "alpha\nbeta\ngamma\ndelta\n";
        let splitter = ChunkSplitter::new(12, Boundary::Line).unwrap();
        let chunks = collect(&splitter, text);

        assert_eq!(chunks, vec!["alpha\nbeta\n", "gamma\ndelta\n"]);
        assert!(chunks.iter().all(|c| c.ends_with('\n')));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_line_mode_without_trailing_newline() {
        let text = "one\ntwo\nthree";
        let splitter = ChunkSplitter::new(8, Boundary::Line).unwrap();
        assert_eq!(collect(&splitter, text), vec!["one\ntwo\n", "three"]);
    }

    #[test]
    fn test_line_mode_rejects_oversized_line() {
        let text = "short\nthis line is far too long\nshort\n";
        let splitter = ChunkSplitter::new(10, Boundary::Line).unwrap();
        let mut chunks = splitter.split(text);

        assert_eq!(chunks.next().unwrap().unwrap().content, "short\n");
        match chunks.next().unwrap() {
            Err(DocscribeError::InputTooLarge { line, length, limit }) => {
                assert_eq!(line, 2);
                assert_eq!(length, 26);
                assert_eq!(limit, 10);
            }
            other => panic!("expected InputTooLarge, got {:?}", other),
        }
        assert!(chunks.next().is_none());
    }

    #[test]
    fn test_zero_limit_rejected() {
        assert!(matches!(
            ChunkSplitter::new(0, Boundary::Exact),
            Err(DocscribeError::Config(_))
        ));
    }
}
