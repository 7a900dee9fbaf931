//! Separator-aware text chunking with character overlap.
//!
//! Text longer than `max_chars` is cut into contiguous pieces of at most
//! `max_chars - overlap` characters, trying paragraph breaks first, then line
//! breaks, sentence ends, spaces and finally raw character boundaries.
//! Whitespace-only pieces are dropped. Each chunk after the first is then
//! prefixed with the last `overlap` characters of the chunk before it, so
//! consecutive chunks share an exact suffix/prefix and no chunk exceeds
//! `max_chars`.
//!
//! All sizes are counted in `char`s, never bytes.

use crate::config::ChunkingSettings;
use crate::error::{Error, Result};

/// Coarsest first. The empty level splits on any character boundary.
const SEPARATOR_LEVELS: &[&[&str]] = &[&["\n\n"], &["\n"], &[". ", "! ", "? "], &[" "], &[]];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    max_chars: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self { max_chars: 500, overlap: 50 }
    }
}

impl Chunker {
    pub fn new(max_chars: usize, overlap: usize) -> Result<Self> {
        if max_chars == 0 {
            return Err(Error::InvalidConfig("chunk size must be positive".into()));
        }
        if overlap >= max_chars {
            return Err(Error::InvalidConfig(format!(
                "chunk overlap ({overlap}) must be smaller than chunk size ({max_chars})"
            )));
        }
        Ok(Self { max_chars, overlap })
    }

    pub fn from_settings(settings: &ChunkingSettings) -> Result<Self> {
        Self::new(settings.max_chars, settings.overlap)
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into ordered chunk texts.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        if char_len(text) <= self.max_chars {
            return vec![text.to_string()];
        }

        let budget = self.max_chars - self.overlap;
        let mut pieces = Vec::new();
        split_span(text, 0, text.len(), SEPARATOR_LEVELS, budget, &mut pieces);

        let mut chunks: Vec<String> = Vec::with_capacity(pieces.len());
        for (start, end) in pieces {
            let piece = &text[start..end];
            if piece.trim().is_empty() {
                continue;
            }
            let chunk = match chunks.last() {
                Some(prev) => {
                    let mut chunk = last_chars(prev, self.overlap).to_string();
                    chunk.push_str(piece);
                    chunk
                }
                None => piece.to_string(),
            };
            chunks.push(chunk);
        }
        chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// The trailing `n` characters of `s` (all of it when shorter).
fn last_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let start = s.char_indices().rev().nth(n - 1).map_or(0, |(i, _)| i);
    &s[start..]
}

/// Partition `text[start..end]` into contiguous spans of at most `budget` chars.
fn split_span(
    text: &str,
    start: usize,
    end: usize,
    levels: &[&[&str]],
    budget: usize,
    out: &mut Vec<(usize, usize)>,
) {
    if char_len(&text[start..end]) <= budget {
        out.push((start, end));
        return;
    }
    let Some((patterns, finer)) = levels.split_first() else {
        split_chars(text, start, end, budget, out);
        return;
    };
    if patterns.is_empty() {
        split_chars(text, start, end, budget, out);
        return;
    }

    let cuts = segment_ends(&text[start..end], patterns);
    if cuts.is_empty() {
        split_span(text, start, end, finer, budget, out);
        return;
    }

    let mut bounds = Vec::with_capacity(cuts.len() + 2);
    bounds.push(start);
    bounds.extend(cuts.into_iter().map(|c| start + c));
    bounds.push(end);

    // Greedily merge adjacent segments; oversized ones go one level finer.
    let mut group: Option<(usize, usize, usize)> = None;
    for w in bounds.windows(2) {
        let (s, e) = (w[0], w[1]);
        let n = char_len(&text[s..e]);
        if n > budget {
            if let Some((gs, ge, _)) = group.take() {
                out.push((gs, ge));
            }
            split_span(text, s, e, finer, budget, out);
            continue;
        }
        group = match group {
            Some((gs, _, gn)) if gn + n <= budget => Some((gs, e, gn + n)),
            Some((gs, ge, _)) => {
                out.push((gs, ge));
                Some((s, e, n))
            }
            None => Some((s, e, n)),
        };
    }
    if let Some((gs, ge, _)) = group {
        out.push((gs, ge));
    }
}

/// Byte offsets just past each separator occurrence, excluding the span end.
fn segment_ends(span: &str, patterns: &[&str]) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut i = 0;
    while i < span.len() {
        match patterns.iter().find(|p| span[i..].starts_with(**p)) {
            Some(p) => {
                i += p.len();
                if i < span.len() {
                    ends.push(i);
                }
            }
            None => i += span[i..].chars().next().map_or(1, char::len_utf8),
        }
    }
    ends
}

fn split_chars(
    text: &str,
    start: usize,
    end: usize,
    budget: usize,
    out: &mut Vec<(usize, usize)>,
) {
    let mut piece_start = start;
    let mut count = 0usize;
    for (i, _) in text[start..end].char_indices() {
        if count == budget {
            out.push((piece_start, start + i));
            piece_start = start + i;
            count = 0;
        }
        count += 1;
    }
    if piece_start < end {
        out.push((piece_start, end));
    }
}
