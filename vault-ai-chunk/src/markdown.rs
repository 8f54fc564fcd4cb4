//! Markdown header-hierarchy chunking for vault notes.
//!
//! A note is split into sections along ATX header boundaries (`#` through
//! `######`), each section carrying the full heading path from the document
//! root down to its own heading. Sections that exceed the configured maximum
//! are split again on paragraph (blank-line) boundaries; runs of tiny sibling
//! sections are merged forward so retrieval doesn't drown in micro-chunks.
//!
//! The produced chunks are byte ranges that tile the input exactly: they are
//! non-overlapping and, concatenated in sequence order, reconstruct the note
//! body. That property is what lets the retrieval layer re-slice excerpts out
//! of the live file from stored offsets.
//!
//! ```
//! use vault_ai_chunk::{ChunkerConfig, MarkdownChunker};
//!
//! let chunker = MarkdownChunker::new(ChunkerConfig::default());
//! let chunks = chunker.chunk("# Project\n\nNotes about the project.\n");
//! assert_eq!(chunks[0].heading_path, vec!["Project".to_string()]);
//! ```

use regex::Regex;
use serde::Serialize;
use std::ops::Range;

/// Configuration for the markdown chunker.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Maximum size of a chunk in bytes; larger sections fall back to
    /// paragraph splitting.
    pub max_chunk_chars: usize,
    /// Sections shorter than this are merged with a following sibling under
    /// the same parent heading.
    pub min_chunk_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 2000,
            min_chunk_chars: 128,
        }
    }
}

impl ChunkerConfig {
    pub fn new(max_chunk_chars: usize, min_chunk_chars: usize) -> Self {
        Self {
            max_chunk_chars,
            min_chunk_chars,
        }
    }
}

/// A contiguous span of a note, bounded by header or paragraph boundaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteChunk {
    /// Ordered header titles from the document root to this chunk,
    /// e.g. `["Project X", "Architecture", "Core"]`. Empty for content
    /// before the first header or in headerless notes.
    pub heading_path: Vec<String>,
    /// Start byte offset within the note.
    pub start: usize,
    /// End byte offset within the note (exclusive).
    pub end: usize,
    /// The chunk text, identical to the `start..end` slice of the note.
    pub text: String,
    /// Position among the note's chunks, 0-indexed.
    pub sequence: usize,
}

/// One header-delimited section before merging and size splitting.
#[derive(Debug, Clone)]
struct Section {
    span: Range<usize>,
    heading_path: Vec<String>,
}

impl Section {
    fn len(&self) -> usize {
        self.span.end - self.span.start
    }

    /// Heading paths are siblings when everything but the last element agrees.
    fn parent(&self) -> &[String] {
        let n = self.heading_path.len();
        &self.heading_path[..n.saturating_sub(1)]
    }
}

/// Splits note text into heading-path-tagged chunks. See module docs.
#[derive(Debug, Clone)]
pub struct MarkdownChunker {
    config: ChunkerConfig,
    header_re: Regex,
}

impl MarkdownChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self {
            config,
            // ATX headers: 1-6 hashes, at least one space, then the title.
            header_re: Regex::new(r"^(#{1,6})[ \t]+(.*)$").expect("static header pattern"),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ChunkerConfig::default())
    }

    /// Chunk a note body. Empty or whitespace-only input yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<NoteChunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let sections = self.merge_small_siblings(self.split_sections(text));

        let mut chunks = Vec::new();
        for section in sections {
            for span in self.split_oversize(text, section.span.clone()) {
                chunks.push(NoteChunk {
                    heading_path: section.heading_path.clone(),
                    start: span.start,
                    end: span.end,
                    text: text[span.clone()].to_string(),
                    sequence: chunks.len(),
                });
            }
        }
        chunks
    }

    /// Walk the note line by line and cut a section at every ATX header
    /// outside fenced code blocks. The heading path is maintained with a
    /// level stack: a level-N header pops every open heading at level >= N.
    fn split_sections(&self, text: &str) -> Vec<Section> {
        let mut headings: Vec<(usize, usize, String)> = Vec::new();
        let mut in_fence = false;
        let mut offset = 0;

        for line in text.split_inclusive('\n') {
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
            } else if !in_fence {
                if let Some(caps) = self.header_re.captures(line.trim_end_matches('\n')) {
                    let level = caps[1].len();
                    let title = caps[2].trim().to_string();
                    headings.push((offset, level, title));
                }
            }
            offset += line.len();
        }

        if headings.is_empty() {
            return vec![Section {
                span: 0..text.len(),
                heading_path: Vec::new(),
            }];
        }

        let mut sections = Vec::new();
        let first_start = headings[0].0;
        if first_start > 0 && !text[..first_start].trim().is_empty() {
            sections.push(Section {
                span: 0..first_start,
                heading_path: Vec::new(),
            });
        }
        // A whitespace-only preamble is absorbed into the first section so
        // the chunks still tile the whole note.
        let mut absorb_start = if sections.is_empty() { Some(0) } else { None };

        let mut stack: Vec<(usize, String)> = Vec::new();
        for (i, (start, level, title)) in headings.iter().enumerate() {
            while stack.last().is_some_and(|(l, _)| l >= level) {
                stack.pop();
            }
            stack.push((*level, title.clone()));

            let span_start = absorb_start.take().unwrap_or(*start);
            let span_end = headings.get(i + 1).map(|h| h.0).unwrap_or(text.len());
            sections.push(Section {
                span: span_start..span_end,
                heading_path: stack.iter().map(|(_, t)| t.clone()).collect(),
            });
        }
        sections
    }

    /// Merge runs of short sections that share a parent heading, so a note
    /// full of one-line subsections doesn't produce degenerate micro-chunks.
    /// The merged section keeps the first section's heading path.
    fn merge_small_siblings(&self, sections: Vec<Section>) -> Vec<Section> {
        let min = self.config.min_chunk_chars;
        let max = self.config.max_chunk_chars;

        let mut merged: Vec<Section> = Vec::new();
        for section in sections {
            if let Some(prev) = merged.last_mut() {
                let both_small = prev.len() < min && section.len() < min;
                let siblings = prev.parent() == section.parent();
                let fits = prev.len() + section.len() <= max;
                if both_small && siblings && fits {
                    prev.span.end = section.span.end;
                    continue;
                }
            }
            merged.push(section);
        }
        merged
    }

    /// Split a section that exceeds the maximum on paragraph boundaries,
    /// falling back to line/space boundaries for a single oversize paragraph.
    fn split_oversize(&self, text: &str, span: Range<usize>) -> Vec<Range<usize>> {
        let max = self.config.max_chunk_chars;
        if span.end - span.start <= max {
            return vec![span];
        }

        let mut pieces = Vec::new();
        let mut current = span.start..span.start;
        for para in paragraph_spans(text, span.clone()) {
            if para.end - para.start > max {
                if current.start != current.end {
                    pieces.push(current.clone());
                }
                pieces.extend(hard_split(text, para, max));
                current = pieces.last().map(|p| p.end..p.end).unwrap_or(current);
                continue;
            }
            if current.end - current.start + (para.end - para.start) > max
                && current.start != current.end
            {
                pieces.push(current.clone());
                current = para.start..para.start;
            }
            current.end = para.end;
        }
        if current.start != current.end {
            pieces.push(current);
        }
        pieces
    }
}

/// Paragraph spans within `span`: a new paragraph begins at the first
/// non-blank line after one or more blank lines. Trailing blank lines stay
/// attached to the preceding paragraph, so the spans tile `span` exactly.
fn paragraph_spans(text: &str, span: Range<usize>) -> Vec<Range<usize>> {
    let slice = &text[span.clone()];
    let mut boundaries = vec![span.start];
    let mut after_blank = false;
    let mut offset = 0;

    for line in slice.split_inclusive('\n') {
        let blank = line.trim().is_empty();
        if after_blank && !blank && offset > 0 {
            boundaries.push(span.start + offset);
        }
        after_blank = blank;
        offset += line.len();
    }
    boundaries.push(span.end);

    boundaries
        .windows(2)
        .filter(|w| w[1] > w[0])
        .map(|w| w[0]..w[1])
        .collect()
}

/// Hard-split an oversize paragraph into pieces of at most `max` bytes.
/// Prefers the last newline, then the last space, inside each window; only
/// cuts mid-word when no such boundary exists. Never splits a codepoint.
fn hard_split(text: &str, span: Range<usize>, max: usize) -> Vec<Range<usize>> {
    let mut pieces = Vec::new();
    let mut start = span.start;
    while start < span.end {
        if span.end - start <= max {
            pieces.push(start..span.end);
            break;
        }
        let mut window_end = floor_char_boundary(text, start + max);
        if window_end <= start {
            // max is smaller than the codepoint at `start`; take the whole
            // codepoint so the split always advances.
            window_end = ceil_char_boundary(text, start + 1);
        }
        let window = &text[start..window_end];
        let cut = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .map(|pos| start + pos + 1)
            .filter(|&pos| pos > start)
            .unwrap_or(window_end);
        pieces.push(start..cut);
        start = cut;
    }
    pieces
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}
