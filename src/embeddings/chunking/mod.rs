
use std::collections::VecDeque;
use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::loader::{Document, DocumentMetadata};

/// Separators tried in order, coarsest first. The empty separator splits into characters.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// Represents a chunk of a document ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Stable identifier derived from the source location and content
    pub id: String,
    /// The content text
    pub content: String,
    /// Metadata inherited from the source document
    pub metadata: DocumentMetadata,
    /// The index of this chunk within its document
    pub chunk_index: usize,
    /// Byte offset of the chunk within the document text
    pub start_index: usize,
}

/// A piece of text located in its source string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub text: String,
    /// Byte offset of `text` in the source string
    pub start: usize,
}

impl TextSpan {
    /// Byte offset one past the end of the span
    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }
}

/// Configuration for document chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Maximum number of characters shared by consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkingConfig {
    fn check(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("Chunk size must be greater than zero");
        }
        if self.chunk_overlap >= self.chunk_size {
            bail!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        Ok(())
    }
}

/// Split every document into bounded, overlapping chunks
#[inline]
pub fn chunk_documents(documents: &[Document], config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    config.check()?;

    let mut chunks = Vec::new();
    for document in documents {
        let spans = split_ranges(&document.content, config);
        for (chunk_index, range) in spans.into_iter().enumerate() {
            let content = document.content[range.clone()].to_string();
            chunks.push(Chunk {
                id: chunk_id(&document.metadata, chunk_index, &content),
                content,
                metadata: document.metadata.clone(),
                chunk_index,
                start_index: range.start,
            });
        }
    }

    debug!(
        "Split {} documents into {} chunks (avg {} chars)",
        documents.len(),
        chunks.len(),
        chunks
            .iter()
            .map(|c| c.content.chars().count())
            .sum::<usize>()
            / chunks.len().max(1)
    );

    Ok(chunks)
}

/// Split a single text into spans no longer than `chunk_size` characters
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Result<Vec<TextSpan>> {
    config.check()?;

    Ok(split_ranges(text, config)
        .into_iter()
        .map(|range| TextSpan {
            text: text[range.clone()].to_string(),
            start: range.start,
        })
        .collect())
}

fn split_ranges(text: &str, config: &ChunkingConfig) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    split_recursive(text, 0..text.len(), DEFAULT_SEPARATORS, config, &mut out);
    out
}

/// Split `range` on the coarsest separator it contains, recursing into pieces that are too long
fn split_recursive(
    text: &str,
    range: Range<usize>,
    separators: &[&str],
    config: &ChunkingConfig,
    out: &mut Vec<Range<usize>>,
) {
    let segment = &text[range.clone()];

    let mut separator = separators.last().copied().unwrap_or("");
    let mut finer: &[&str] = &[];
    for (i, candidate) in separators.iter().enumerate() {
        if candidate.is_empty() {
            separator = candidate;
            break;
        }
        if segment.contains(candidate) {
            separator = candidate;
            finer = &separators[i + 1..];
            break;
        }
    }

    let mut good: Vec<Range<usize>> = Vec::new();
    for piece in split_keeping_separator(segment, separator) {
        let piece = (range.start + piece.start)..(range.start + piece.end);
        if char_len(text, &piece) < config.chunk_size {
            good.push(piece);
            continue;
        }

        if !good.is_empty() {
            merge_pieces(text, &good, config, out);
            good.clear();
        }

        if finer.is_empty() {
            push_trimmed(text, piece, out);
        } else {
            split_recursive(text, piece, finer, config, out);
        }
    }

    if !good.is_empty() {
        merge_pieces(text, &good, config, out);
    }
}

/// Split on `separator`, attaching each separator to the start of the piece that follows it
fn split_keeping_separator(segment: &str, separator: &str) -> Vec<Range<usize>> {
    if separator.is_empty() {
        return segment
            .char_indices()
            .map(|(i, c)| i..i + c.len_utf8())
            .collect();
    }

    let mut boundaries: Vec<usize> = segment.match_indices(separator).map(|(i, _)| i).collect();
    boundaries.push(segment.len());

    let mut pieces = Vec::with_capacity(boundaries.len());
    let mut start = 0;
    for boundary in boundaries {
        if boundary > start {
            pieces.push(start..boundary);
        }
        start = boundary;
    }
    pieces
}

/// Merge short pieces into windows of at most `chunk_size` characters.
///
/// When a window is emitted, pieces are dropped from its front until the kept tail
/// is no longer than `chunk_overlap` and the next piece fits; the tail starts the next window.
fn merge_pieces(
    text: &str,
    pieces: &[Range<usize>],
    config: &ChunkingConfig,
    out: &mut Vec<Range<usize>>,
) {
    let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
    let mut total = 0;

    for piece in pieces {
        let len = char_len(text, piece);

        if total + len > config.chunk_size
            && let Some(span) = window_span(&window)
        {
            push_trimmed(text, span, out);

            while total > config.chunk_overlap || (total + len > config.chunk_size && total > 0)
            {
                match window.pop_front() {
                    Some((_, dropped)) => total -= dropped,
                    None => break,
                }
            }
        }

        window.push_back((piece.clone(), len));
        total += len;
    }

    if let Some(span) = window_span(&window) {
        push_trimmed(text, span, out);
    }
}

fn window_span(window: &VecDeque<(Range<usize>, usize)>) -> Option<Range<usize>> {
    let (first, _) = window.front()?;
    let (last, _) = window.back()?;
    Some(first.start..last.end)
}

fn push_trimmed(text: &str, range: Range<usize>, out: &mut Vec<Range<usize>>) {
    let slice = &text[range.clone()];
    let leading = slice.len() - slice.trim_start().len();
    let kept = slice.trim_end().len();
    if leading < kept {
        out.push((range.start + leading)..(range.start + kept));
    }
}

fn char_len(text: &str, range: &Range<usize>) -> usize {
    text[range.clone()].chars().count()
}

fn chunk_id(metadata: &DocumentMetadata, chunk_index: usize, content: &str) -> String {
    let name = format!(
        "{}|{}|{}|{}",
        metadata.source.display(),
        metadata.page.unwrap_or(0),
        chunk_index,
        content
    );
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}
