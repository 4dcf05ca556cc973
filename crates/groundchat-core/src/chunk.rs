//! Recursive boundary-seeking text splitter.
//!
//! Splits page text into [`DocumentChunk`]s of at most `chunk_size`
//! characters, preferring paragraph boundaries, then line breaks, then word
//! boundaries, and finally hard cuts between characters. Consecutive chunks
//! share a tail of more than `chunk_overlap` characters whenever the split
//! units are small enough to allow it.
//!
//! Lengths are measured in Unicode scalar values, not bytes.
//!
//! # Algorithm
//!
//! 1. Pick the first separator that occurs in the text (`""` always matches).
//! 2. Split on it, keeping the separator at the start of the following piece.
//! 3. Pieces shorter than `chunk_size` are buffered; longer pieces flush the
//!    buffer and are split recursively with the remaining separators.
//! 4. Buffered pieces are merged greedily into chunks. After each chunk is
//!    emitted, pieces are dropped from the front of the window until the
//!    remainder is just above `chunk_overlap` and the next piece fits.
//! 5. Every chunk is trimmed; whitespace-only chunks are dropped.
//!
//! # Example
//!
//! ```rust
//! use groundchat_core::chunk::{split_text, ChunkingParams};
//!
//! let chunks = split_text("Hello world.\n\nSecond paragraph.", &ChunkingParams::default());
//! assert_eq!(chunks, vec!["Hello world.\n\nSecond paragraph.".to_string()]);
//! ```

use std::collections::VecDeque;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Document, DocumentChunk};

/// Target chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Characters shared between consecutive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Paragraph, line, word, character.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Splitter settings.
#[derive(Debug, Clone)]
pub struct ChunkingParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Separators in order of preference. An empty string means "between
    /// any two characters"; without it, a piece with no separator left is
    /// emitted whole even when it exceeds `chunk_size`.
    pub separators: Vec<String>,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ChunkingParams {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            ..Self::default()
        }
    }
}

/// Split a whole document, page by page.
///
/// Chunk indices are contiguous across pages, starting at 0. Each chunk gets
/// a fresh UUID and the SHA-256 of its text.
pub fn split_document(document: &Document, params: &ChunkingParams) -> Vec<DocumentChunk> {
    let mut chunks = Vec::new();
    for page in &document.pages {
        for text in split_text(&page.text, params) {
            let index = chunks.len();
            chunks.push(make_chunk(&document.source, page.number, index, text));
        }
    }
    chunks
}

/// Split a single text into chunk strings.
pub fn split_text(text: &str, params: &ChunkingParams) -> Vec<String> {
    let separators: Vec<&str> = params.separators.iter().map(String::as_str).collect();
    recursive_split(text, &separators, params)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn recursive_split(text: &str, separators: &[&str], params: &ChunkingParams) -> Vec<String> {
    // First separator present in the text wins; "" always matches.
    let mut separator = separators.last().copied().unwrap_or("");
    let mut remaining: &[&str] = &[];
    for (i, &sep) in separators.iter().enumerate() {
        if sep.is_empty() {
            separator = sep;
            break;
        }
        if text.contains(sep) {
            separator = sep;
            remaining = &separators[i + 1..];
            break;
        }
    }

    let mut chunks = Vec::new();
    let mut small: Vec<String> = Vec::new();

    for piece in split_keep_separator(text, separator) {
        if char_len(&piece) < params.chunk_size {
            small.push(piece);
            continue;
        }
        if !small.is_empty() {
            chunks.extend(merge_pieces(&small, params));
            small.clear();
        }
        if remaining.is_empty() {
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }
        } else {
            chunks.extend(recursive_split(&piece, remaining, params));
        }
    }

    if !small.is_empty() {
        chunks.extend(merge_pieces(&small, params));
    }

    chunks
}

/// Split `text` on `separator`, attaching each separator to the start of the
/// piece that follows it. Empty pieces are dropped.
fn split_keep_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }
    let mut pieces = Vec::new();
    for (i, part) in text.split(separator).enumerate() {
        let piece = if i == 0 {
            part.to_string()
        } else {
            format!("{}{}", separator, part)
        };
        if !piece.is_empty() {
            pieces.push(piece);
        }
    }
    pieces
}

/// Greedily merge small pieces into chunks of at most `chunk_size` chars.
fn merge_pieces(pieces: &[String], params: &ChunkingParams) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: VecDeque<(&str, usize)> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = char_len(piece);

        if total + len > params.chunk_size && !window.is_empty() {
            push_joined(&mut chunks, &window);

            // Keep a tail just over the overlap, as long as the next piece fits.
            while let Some(&(_, front_len)) = window.front() {
                let must_shrink = total + len > params.chunk_size;
                let can_shed = total - front_len > params.chunk_overlap;
                if !(must_shrink || can_shed) {
                    break;
                }
                window.pop_front();
                total -= front_len;
            }
        }

        window.push_back((piece.as_str(), len));
        total += len;
    }

    push_joined(&mut chunks, &window);
    chunks
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<(&str, usize)>) {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn make_chunk(source: &str, page: usize, index: usize, text: String) -> DocumentChunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    DocumentChunk {
        id: Uuid::new_v4().to_string(),
        text,
        source: source.to_string(),
        page,
        chunk_index: index,
        hash,
    }
}
