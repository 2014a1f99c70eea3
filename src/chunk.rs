//! Recursive character-boundary text chunker.
//!
//! Splits file text into overlapping segments bounded by a configurable
//! character size. Splitting is priority-driven: blank lines first, then
//! newlines, then spaces, then a hard character cut — recursively
//! choosing the largest separator that keeps pieces within the limit.
//! Separators stay attached to the following piece, so concatenating a
//! file's chunks in sequence order (minus the overlap windows) covers
//! the original content.
//!
//! The splitter is pure: identical input always yields identical output.

use std::collections::VecDeque;

use crate::config::ChunkingConfig;
use crate::models::{ChunkRecord, SourceFile};
use crate::repo::RepoId;

/// Separator priority, largest first. The empty string is the hard
/// character cut and always applies.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Split text into chunks of at most `chunk_size` characters with
/// `chunk_overlap` characters of shared boundary content between
/// consecutive chunks. Empty input yields an empty sequence.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    debug_assert!(chunk_overlap < chunk_size);
    if text.is_empty() {
        return Vec::new();
    }
    split_recursive(text, &SEPARATORS, chunk_size, chunk_overlap)
}

/// Chunk one classified file, tagging each chunk with its display path,
/// language, and zero-based per-file sequence index.
pub fn chunk_file(repo: &RepoId, file: &SourceFile, chunking: &ChunkingConfig) -> Vec<ChunkRecord> {
    split_text(&file.content, chunking.chunk_size, chunking.chunk_overlap)
        .into_iter()
        .enumerate()
        .map(|(i, content)| ChunkRecord {
            content,
            filepath: repo.display_path(&file.relative_path),
            repo: repo.key(),
            language: file.language.clone(),
            chunk_id: i as i64,
        })
        .collect()
}

fn split_recursive(
    text: &str,
    separators: &[&str],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    // First separator actually present in the text; "" always matches.
    let mut separator = "";
    let mut remaining: &[&str] = &[];
    for (i, sep) in separators.iter().enumerate() {
        if sep.is_empty() || text.contains(sep) {
            separator = sep;
            remaining = &separators[i + 1..];
            break;
        }
    }

    let pieces = split_keeping_separator(text, separator);

    let mut chunks = Vec::new();
    let mut mergeable: Vec<String> = Vec::new();

    for piece in pieces {
        if char_len(&piece) < chunk_size {
            mergeable.push(piece);
        } else {
            if !mergeable.is_empty() {
                chunks.extend(merge_pieces(&mergeable, chunk_size, chunk_overlap));
                mergeable.clear();
            }
            if remaining.is_empty() {
                // Separator-free run longer than the limit; unreachable
                // while "" terminates the priority list, but kept so a
                // custom separator list degrades to whole-piece output.
                chunks.push(piece);
            } else {
                chunks.extend(split_recursive(&piece, remaining, chunk_size, chunk_overlap));
            }
        }
    }

    if !mergeable.is_empty() {
        chunks.extend(merge_pieces(&mergeable, chunk_size, chunk_overlap));
    }

    chunks
}

/// Split on `separator`, keeping each separator attached to the piece
/// that follows it: `"a\n\nb"` → `["a", "\n\nb"]`. The empty separator
/// splits into single characters.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(|c| c.to_string()).collect();
    }

    let mut pieces = Vec::new();
    let mut rest = text;
    let mut first = true;
    while let Some(pos) = rest.find(separator) {
        let (head, tail) = rest.split_at(pos);
        if first {
            pieces.push(head.to_string());
            first = false;
        } else {
            pieces.push(format!("{}{}", separator, head));
        }
        rest = &tail[separator.len()..];
    }
    if first {
        pieces.push(rest.to_string());
    } else {
        pieces.push(format!("{}{}", separator, rest));
    }
    pieces
}

/// Greedily merge pieces into chunks of at most `chunk_size` characters,
/// carrying a trailing window of at most `chunk_overlap` characters into
/// the next chunk. Emitted chunks are whitespace-trimmed; empty chunks
/// are dropped.
fn merge_pieces(pieces: &[String], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for piece in pieces {
        let len = char_len(piece);
        if total + len > chunk_size && !window.is_empty() {
            if let Some(chunk) = join_window(&window) {
                chunks.push(chunk);
            }
            // Shrink the window until it fits in the overlap budget and
            // leaves room for the incoming piece.
            while total > chunk_overlap || (total + len > chunk_size && total > 0) {
                let front = window.pop_front().expect("window not empty while total > 0");
                total -= char_len(front);
            }
        }
        window.push_back(piece.as_str());
        total += len;
    }

    if let Some(chunk) = join_window(&window) {
        chunks.push(chunk);
    }

    chunks
}

fn join_window(window: &VecDeque<&str>) -> Option<String> {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
