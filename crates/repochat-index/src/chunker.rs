//! Overlapping text windows preferring paragraph, then line boundaries.
//!
//! Sizes are counted in characters.

use std::collections::VecDeque;

use crate::error::IndexError;
use crate::fetcher::RepositoryFile;
use crate::repo::RepoId;

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkerConfig {
    /// # Errors
    ///
    /// Returns `IndexError::Validation` if the size is zero or the overlap is
    /// not strictly below it.
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.chunk_size == 0 {
            return Err(IndexError::Validation("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IndexError::Validation(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// A chunk before embedding: provenance plus text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChunk {
    pub repo: String,
    pub file_path: String,
    pub text: String,
    /// Position within the file, starting at zero.
    pub sequence_index: usize,
}

/// Chunk one fetched file.
#[must_use]
pub fn chunk_file(
    repo: &RepoId,
    file: &RepositoryFile,
    config: &ChunkerConfig,
) -> Vec<FileChunk> {
    let repo = repo.to_string();
    split_text(&file.content, config)
        .into_iter()
        .enumerate()
        .map(|(sequence_index, text)| FileChunk {
            repo: repo.clone(),
            file_path: file.path.clone(),
            text,
            sequence_index,
        })
        .collect()
}

/// Split text into windows of at most `chunk_size` characters.
///
/// Consecutive windows share up to `chunk_overlap` characters of whole
/// segments. Whitespace-only windows are dropped.
#[must_use]
pub fn split_text(text: &str, config: &ChunkerConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let size = config.chunk_size.max(1);
    let overlap = config.chunk_overlap.min(size - 1);

    let segments = segment(text, size);
    merge_segments(&segments, size, overlap)
        .into_iter()
        .filter(|c| !c.trim().is_empty())
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Break text into pieces no longer than `size`: paragraphs, lines of
/// oversized paragraphs, then hard splits of oversized lines.
fn segment(text: &str, size: usize) -> Vec<&str> {
    let mut out = Vec::new();
    for paragraph in split_paragraphs(text) {
        if char_len(paragraph) <= size {
            out.push(paragraph);
            continue;
        }
        for line in paragraph.split_inclusive('\n') {
            if char_len(line) <= size {
                out.push(line);
            } else {
                out.extend(hard_split(line, size));
            }
        }
    }
    out
}

/// Split on blank lines, keeping the separator attached to the preceding paragraph.
fn split_paragraphs(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    while let Some(pos) = text[start..].find("\n\n") {
        let mut end = start + pos + 2;
        while text[end..].starts_with('\n') {
            end += 1;
        }
        out.push(&text[start..end]);
        start = end;
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

fn hard_split(line: &str, size: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in line.char_indices() {
        if count == size {
            out.push(&line[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < line.len() {
        out.push(&line[start..]);
    }
    out
}

/// Merge segments into windows, carrying trailing segments as overlap.
fn merge_segments(segments: &[&str], size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: VecDeque<(&str, usize)> = VecDeque::new();
    let mut window_len = 0;

    for &seg in segments {
        let seg_len = char_len(seg);
        if !window.is_empty() && window_len + seg_len > size {
            chunks.push(window.iter().map(|(s, _)| *s).collect::<String>());

            while window_len > overlap
                && let Some((_, len)) = window.pop_front()
            {
                window_len -= len;
            }
            while window_len + seg_len > size
                && let Some((_, len)) = window.pop_front()
            {
                window_len -= len;
            }
        }
        window.push_back((seg, seg_len));
        window_len += seg_len;
    }

    if !window.is_empty() {
        chunks.push(window.iter().map(|(s, _)| *s).collect::<String>());
    }
    chunks
}
