//! Header-aware markdown segmentation
//!
//! Documents are cut at markdown header lines, small sections are merged
//! forward until they carry enough content, and oversized chunks are halved
//! by word count. Every chunk's `content` is a contiguous slice of the input
//! and the slices tile it, so joining all contents gives back the document.

use crate::config::ResearchConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static HEADER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^(#{1,6})[ \t]*(.+)$").ok());

/// An indexable piece of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Header line that opens the chunk, `None` for leading text
    pub header: Option<String>,
    pub level: Option<u8>,
    pub content: String,
    /// Header lines covered by this chunk, in document order
    pub merged_headers: Vec<String>,
    /// 1 or 2 when an oversized chunk was halved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<u8>,
}

#[derive(Debug)]
struct Segment {
    start: usize,
    end: usize,
    header: Option<(u8, String)>,
    content_chars: usize,
}

#[derive(Debug)]
struct Span {
    start: usize,
    end: usize,
    header: Option<(u8, String)>,
    merged_headers: Vec<String>,
    content_chars: usize,
}

/// Segmenter with fixed size targets
#[derive(Debug, Clone, Copy)]
pub struct DocumentSegmenter {
    pub ideal_word_count: usize,
    pub min_content_chars: usize,
}

impl Default for DocumentSegmenter {
    fn default() -> Self {
        Self {
            ideal_word_count: 500,
            min_content_chars: 200,
        }
    }
}

impl DocumentSegmenter {
    pub fn new(ideal_word_count: usize, min_content_chars: usize) -> Self {
        Self {
            ideal_word_count,
            min_content_chars,
        }
    }

    pub fn from_config(config: &ResearchConfig) -> Self {
        Self::new(config.ideal_word_count, config.min_content_chars)
    }

    pub fn segment(&self, text: &str) -> Vec<DocumentChunk> {
        segment(text, self.ideal_word_count, self.min_content_chars)
    }
}

/// Split `text` into chunks
///
/// A segment joins the current chunk when either its own content or the
/// chunk's accumulated content is under `min_content_chars` characters.
/// Chunks with more than `ideal_word_count * 3 / 2` words are split in two at
/// the middle word.
pub fn segment(
    text: &str,
    ideal_word_count: usize,
    min_content_chars: usize,
) -> Vec<DocumentChunk> {
    let segments = header_segments(text);
    if segments.is_empty() {
        return vec![DocumentChunk {
            header: None,
            level: None,
            content: text.to_string(),
            merged_headers: Vec::new(),
            part: None,
        }];
    }

    let split_threshold = ideal_word_count * 3 / 2;
    merge(segments, min_content_chars)
        .into_iter()
        .flat_map(|span| split(text, span, split_threshold))
        .collect()
}

fn header_segments(text: &str) -> Vec<Segment> {
    let Some(re) = HEADER.as_ref() else {
        return Vec::new();
    };
    let headers: Vec<(usize, usize, u8, String)> = re
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let level = caps.get(1)?.as_str().len() as u8;
            let line = whole.as_str().trim().to_string();
            Some((whole.start(), whole.end(), level, line))
        })
        .collect();
    let Some(&(first_start, ..)) = headers.first() else {
        return Vec::new();
    };

    let mut segments = Vec::with_capacity(headers.len() + 1);
    let preamble = &text[..first_start];
    let body_start = if preamble.trim().is_empty() {
        0
    } else {
        segments.push(Segment {
            start: 0,
            end: first_start,
            header: None,
            content_chars: preamble.trim().chars().count(),
        });
        first_start
    };

    for (i, (start, line_end, level, line)) in headers.iter().enumerate() {
        let end = headers.get(i + 1).map_or(text.len(), |next| next.0);
        let start = if i == 0 { body_start } else { *start };
        segments.push(Segment {
            start,
            end,
            header: Some((*level, line.clone())),
            content_chars: text[*line_end..end].trim().chars().count(),
        });
    }
    segments
}

fn merge(segments: Vec<Segment>, min_content_chars: usize) -> Vec<Span> {
    let mut spans: Vec<Span> = Vec::new();
    let mut current: Option<Span> = None;

    for segment in segments {
        match current.as_mut() {
            Some(span)
                if segment.content_chars < min_content_chars
                    || span.content_chars < min_content_chars =>
            {
                span.end = segment.end;
                span.content_chars += segment.content_chars;
                if let Some((_, line)) = segment.header {
                    span.merged_headers.push(line);
                }
            }
            _ => {
                spans.extend(current.take());
                current = Some(Span {
                    start: segment.start,
                    end: segment.end,
                    merged_headers: segment
                        .header
                        .iter()
                        .map(|(_, line)| line.clone())
                        .collect(),
                    header: segment.header,
                    content_chars: segment.content_chars,
                });
            }
        }
    }
    spans.extend(current);
    spans
}

fn split(text: &str, span: Span, split_threshold: usize) -> Vec<DocumentChunk> {
    let content = &text[span.start..span.end];
    let (header, level) = match span.header {
        Some((level, line)) => (Some(line), Some(level)),
        None => (None, None),
    };
    let chunk = |content: &str, part: Option<u8>| DocumentChunk {
        header: header.clone(),
        level,
        content: content.to_string(),
        merged_headers: span.merged_headers.clone(),
        part,
    };

    let starts = word_starts(content);
    if starts.len() <= split_threshold {
        return vec![chunk(content, None)];
    }
    let cut = starts[starts.len() / 2];
    vec![
        chunk(&content[..cut], Some(1)),
        chunk(&content[cut..], Some(2)),
    ]
}

/// Byte offset of every whitespace-delimited word
fn word_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut in_word = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            in_word = false;
        } else if !in_word {
            starts.push(i);
            in_word = true;
        }
    }
    starts
}
