//! Text chunking for embedding and retrieval
//!
//! Splits cleaned document text into overlapping, sentence-boundary-aware
//! chunks sized for the embedding budget:
//! - ~3200-char target windows (~800 tokens) with ~800-char overlap
//! - cuts moved to the nearest sentence terminator near the target
//! - character offsets into the cleaned text, suitable for re-slicing
//! - page numbers from explicit page breaks or a chars-per-page heuristic

use crate::config::ChunkConfig;

/// Sentence terminators considered valid cut points
const SENTENCE_TERMINATORS: [&str; 6] = [". ", "? ", "! ", ".\n", "?\n", "!\n"];

/// A text chunk with offsets into the cleaned source text
#[derive(Debug, Clone)]
pub struct TextChunk {
    /// The chunk text (the first chunk carries a document-title header)
    pub text: String,

    /// Character start position in the cleaned text
    pub start_char: usize,

    /// Character end position in the cleaned text
    pub end_char: usize,

    /// Chunk index (0-based)
    pub index: usize,

    /// Estimated page number (1-based)
    pub page: i32,
}

/// Normalize line endings and collapse repeated blank lines.
///
/// Chunk offsets always refer to the output of this function; it is what
/// gets cached as a document's raw content.
pub fn clean_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");

    let mut result = String::with_capacity(unified.len());
    let mut newline_run = 0;
    for c in unified.chars() {
        if c == '\n' {
            newline_run += 1;
            if newline_run <= 2 {
                result.push(c);
            }
        } else {
            newline_run = 0;
            result.push(c);
        }
    }

    result.trim().to_string()
}

/// Chunk cleaned text into overlapping windows.
///
/// The first produced chunk is prefixed with a `Document: {title}` header
/// so its embedding retains document identity out of context. Windows
/// shorter than `min_chars` after trimming are dropped as noise, including
/// any trailing remainder shorter than the overlap.
pub fn chunk_text(cleaned: &str, title: &str, config: &ChunkConfig) -> Vec<TextChunk> {
    let n = cleaned.len();
    if cleaned.trim().is_empty() {
        return Vec::new();
    }

    let page_breaks: Vec<usize> = cleaned
        .char_indices()
        .filter(|(_, c)| *c == '\u{0c}')
        .map(|(i, _)| i)
        .collect();

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < n {
        start = ensure_char_boundary(cleaned, start);
        if start >= n {
            break;
        }

        let target_end = start + config.max_chars;
        let end = if target_end >= n {
            n
        } else {
            find_sentence_cut(cleaned, start, target_end, config)
        };
        let end = ensure_char_boundary(cleaned, end);
        if end <= start {
            break;
        }

        // Offsets of the trimmed window, so start/end slice back to the text
        let window = &cleaned[start..end];
        let leading = window.len() - window.trim_start().len();
        let trailing = window.len() - window.trim_end().len();
        let trimmed_start = start + leading;
        let trimmed_end = end - trailing;

        if trimmed_end > trimmed_start && trimmed_end - trimmed_start >= config.min_chars {
            let body = &cleaned[trimmed_start..trimmed_end];
            let index = chunks.len();
            let text = if index == 0 {
                format!("Document: {}\n\n{}", title, body)
            } else {
                body.to_string()
            };

            chunks.push(TextChunk {
                text,
                start_char: trimmed_start,
                end_char: trimmed_end,
                index,
                page: estimate_page(trimmed_start, &page_breaks, config.chars_per_page),
            });
        }

        if end >= n {
            break;
        }

        // Step back by the overlap; if that would not advance, the
        // remainder is shorter than the overlap window and gets dropped
        // by the min_chars gate on the final iteration
        let next = ensure_char_boundary(cleaned, end.saturating_sub(config.overlap_chars));
        start = if next <= start { end } else { next };
    }

    chunks
}

/// Find the best cut position near `target`: the sentence terminator
/// closest to the target within the boundary window, provided it lands
/// meaningfully past the chunk start. Falls back to the raw target.
fn find_sentence_cut(text: &str, start: usize, target: usize, config: &ChunkConfig) -> usize {
    let floor = start + config.min_cut_offset;
    let lo = ensure_char_boundary(text, target.saturating_sub(config.boundary_window).max(floor));
    let hi = ensure_char_boundary(text, (target + config.boundary_window).min(text.len()));

    if lo >= hi {
        return ensure_char_boundary(text, target.min(text.len()));
    }

    let window = &text[lo..hi];
    let mut best: Option<usize> = None;

    for terminator in SENTENCE_TERMINATORS {
        for (i, _) in window.match_indices(terminator) {
            // Cut after the terminator and its trailing space/newline
            let pos = lo + i + terminator.len();
            if pos <= floor {
                continue;
            }
            let distance = pos.abs_diff(target);
            if best.map_or(true, |b| distance < b.abs_diff(target)) {
                best = Some(pos);
            }
        }
    }

    best.unwrap_or_else(|| ensure_char_boundary(text, target.min(text.len())))
}

/// Estimate a 1-based page number from explicit form-feed page breaks when
/// present, else from a fixed characters-per-page heuristic
fn estimate_page(offset: usize, page_breaks: &[usize], chars_per_page: usize) -> i32 {
    if page_breaks.is_empty() {
        (offset / chars_per_page.max(1)) as i32 + 1
    } else {
        page_breaks.iter().filter(|b| **b <= offset).count() as i32 + 1
    }
}

/// Ensure a position is on a valid UTF-8 character boundary
fn ensure_char_boundary(text: &str, pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    let mut adjusted = pos;
    while adjusted > 0 && !text.is_char_boundary(adjusted) {
        adjusted -= 1;
    }
    adjusted
}

/// Compute a stable hash for a string (used to detect unchanged uploads)
pub fn compute_text_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ChunkConfig {
        ChunkConfig::default()
    }

    fn small_config() -> ChunkConfig {
        ChunkConfig {
            max_chars: 400,
            overlap_chars: 100,
            min_chars: 50,
            boundary_window: 100,
            min_cut_offset: 50,
            chars_per_page: 1000,
        }
    }

    #[test]
    fn test_clean_text_normalizes_line_endings() {
        let raw = "line one\r\nline two\rline three";
        assert_eq!(clean_text(raw), "line one\nline two\nline three");
    }

    #[test]
    fn test_clean_text_collapses_blank_lines() {
        let raw = "para one\n\n\n\n\npara two";
        assert_eq!(clean_text(raw), "para one\n\npara two");
    }

    #[test]
    fn test_leave_policy_document_gets_title_header() {
        // Scenario: a ~3,000-character document produces at least one
        // chunk and the first begins with the document header
        let body = "Employees accrue leave at a fixed monthly rate. ".repeat(63);
        assert!(body.len() >= 3000);
        let cleaned = clean_text(&body);

        let chunks = chunk_text(&cleaned, "Leave Policy", &test_config());

        assert!(!chunks.is_empty());
        assert!(chunks[0].text.starts_with("Document: Leave Policy"));
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
    }

    #[test]
    fn test_offsets_slice_back_into_cleaned_text() {
        let body = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let cleaned = clean_text(&body);
        let chunks = chunk_text(&cleaned, "Foxes", &small_config());

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.start_char < chunk.end_char);
            assert!(chunk.end_char <= cleaned.len());
            let slice = &cleaned[chunk.start_char..chunk.end_char];
            if chunk.index == 0 {
                assert!(chunk.text.ends_with(slice));
            } else {
                assert_eq!(chunk.text, slice);
            }
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let body = "Sentences provide boundaries for cutting text cleanly. ".repeat(60);
        let cleaned = clean_text(&body);
        let config = small_config();
        let chunks = chunk_text(&cleaned, "Overlap", &config);

        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            // Each chunk starts before its predecessor ends (overlap),
            // except where trimming ate into the shared region
            assert!(pair[1].start_char < pair[0].end_char);
        }
    }

    #[test]
    fn test_cut_prefers_sentence_boundary() {
        let body = "Alpha beta gamma delta epsilon zeta. ".repeat(30);
        let cleaned = clean_text(&body);
        let chunks = chunk_text(&cleaned, "Greek", &small_config());

        assert!(chunks.len() > 1);
        // Every non-final chunk should end at a sentence terminator
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(
                chunk.text.trim_end().ends_with('.'),
                "chunk did not end at a sentence: {:?}",
                &chunk.text[chunk.text.len().saturating_sub(40)..]
            );
        }
    }

    #[test]
    fn test_terminates_without_sentence_boundaries() {
        // No terminators at all; the fallback cut at the raw target must
        // still make progress and terminate
        let body = "x".repeat(5000);
        let chunks = chunk_text(&body, "Xs", &small_config());
        assert!(!chunks.is_empty());
    }

    #[test]
    fn test_tiny_text_is_dropped_as_noise() {
        let chunks = chunk_text("too short", "Tiny", &test_config());
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk_text("", "Empty", &test_config()).is_empty());
        assert!(chunk_text("   \n\n  ", "Blank", &test_config()).is_empty());
    }

    #[test]
    fn test_page_from_form_feeds() {
        let text = format!(
            "{}\u{0c}{}\u{0c}{}",
            "First page sentence content here. ".repeat(5),
            "Second page sentence content here. ".repeat(5),
            "Third page sentence content here. ".repeat(5)
        );
        let breaks: Vec<usize> = text
            .char_indices()
            .filter(|(_, c)| *c == '\u{0c}')
            .map(|(i, _)| i)
            .collect();

        assert_eq!(estimate_page(0, &breaks, 1800), 1);
        assert_eq!(estimate_page(breaks[0] + 1, &breaks, 1800), 2);
        assert_eq!(estimate_page(breaks[1] + 1, &breaks, 1800), 3);
    }

    #[test]
    fn test_page_from_heuristic() {
        assert_eq!(estimate_page(0, &[], 1800), 1);
        assert_eq!(estimate_page(1799, &[], 1800), 1);
        assert_eq!(estimate_page(1800, &[], 1800), 2);
        assert_eq!(estimate_page(5400, &[], 1800), 4);
    }

    #[test]
    fn test_unicode_boundaries_are_respected() {
        let body = "héllo wörld — ünïcode sentence test. ".repeat(40);
        let cleaned = clean_text(&body);
        let chunks = chunk_text(&cleaned, "Unicode", &small_config());

        // Slicing at every offset must not panic
        for chunk in &chunks {
            let _ = &cleaned[chunk.start_char..chunk.end_char];
        }
        assert!(!chunks.is_empty());
    }

    #[test]
    fn test_hash_stability() {
        assert_eq!(compute_text_hash("abc"), compute_text_hash("abc"));
        assert_ne!(compute_text_hash("abc"), compute_text_hash("abd"));
    }
}
