//! Recursive character chunking for document text.
//!
//! Pages are split into overlapping passages with a fixed character budget. Boundaries are
//! chosen by scanning the window for the highest-priority separator present: paragraph
//! breaks, then line breaks, then sentence ends, then spaces. A hard character cut is the
//! last resort for separator-free text. Identical input always yields identical chunks.

/// Maximum chunk length in characters.
pub const CHUNK_SIZE: usize = 500;
/// Number of characters shared between consecutive chunks.
pub const CHUNK_OVERLAP: usize = 100;

/// Boundary candidates in decreasing priority order.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ".", " "];

/// Split raw text into overlapping chunks using the process-wide size budget.
///
/// Returns an empty vector when the input is all whitespace. Chunks are trimmed and never
/// exceed [`CHUNK_SIZE`] characters.
pub fn split_text(text: &str) -> Vec<String> {
    split_with(text, CHUNK_SIZE, CHUNK_OVERLAP)
}

/// Lower-level splitter that accepts an explicit budget.
///
/// You likely want [`split_text`]; this helper exists for tests that need small windows.
fn split_with(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    debug_assert!(chunk_size > 0, "chunk size must be greater than zero");
    if text.trim().is_empty() {
        return Vec::new();
    }

    // boundaries[i] holds the byte offset of the i-th character; the final entry is the
    // total byte length, so slicing between entries is always valid UTF-8.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;
    let overlap = overlap.min(chunk_size.saturating_sub(1));

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let window_end = (start + chunk_size).min(char_count);
        let cut = if window_end == char_count {
            char_count
        } else {
            find_cut(text, &boundaries, start, window_end)
        };

        let piece = text[boundaries[start]..boundaries[cut]].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if cut == char_count {
            break;
        }
        let next = cut.saturating_sub(overlap);
        start = if next > start { next } else { cut };
    }

    chunks
}

/// Pick the cut position (char index) for a full window.
///
/// Scans the window for the last occurrence of each separator in priority order and cuts
/// just past it; falls back to a hard cut at the window end.
fn find_cut(text: &str, boundaries: &[usize], start: usize, window_end: usize) -> usize {
    let window = &text[boundaries[start]..boundaries[window_end]];
    for separator in SEPARATORS {
        if let Some(pos) = window.rfind(separator) {
            let byte_cut = boundaries[start] + pos + separator.len();
            // All separators are ASCII, so the byte offset is a char boundary.
            if let Ok(index) = boundaries.binary_search(&byte_cut)
                && index > start
            {
                return index;
            }
        }
    }
    window_end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_with("force equals mass times acceleration", 100, 20);
        assert_eq!(chunks, vec!["force equals mass times acceleration"]);
    }

    #[test]
    fn whitespace_input_yields_nothing() {
        assert!(split_with("  \n\n  ", 50, 10).is_empty());
        assert!(split_text("").is_empty());
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let text = "First paragraph about momentum.\n\nSecond paragraph about energy.";
        let chunks = split_with(text, 40, 0);
        assert_eq!(chunks[0], "First paragraph about momentum.");
    }

    #[test]
    fn falls_back_to_line_boundaries() {
        let text = "line one here\nline two here\nline three here";
        let chunks = split_with(text, 30, 0);
        assert_eq!(chunks[0], "line one here\nline two here");
    }

    #[test]
    fn falls_back_to_sentence_boundaries() {
        let text = "One sentence here. Another sentence follows after it without any newline";
        let chunks = split_with(text, 30, 0);
        assert_eq!(chunks[0], "One sentence here.");
    }

    #[test]
    fn falls_back_to_spaces() {
        let text = "alpha beta gamma delta epsilon zeta";
        let chunks = split_with(text, 12, 0);
        assert_eq!(chunks[0], "alpha beta");
    }

    #[test]
    fn hard_cut_when_no_separator_exists() {
        let text = "x".repeat(1200);
        let chunks = split_with(&text, 500, 100);
        assert_eq!(chunks[0].chars().count(), 500);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 500);
        }
        let total: usize = chunks.iter().map(|chunk| chunk.chars().count()).sum();
        assert!(total >= 1200);
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text = "y".repeat(900);
        let chunks = split_with(&text, 500, 100);
        assert!(chunks.len() >= 2);
        let tail: String = chunks[0].chars().rev().take(100).collect();
        let head: String = chunks[1].chars().take(100).collect();
        assert_eq!(tail, head);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "Newton's second law states that force equals mass times acceleration. \
                    It applies to point masses.\n\nRotational analogues use torque."
            .repeat(8);
        assert_eq!(split_text(&text), split_text(&text));
    }

    #[test]
    fn respects_budget_on_multibyte_text() {
        let text = "é".repeat(600);
        let chunks = split_with(&text, 500, 0);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 500);
        }
    }
}
