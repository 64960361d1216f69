//! Transcript chunking into overlapping windows for per-chunk LLM extraction

/// How far back from a window's end to look for a clean boundary
const BOUNDARY_SEARCH_WINDOW: usize = 200;

/// Split a transcript into overlapping chunks, preferring to cut at a
/// newline and then at a sentence end (`". "`) near the window's end.
///
/// Sizes are measured in characters. Text no longer than `chunk_size` is
/// returned unchanged as a single chunk; otherwise every chunk is trimmed
/// and empty ones are dropped.
pub fn chunk_transcript(transcript: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = transcript.chars().collect();
    let len = chars.len();

    if len <= chunk_size || chunk_size == 0 {
        return vec![transcript.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < len {
        let mut end = start + chunk_size;

        if end < len {
            let from = end.saturating_sub(BOUNDARY_SEARCH_WINDOW).max(start + 1);
            if let Some(boundary) = find_boundary(&chars, from, end) {
                end = boundary;
            }
        }

        let slice_end = end.min(len);
        let chunk: String = chars[start..slice_end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if slice_end == len {
            break;
        }

        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    chunks
}

/// Position just past the last newline in `[from, to)`, else just past the
/// last `". "` lying entirely within `[from, to)`.
fn find_boundary(chars: &[char], from: usize, to: usize) -> Option<usize> {
    if let Some(pos) = (from..to).rev().find(|&i| chars[i] == '\n') {
        return Some(pos + 1);
    }

    if to < from + 2 {
        return None;
    }
    (from..=to - 2)
        .rev()
        .find(|&i| chars[i] == '.' && chars[i + 1] == ' ')
        .map(|pos| pos + 2)
}
