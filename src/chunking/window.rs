//! Character-based sliding window over a single page of text.
//!
//! Windows are `chunk_size` characters wide and advance by
//! `chunk_size - overlap`. The last window ends exactly at the end of the
//! text and may be shorter than `chunk_size`.

/// A window into the page text, in character offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub content: String,
    /// Inclusive start character offset.
    pub start: usize,
    /// Exclusive end character offset.
    pub end: usize,
}

/// Split `text` into overlapping windows. Callers must ensure
/// `0 < chunk_size` and `overlap < chunk_size`.
pub fn sliding_window(text: &str, chunk_size: usize, overlap: usize) -> Vec<Window> {
    debug_assert!(chunk_size > 0 && overlap < chunk_size);

    // Byte offset of every char boundary, plus the end of the string, so
    // windows never split a multi-byte character.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = boundaries.len() - 1;

    let step = chunk_size - overlap;
    let mut windows = Vec::new();
    let mut start = 0usize;

    while start < char_len {
        let end = (start + chunk_size).min(char_len);
        windows.push(Window {
            content: text[boundaries[start]..boundaries[end]].to_string(),
            start,
            end,
        });
        if end == char_len {
            break;
        }
        start += step;
    }

    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        assert!(sliding_window("", 10, 2).is_empty());
    }

    #[test]
    fn test_short_text_single_window() {
        let windows = sliding_window("hello", 10, 2);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].content, "hello");
        assert_eq!((windows[0].start, windows[0].end), (0, 5));
    }

    #[test]
    fn test_windows_advance_by_step() {
        let text = "abcdefghij"; // 10 chars
        let windows = sliding_window(text, 4, 1);
        let spans: Vec<(usize, usize)> = windows.iter().map(|w| (w.start, w.end)).collect();
        assert_eq!(spans, vec![(0, 4), (3, 7), (6, 10)]);
        assert_eq!(windows[1].content, "defg");
    }

    #[test]
    fn test_last_window_may_be_short() {
        let windows = sliding_window("abcdefghijk", 4, 1); // 11 chars
        let last = windows.last().unwrap();
        assert_eq!(last.end, 11);
        assert!(last.content.chars().count() <= 4);
        assert!(!last.content.is_empty());
    }

    #[test]
    fn test_no_trailing_window_inside_previous() {
        let windows = sliding_window("abcdefghij", 8, 4);
        let spans: Vec<(usize, usize)> = windows.iter().map(|w| (w.start, w.end)).collect();
        assert_eq!(spans, vec![(0, 8), (4, 10)]);
    }

    #[test]
    fn test_multibyte_characters_are_not_split() {
        let text = "ドア番号D-101の耐火等級";
        let windows = sliding_window(text, 5, 2);
        for w in &windows {
            assert!(w.content.chars().count() <= 5);
        }
        assert_eq!(windows[0].content, "ドア番号D");
    }

    #[test]
    fn test_coverage_of_every_offset() {
        let text: String = (0..997).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        for (size, overlap) in [(1, 0), (7, 3), (50, 0), (50, 49), (1000, 10), (64, 16)] {
            let windows = sliding_window(&text, size, overlap);
            let mut covered = vec![false; 997];
            for w in &windows {
                assert!(!w.content.is_empty());
                for c in covered.iter_mut().take(w.end).skip(w.start) {
                    *c = true;
                }
            }
            assert!(covered.iter().all(|c| *c), "gap with size={size} overlap={overlap}");
        }
    }
}
