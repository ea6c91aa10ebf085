//! Searching byte slices for full and trailing partial matches.
//!
//! [`partial_index`] is the primitive that lets the redacting stream hold
//! back bytes that might be the head of a match straddling a chunk boundary.

/// Returns the starting offsets of all non-overlapping occurrences of
/// `needle` in `haystack`, in increasing order.
///
/// After each match the search resumes at `match_start + needle.len()`.
/// An empty needle never matches.
pub fn index_all(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    let mut offsets = Vec::new();
    if needle.is_empty() || haystack.len() < needle.len() {
        return offsets;
    }
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if &haystack[i..i + needle.len()] == needle {
            offsets.push(i);
            i += needle.len();
        } else {
            i += 1;
        }
    }
    offsets
}

/// Returns the smallest index `i` such that `haystack[i..]` is a proper,
/// non-empty prefix of `needle`.
///
/// Only the last `needle.len() - 1` bytes of the haystack are searched; a
/// full occurrence of `needle` is not a partial match. Returns `None` when
/// no trailing byte run could still grow into a match.
pub fn partial_index(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.is_empty() {
        return None;
    }
    let start = haystack.len().saturating_sub(needle.len() - 1);
    (start..haystack.len()).find(|&i| needle.starts_with(&haystack[i..]))
}
