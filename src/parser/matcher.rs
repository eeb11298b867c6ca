//! Boundary detection over a peeked window of body bytes.
//!
//! Nothing here performs I/O. The part reader peeks a window from the source,
//! asks [`scan_until_boundary`] how much of it is certainly body content, and
//! grows the window whenever the answer depends on bytes not yet seen.

/// Outcome of checking the byte that follows a boundary prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixMatch {
    /// The prefix is followed by space, tab, CR, LF, dash, or end of input.
    Match,
    /// The prefix is the start of a longer token, e.g. `--foobar` vs `--foo`.
    NoMatch,
    /// The window ends exactly at the prefix and input continues.
    NeedMoreData,
}

/// Outcome of scanning a window for the next boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// This many leading bytes are body content. Never zero.
    Safe(usize),
    /// The window starts at the boundary that ends the part.
    BoundaryFound,
    /// The decision depends on bytes beyond the window.
    NeedMoreData,
}

/// Decides whether a window known to start with a boundary prefix of
/// `prefix_len` bytes really is that boundary.
pub fn match_after_prefix(window: &[u8], prefix_len: usize, eof: bool) -> PrefixMatch {
    debug_assert!(window.len() >= prefix_len);

    match window.get(prefix_len) {
        None if eof => PrefixMatch::Match,
        None => PrefixMatch::NeedMoreData,
        Some(b' ' | b'\t' | b'\r' | b'\n' | b'-') => PrefixMatch::Match,
        Some(_) => PrefixMatch::NoMatch,
    }
}

/// Computes how many leading bytes of `window` belong to the current part body.
///
/// `dash_boundary` is `--boundary` and `newline_dash_boundary` is
/// `\r\n--boundary` (or `\n--boundary` for LF-only bodies). A bare
/// `--boundary` is only recognized when `consumed == 0`, i.e. at the very
/// start of the body. `eof` tells whether the window holds the final bytes
/// of the input.
pub fn scan_until_boundary(
    window: &[u8],
    dash_boundary: &[u8],
    newline_dash_boundary: &[u8],
    consumed: u64,
    eof: bool,
) -> Scan {
    if consumed == 0 {
        if window.starts_with(dash_boundary) {
            return match match_after_prefix(window, dash_boundary.len(), eof) {
                PrefixMatch::NoMatch => Scan::Safe(dash_boundary.len()),
                PrefixMatch::NeedMoreData => Scan::NeedMoreData,
                PrefixMatch::Match => Scan::BoundaryFound,
            };
        }
        if dash_boundary.starts_with(window) {
            return Scan::NeedMoreData;
        }
    }

    if let Some(i) = find_subslice(window, newline_dash_boundary) {
        return match match_after_prefix(&window[i..], newline_dash_boundary.len(), eof) {
            PrefixMatch::NoMatch => Scan::Safe(i + newline_dash_boundary.len()),
            PrefixMatch::NeedMoreData => Scan::NeedMoreData,
            PrefixMatch::Match if i > 0 => Scan::Safe(i),
            PrefixMatch::Match => Scan::BoundaryFound,
        };
    }

    if newline_dash_boundary.starts_with(window) {
        return Scan::NeedMoreData;
    }

    // Everything before the last possible delimiter start is body. The tail
    // from there on is held back only while it could still grow into one.
    if let Some(j) = window.iter().rposition(|&b| b == newline_dash_boundary[0]) {
        if newline_dash_boundary.starts_with(&window[j..]) {
            return if j > 0 {
                Scan::Safe(j)
            } else {
                Scan::NeedMoreData
            };
        }
    }

    if window.is_empty() {
        Scan::NeedMoreData
    } else {
        Scan::Safe(window.len())
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }

    haystack.windows(needle.len()).position(|window| window == needle)
}
