/// Boundary validation and `Content-Type` boundary extraction.
pub mod boundary;
/// Folded MIME header block reader and `Content-Disposition` parsing.
pub mod headers;
/// Pure boundary matching over peeked windows.
pub mod matcher;
/// Buffered pull-based byte source.
pub mod source;

pub use boundary::{Boundary, extract_multipart_boundary};
pub use headers::{ContentDisposition, read_header_block};
pub use matcher::{PrefixMatch, Scan, match_after_prefix, scan_until_boundary};
pub use source::BufferedSource;
