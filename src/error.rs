use thiserror::Error;

/// Boxed error type carried by [`MultipartError::Source`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Configuration-time validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A configured numeric limit must be strictly greater than zero.
    #[error("limit `{limit}` must be greater than 0")]
    InvalidLimitValue {
        /// Name of the limit.
        limit: &'static str,
    },
}

/// Decode failures surfaced by the multipart reader.
///
/// Every variant except [`MultipartError::Config`] is terminal for the stream
/// being decoded: the reader refuses to produce further parts afterwards.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MultipartError {
    /// The boundary is empty, too long, or could not be taken from a `Content-Type`.
    #[error("invalid multipart boundary: {reason}")]
    InvalidBoundary {
        /// Why the boundary was rejected.
        reason: &'static str,
    },
    /// Input ended mid-boundary, mid-header-block, or before the final boundary.
    #[error("multipart stream ended unexpectedly")]
    UnexpectedEndOfStream,
    /// A header line has no colon separating key and value.
    #[error("malformed MIME header line: {line}")]
    MalformedHeaderLine {
        /// Offending line, lossily decoded.
        line: String,
    },
    /// A header block starts with a continuation line.
    #[error("malformed MIME header initial line: {line}")]
    MalformedHeaderBlock {
        /// Offending line, lossily decoded.
        line: String,
    },
    /// A line appeared where only a delimiter or a blank separator was valid.
    #[error("unexpected line in multipart stream: {line}")]
    ProtocolSequence {
        /// Offending line, lossily decoded.
        line: String,
    },
    /// A preamble, delimiter, or header line exceeded the configured length.
    #[error("multipart line exceeded max length of {max_line_length} bytes")]
    LineTooLong {
        /// Configured maximum line length in bytes.
        max_line_length: usize,
    },
    /// The underlying chunk stream failed.
    #[error("multipart source failed: {0}")]
    Source(#[source] BoxError),
    /// Writing part bytes into a sink failed.
    #[error("failed to write part body: {0}")]
    Write(#[source] std::io::Error),
    /// Configuration error surfaced at runtime.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MultipartError {
    pub(crate) fn malformed_header_line(line: &[u8]) -> Self {
        Self::MalformedHeaderLine {
            line: lossy_line(line),
        }
    }

    pub(crate) fn malformed_header_block(line: &[u8]) -> Self {
        Self::MalformedHeaderBlock {
            line: lossy_line(line),
        }
    }

    pub(crate) fn protocol_sequence(line: &[u8]) -> Self {
        Self::ProtocolSequence {
            line: lossy_line(line),
        }
    }
}

fn lossy_line(line: &[u8]) -> String {
    String::from_utf8_lossy(line)
        .trim_end_matches(['\r', '\n'])
        .to_owned()
}
