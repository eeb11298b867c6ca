use bytes::Bytes;

use crate::error::MultipartError;

const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// A validated multipart boundary and the delimiters derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    dash: Bytes,
    dash_dash: Bytes,
    newline_dash: Bytes,
}

impl Boundary {
    /// Derives `--boundary`, `--boundary--` and `\r\n--boundary` from `boundary`.
    pub fn new(boundary: &str) -> Result<Self, MultipartError> {
        if boundary.is_empty() {
            return Err(MultipartError::InvalidBoundary {
                reason: "boundary cannot be empty",
            });
        }

        if boundary.contains(['\r', '\n']) {
            return Err(MultipartError::InvalidBoundary {
                reason: "boundary cannot contain CR or LF",
            });
        }

        Ok(Self {
            dash: Bytes::from(format!("--{boundary}")),
            dash_dash: Bytes::from(format!("--{boundary}--")),
            newline_dash: Bytes::from(format!("\r\n--{boundary}")),
        })
    }

    /// `--boundary`, the start of a delimiter line.
    pub fn dash(&self) -> &[u8] {
        &self.dash
    }

    /// `--boundary--`, the start of the final boundary line.
    pub fn dash_dash(&self) -> &[u8] {
        &self.dash_dash
    }

    /// `\r\n--boundary`, or `\n--boundary` after [`Boundary::use_bare_lf`].
    pub fn newline_dash(&self) -> &[u8] {
        &self.newline_dash
    }

    /// Line terminator in use, `\r\n` or `\n`.
    pub fn newline(&self) -> &[u8] {
        &self.newline_dash[..self.newline_dash.len() - self.dash.len()]
    }

    /// Switches to bare `\n` line endings.
    pub(crate) fn use_bare_lf(&mut self) {
        if self.newline_dash.starts_with(b"\r") {
            self.newline_dash = self.newline_dash.slice(1..);
        }
    }

    /// Returns `true` for `--boundary`, optional spaces or tabs, then the line terminator.
    pub(crate) fn is_delimiter_line(&self, line: &[u8]) -> bool {
        self.delimiter_rest(line)
            .is_some_and(|rest| rest == self.newline())
    }

    /// Returns `true` for a delimiter line terminated by a bare `\n` while the
    /// stream is still in CRLF mode.
    pub(crate) fn is_bare_lf_delimiter_line(&self, line: &[u8]) -> bool {
        self.newline() != b"\n"
            && self
                .delimiter_rest(line)
                .is_some_and(|rest| rest == b"\n")
    }

    /// Returns `true` for `--boundary--` followed by optional linear whitespace.
    ///
    /// Either line terminator ends the final line, whichever mode is active.
    pub(crate) fn is_final_line(&self, line: &[u8]) -> bool {
        let Some(rest) = line.strip_prefix(self.dash_dash()) else {
            return false;
        };
        matches!(&skip_linear_whitespace(rest)[..], b"" | b"\n" | b"\r\n")
    }

    fn delimiter_rest(&self, line: &[u8]) -> Option<Vec<u8>> {
        line.strip_prefix(self.dash())
            .map(skip_linear_whitespace)
    }
}

fn skip_linear_whitespace(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .copied()
        .filter(|b| !matches!(b, b' ' | b'\t'))
        .collect()
}

/// Extracts the `boundary` parameter from a `multipart/form-data` `Content-Type` value.
pub fn extract_multipart_boundary(content_type: &str) -> Result<String, MultipartError> {
    let mime = content_type
        .parse::<mime::Mime>()
        .map_err(|_| MultipartError::InvalidBoundary {
            reason: "invalid Content-Type header",
        })?;

    if mime.essence_str() != MULTIPART_FORM_DATA {
        return Err(MultipartError::InvalidBoundary {
            reason: "Content-Type must be multipart/form-data",
        });
    }

    let boundary = mime
        .get_param("boundary")
        .map(|value| value.as_str().to_owned())
        .ok_or(MultipartError::InvalidBoundary {
            reason: "missing boundary parameter",
        })?;

    if boundary.is_empty() {
        return Err(MultipartError::InvalidBoundary {
            reason: "boundary cannot be empty",
        });
    }

    Ok(boundary)
}
