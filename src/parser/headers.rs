use bytes::Bytes;
use futures::TryStream;
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::{
    error::{BoxError, MultipartError},
    parser::source::BufferedSource,
};

/// Parsed `Content-Disposition` metadata for a multipart part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentDisposition {
    /// Disposition type as written, e.g. `form-data`.
    pub disposition: String,
    /// The `name` parameter.
    pub name: Option<String>,
    /// The `filename*` parameter when present, otherwise `filename`.
    pub filename: Option<String>,
}

impl ContentDisposition {
    /// Parses a `Content-Disposition` value.
    ///
    /// Parsing is lenient and never fails: the value is percent-decoded where
    /// possible, parameters without `=` are ignored, and a matching pair of
    /// surrounding quotes is stripped from parameter values.
    pub fn parse(value: &[u8]) -> Self {
        let decoded = percent_decode_lossy(value);
        let mut segments = split_semicolon_aware(&decoded).into_iter();
        let disposition = segments
            .next()
            .map(|segment| segment.trim().to_owned())
            .unwrap_or_default();

        let mut name = None;
        let mut filename = None;
        let mut filename_star = None;

        for segment in segments {
            let Some((key, value)) = segment.trim().split_once('=') else {
                continue;
            };
            let value = strip_quotes(value.trim());
            if value.is_empty() {
                continue;
            }

            match key.trim().to_ascii_lowercase().as_str() {
                "name" => name = Some(value.to_owned()),
                "filename" => filename = Some(value.to_owned()),
                "filename*" => filename_star = parse_ext_value(value),
                _ => {}
            }
        }

        Self {
            disposition,
            name,
            filename: filename_star.or(filename),
        }
    }

    /// Returns `true` when the disposition type is `form-data`.
    pub fn is_form_data(&self) -> bool {
        self.disposition.eq_ignore_ascii_case("form-data")
    }

    /// The form field name.
    ///
    /// `Some("")` means the part is form-data but carries no `name`; `None`
    /// means the part is not form-data at all.
    pub fn form_name(&self) -> Option<&str> {
        if !self.is_form_data() {
            return None;
        }
        Some(self.name.as_deref().unwrap_or(""))
    }
}

/// Reads one folded MIME header block, up to and including its blank line.
///
/// Returns `None` when the source is already at end of input. Header names
/// rejected by [`HeaderName`] are dropped without failing the block.
pub async fn read_header_block<S>(
    source: &mut BufferedSource<S>,
    max_line_length: Option<usize>,
) -> Result<Option<HeaderMap>, MultipartError>
where
    S: TryStream<Ok = Bytes> + Unpin,
    S::Error: Into<BoxError>,
{
    let first = source.peek(1).await?.first().copied();
    match first {
        None => return Ok(None),
        Some(b' ' | b'\t') => {
            let line = source.read_line(max_line_length).await?.unwrap_or_default();
            return Err(MultipartError::malformed_header_block(&line));
        }
        Some(_) => {}
    }

    let mut headers = HeaderMap::new();
    let mut pending: Option<(Vec<u8>, Vec<u8>)> = None;

    loop {
        let line = source
            .read_line(max_line_length)
            .await?
            .ok_or(MultipartError::UnexpectedEndOfStream)?;
        if !line.ends_with(b"\n") {
            return Err(MultipartError::UnexpectedEndOfStream);
        }
        let line = trim_line_ending(&line);

        if line.is_empty() {
            append_header(&mut headers, pending.take());
            return Ok(Some(headers));
        }

        if is_linear_whitespace(line[0]) {
            let continuation = trim_linear_whitespace(line);
            if let Some((_, value)) = pending.as_mut() {
                if !continuation.is_empty() {
                    value.push(b' ');
                    value.extend_from_slice(continuation);
                }
            }
            continue;
        }

        append_header(&mut headers, pending.take());

        let Some(colon) = line.iter().position(|&b| b == b':') else {
            return Err(MultipartError::malformed_header_line(line));
        };

        // Empty keys are skipped rather than rejected.
        let key = &line[..colon];
        if key.is_empty() {
            continue;
        }

        // Whitespace around the value is not part of it, on either side.
        let value = trim_linear_whitespace(&line[colon + 1..]);
        pending = Some((key.to_vec(), value.to_vec()));
    }
}

fn append_header(headers: &mut HeaderMap, header: Option<(Vec<u8>, Vec<u8>)>) {
    let Some((key, value)) = header else {
        return;
    };

    let Ok(name) = HeaderName::from_bytes(&key) else {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            key = %String::from_utf8_lossy(&key),
            "headers: dropping header with invalid name"
        );
        return;
    };

    match HeaderValue::from_bytes(&escape_header_value(&value)) {
        Ok(value) => {
            headers.append(name, value);
        }
        Err(_) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(key = %name, "headers: dropping header with invalid value");
        }
    }
}

/// Percent-escapes every byte that is not tab, visible ASCII, space, or in `0x80..=0xFF`.
pub(crate) fn escape_header_value(value: &[u8]) -> Vec<u8> {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";

    let mut out = Vec::with_capacity(value.len());
    for &byte in value {
        match byte {
            b'\t' | 0x20..=0x7e | 0x80..=0xff => out.push(byte),
            _ => {
                out.push(b'%');
                out.push(HEX[usize::from(byte >> 4)]);
                out.push(HEX[usize::from(byte & 0x0f)]);
            }
        }
    }
    out
}

fn is_linear_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t')
}

fn trim_linear_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|&b| !is_linear_whitespace(b))
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|&b| !is_linear_whitespace(b))
        .map_or(start, |end| end + 1);
    &bytes[start..end]
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Decodes an RFC 5987 `charset'lang'value`; only UTF-8 is understood.
fn parse_ext_value(value: &str) -> Option<String> {
    let (charset, rest) = value.split_once('\'')?;
    let (_, encoded) = rest.split_once('\'')?;
    if !charset.eq_ignore_ascii_case("utf-8") {
        return None;
    }
    Some(percent_decode_lossy(encoded.as_bytes()))
}

/// Decodes `%XX` sequences, leaving malformed ones untouched.
fn percent_decode_lossy(value: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(value.len());
    let mut index = 0usize;

    while index < value.len() {
        if value[index] == b'%' {
            if let (Some(hi), Some(lo)) = (
                value.get(index + 1).and_then(|&b| hex_value(b)),
                value.get(index + 2).and_then(|&b| hex_value(b)),
            ) {
                bytes.push((hi << 4) | lo);
                index += 3;
                continue;
            }
        }

        bytes.push(value[index]);
        index += 1;
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

fn split_semicolon_aware(value: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0usize;
    let mut in_quotes = false;
    let mut escaped = false;

    for (index, ch) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }

        match ch {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                segments.push(&value[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }

    segments.push(&value[start..]);
    segments
}
