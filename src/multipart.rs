use bytes::Bytes;
use futures::TryStream;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::{
    config::ReaderConfig,
    error::{BoxError, MultipartError},
    parser::{
        boundary::{Boundary, extract_multipart_boundary},
        headers::read_header_block,
        matcher::{Scan, scan_until_boundary},
        source::BufferedSource,
    },
    part::{Part, PartReader},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Open,
    Finished,
    Failed,
}

/// Body scan progress of the currently open part.
#[derive(Debug, Clone, Copy, Default)]
struct BodyCursor {
    /// Bytes known to be body content and not yet handed out. Zero means
    /// the next read has to scan.
    remaining: usize,
    /// Body bytes handed out so far.
    consumed: u64,
    /// The closing boundary has been found.
    ended: bool,
}

/// Streaming `multipart/form-data` decoder.
///
/// Parts are produced strictly in wire order through [`MultipartReader::next`]
/// (form fields only) or [`MultipartReader::next_part`] (every part). Only the
/// lookahead needed to recognize a boundary is buffered, never a whole part.
///
/// Any decode error is terminal: once one has been returned, the reader
/// yields no further parts.
#[derive(Debug)]
pub struct MultipartReader<S> {
    source: BufferedSource<S>,
    boundary: Boundary,
    config: ReaderConfig,
    parts_read: usize,
    body: Option<BodyCursor>,
    state: ReaderState,
}

impl<S> MultipartReader<S> {
    /// Creates a reader over a chunk stream with default configuration.
    pub fn new(boundary: &str, stream: S) -> Result<Self, MultipartError> {
        Self::with_config(boundary, stream, ReaderConfig::default())
    }

    /// Creates a reader over a chunk stream with explicit configuration.
    pub fn with_config(
        boundary: &str,
        stream: S,
        config: ReaderConfig,
    ) -> Result<Self, MultipartError> {
        Self::with_source(boundary, BufferedSource::new(stream), config)
    }

    /// Creates a reader over an already buffered source.
    pub fn with_source(
        boundary: &str,
        source: BufferedSource<S>,
        config: ReaderConfig,
    ) -> Result<Self, MultipartError> {
        config.validate()?;
        if boundary.len() > config.max_boundary_length {
            return Err(MultipartError::InvalidBoundary {
                reason: "boundary exceeds the configured maximum length",
            });
        }

        Ok(Self {
            source,
            boundary: Boundary::new(boundary)?,
            config,
            parts_read: 0,
            body: None,
            state: ReaderState::Open,
        })
    }

    /// Creates a reader from a `multipart/form-data` `Content-Type` value.
    pub fn from_content_type(content_type: &str, stream: S) -> Result<Self, MultipartError> {
        let boundary = extract_multipart_boundary(content_type)?;
        Self::new(&boundary, stream)
    }

    /// Number of delimiter lines recognized so far, anonymous parts included.
    pub fn parts_read(&self) -> usize {
        self.parts_read
    }

    /// The boundary this reader splits on.
    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    /// Active configuration.
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Returns `true` after the final boundary or a decode error.
    pub fn is_finished(&self) -> bool {
        self.state != ReaderState::Open
    }

    /// Gives the source back, e.g. so the caller can drop the connection.
    pub fn into_source(self) -> BufferedSource<S> {
        self.source
    }

    pub(crate) fn body_bytes_read(&self) -> u64 {
        self.body.map_or(0, |cursor| cursor.consumed)
    }

    fn fail(&mut self, err: MultipartError) -> MultipartError {
        #[cfg(feature = "tracing")]
        tracing::debug!(error = %err, parts_read = self.parts_read, "multipart: decode failed");

        self.state = ReaderState::Failed;
        self.body = None;
        err
    }

    fn record_safe_bytes(&mut self, n: usize) {
        if let Some(cursor) = self.body.as_mut() {
            cursor.remaining = n;
        }
    }

    fn record_consumed(&mut self, n: usize) {
        if let Some(cursor) = self.body.as_mut() {
            cursor.remaining -= n;
            cursor.consumed += n as u64;
        }
    }

    fn record_end_of_part(&mut self) {
        if let Some(cursor) = self.body.as_mut() {
            cursor.remaining = 0;
            cursor.ended = true;
        }
    }
}

impl<R> MultipartReader<ReaderStream<R>>
where
    R: AsyncRead,
{
    /// Creates a reader over an async byte reader.
    pub fn from_reader(boundary: &str, reader: R) -> Result<Self, MultipartError> {
        Self::with_source(
            boundary,
            BufferedSource::from_reader(reader),
            ReaderConfig::default(),
        )
    }
}

impl<S> MultipartReader<S>
where
    S: TryStream<Ok = Bytes> + Unpin,
    S::Error: Into<BoxError>,
{
    /// Advances to the next part, including form-data parts without a name.
    ///
    /// Unread body bytes of the previous part are skipped first. Returns
    /// `Ok(None)` once the final boundary has been read.
    pub async fn next_part(&mut self) -> Result<Option<PartReader<'_, S>>, MultipartError> {
        match self.advance().await? {
            Some(part) => Ok(Some(PartReader::new(self, part))),
            None => Ok(None),
        }
    }

    /// Advances to the next part that should be surfaced to the caller.
    ///
    /// Same as [`MultipartReader::next_part`], except that form-data parts
    /// without a `name` parameter are consumed and skipped.
    pub async fn next(&mut self) -> Result<Option<PartReader<'_, S>>, MultipartError> {
        loop {
            let Some(part) = self.advance().await? else {
                return Ok(None);
            };

            if part.form_name() == Some("") {
                #[cfg(feature = "tracing")]
                tracing::debug!(index = part.index(), "multipart: skipping anonymous form-data part");
                continue;
            }

            return Ok(Some(PartReader::new(self, part)));
        }
    }

    async fn advance(&mut self) -> Result<Option<Part>, MultipartError> {
        if self.state != ReaderState::Open {
            return Ok(None);
        }

        match self.read_next_part().await {
            Ok(Some(part)) => Ok(Some(part)),
            Ok(None) => {
                self.state = ReaderState::Finished;
                Ok(None)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    async fn read_next_part(&mut self) -> Result<Option<Part>, MultipartError> {
        self.skip_current_body().await?;

        let max_line_length = self.config.max_line_length;
        let mut expect_new_part = false;

        loop {
            let line = self
                .source
                .read_line(max_line_length)
                .await?
                .ok_or(MultipartError::UnexpectedEndOfStream)?;

            if self.parts_read == 0 && self.boundary.is_bare_lf_delimiter_line(&line) {
                #[cfg(feature = "tracing")]
                tracing::trace!("multipart: switching to bare LF line endings");
                self.boundary.use_bare_lf();
            }

            if self.boundary.is_delimiter_line(&line) {
                self.parts_read += 1;
                let headers = read_header_block(&mut self.source, max_line_length)
                    .await?
                    .ok_or(MultipartError::UnexpectedEndOfStream)?;
                self.body = Some(BodyCursor::default());

                let part = Part::new(headers, self.parts_read);
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    index = part.index(),
                    form_name = ?part.form_name(),
                    file_name = ?part.file_name(),
                    "multipart: part started"
                );
                return Ok(Some(part));
            }

            if self.boundary.is_final_line(&line) {
                #[cfg(feature = "tracing")]
                tracing::debug!(parts_read = self.parts_read, "multipart: final boundary");
                return Ok(None);
            }

            // Only the last line of the input lacks a terminator.
            if !line.ends_with(b"\n") {
                return Err(MultipartError::UnexpectedEndOfStream);
            }

            if expect_new_part {
                return Err(MultipartError::protocol_sequence(&line));
            }

            if self.parts_read == 0 {
                #[cfg(feature = "tracing")]
                tracing::trace!(len = line.len(), "multipart: skipping preamble line");
                continue;
            }

            if line[..] == *self.boundary.newline() {
                expect_new_part = true;
                continue;
            }

            return Err(MultipartError::protocol_sequence(&line));
        }
    }

    /// Consumes whatever is left of the current part's body.
    async fn skip_current_body(&mut self) -> Result<(), MultipartError> {
        while let Some(n) = self.next_safe_len().await? {
            #[cfg(feature = "tracing")]
            tracing::trace!(n, "multipart: skipping unread body bytes");
            self.source.consume(n);
            self.record_consumed(n);
        }

        self.body = None;
        Ok(())
    }

    /// Number of bytes that can be handed out before the next scan, or
    /// `None` at end of part.
    async fn next_safe_len(&mut self) -> Result<Option<usize>, MultipartError> {
        let Some(cursor) = self.body else {
            return Ok(None);
        };
        if cursor.ended {
            return Ok(None);
        }
        if cursor.remaining > 0 {
            return Ok(Some(cursor.remaining));
        }

        // `NeedMoreData` only comes back while the window tail is a prefix of
        // the delimiter or ends right at one, so the window grows by at most
        // `newline_dash().len() + 1` bytes past what is buffered.
        let mut peek_len = 1usize;

        loop {
            peek_len = peek_len.max(self.source.buffered());
            let window = self.source.peek(peek_len).await?;
            if window.is_empty() {
                return Err(MultipartError::UnexpectedEndOfStream);
            }

            let eof = window.len() < peek_len;
            let scan = scan_until_boundary(
                window,
                self.boundary.dash(),
                self.boundary.newline_dash(),
                cursor.consumed,
                eof,
            );

            match scan {
                Scan::Safe(n) => {
                    self.record_safe_bytes(n);
                    return Ok(Some(n));
                }
                Scan::BoundaryFound => {
                    self.record_end_of_part();
                    return Ok(None);
                }
                Scan::NeedMoreData => {
                    if eof {
                        return Err(MultipartError::UnexpectedEndOfStream);
                    }
                    peek_len += 1;
                }
            }
        }
    }

    pub(crate) async fn read_body(
        &mut self,
        buf: &mut [u8],
    ) -> Result<Option<usize>, MultipartError> {
        match self.try_read_body(buf).await {
            Ok(read) => Ok(read),
            Err(err) => Err(self.fail(err)),
        }
    }

    pub(crate) async fn read_body_chunk(
        &mut self,
        max_len: usize,
    ) -> Result<Option<Bytes>, MultipartError> {
        match self.try_read_body_chunk(max_len).await {
            Ok(chunk) => Ok(chunk),
            Err(err) => Err(self.fail(err)),
        }
    }

    async fn try_read_body(&mut self, buf: &mut [u8]) -> Result<Option<usize>, MultipartError> {
        let Some(available) = self.next_safe_len().await? else {
            return Ok(None);
        };

        let n = buf.len().min(available);
        self.source.read_full(&mut buf[..n]).await?;
        self.record_consumed(n);
        Ok(Some(n))
    }

    async fn try_read_body_chunk(
        &mut self,
        max_len: usize,
    ) -> Result<Option<Bytes>, MultipartError> {
        let Some(available) = self.next_safe_len().await? else {
            return Ok(None);
        };

        let n = max_len.min(available);
        let chunk = self.source.read_bytes(n).await?;
        self.record_consumed(n);
        Ok(Some(chunk))
    }
}
