use std::cell::OnceCell;

use bytes::Bytes;
use futures::{StreamExt, TryStream, stream::LocalBoxStream};
use http::{HeaderMap, header};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{
    error::{BoxError, MultipartError},
    multipart::MultipartReader,
    parser::headers::ContentDisposition,
};

const COPY_CHUNK_SIZE: usize = 8 * 1024;

/// Header metadata of one multipart part.
#[derive(Debug, Clone)]
pub struct Part {
    headers: HeaderMap,
    index: usize,
    disposition: OnceCell<Option<ContentDisposition>>,
}

impl Part {
    pub(crate) fn new(headers: HeaderMap, index: usize) -> Self {
        Self {
            headers,
            index,
            disposition: OnceCell::new(),
        }
    }

    /// Part headers in wire order, values appended per key as encountered.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// One-based position of this part in the multipart body.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Parsed `Content-Disposition`, computed on first access.
    pub fn content_disposition(&self) -> Option<&ContentDisposition> {
        self.disposition
            .get_or_init(|| {
                self.headers
                    .get(header::CONTENT_DISPOSITION)
                    .map(|value| ContentDisposition::parse(value.as_bytes()))
            })
            .as_ref()
    }

    /// The `filename` of a file part.
    pub fn file_name(&self) -> Option<&str> {
        self.content_disposition()?.filename.as_deref()
    }

    /// The form field name.
    ///
    /// `Some("")` marks a form-data part without a `name` parameter, and
    /// `None` a part that is not form-data.
    pub fn form_name(&self) -> Option<&str> {
        self.content_disposition()?.form_name()
    }

    /// The part `Content-Type`, when present and well formed.
    pub fn content_type(&self) -> Option<mime::Mime> {
        self.headers
            .get(header::CONTENT_TYPE)?
            .to_str()
            .ok()?
            .trim()
            .parse()
            .ok()
    }
}

/// Incremental reader over the body of the current part.
///
/// A `PartReader` mutably borrows its [`MultipartReader`], so at most one part
/// is open at any time. Dropping it, or calling [`PartReader::close`], hands
/// the source back; the next call to
/// [`MultipartReader::next_part`] skips whatever body bytes were left unread.
#[derive(Debug)]
pub struct PartReader<'r, S> {
    reader: &'r mut MultipartReader<S>,
    part: Part,
    closed: bool,
}

impl<'r, S> PartReader<'r, S> {
    pub(crate) fn new(reader: &'r mut MultipartReader<S>, part: Part) -> Self {
        Self {
            reader,
            part,
            closed: false,
        }
    }

    /// Header metadata of this part.
    pub fn part(&self) -> &Part {
        &self.part
    }

    /// Releases the reader and keeps the header metadata.
    pub fn into_part(self) -> Part {
        self.part
    }

    /// See [`Part::headers`].
    pub fn headers(&self) -> &HeaderMap {
        self.part.headers()
    }

    /// See [`Part::file_name`].
    pub fn file_name(&self) -> Option<&str> {
        self.part.file_name()
    }

    /// See [`Part::form_name`].
    pub fn form_name(&self) -> Option<&str> {
        self.part.form_name()
    }

    /// See [`Part::content_type`].
    pub fn content_type(&self) -> Option<mime::Mime> {
        self.part.content_type()
    }

    /// See [`Part::index`].
    pub fn index(&self) -> usize {
        self.part.index()
    }

    /// Body bytes handed out so far.
    pub fn bytes_read(&self) -> u64 {
        self.reader.body_bytes_read()
    }

    /// Stops reading this part. Idempotent; later reads report end of part.
    ///
    /// Only this handle is affected: nothing is read from or consumed in the
    /// source. The unread body is skipped by the next
    /// [`MultipartReader::next_part`], exactly as when the handle is dropped.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Returns `true` after [`PartReader::close`].
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<'r, S> PartReader<'r, S>
where
    S: TryStream<Ok = Bytes> + Unpin,
    S::Error: Into<BoxError>,
{
    /// Reads body bytes into `buf`.
    ///
    /// Returns `Ok(None)` at end of part. A returned count may be smaller than
    /// `buf` even when more body bytes follow.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, MultipartError> {
        if self.closed {
            return Ok(None);
        }
        self.reader.read_body(buf).await
    }

    /// Reads at most `max_len` body bytes without copying them.
    pub async fn read_chunk(&mut self, max_len: usize) -> Result<Option<Bytes>, MultipartError> {
        if self.closed {
            return Ok(None);
        }
        self.reader.read_body_chunk(max_len).await
    }

    /// Streams the remaining body in chunks of at most `chunk_size` bytes.
    pub fn stream(
        &mut self,
        chunk_size: usize,
    ) -> LocalBoxStream<'_, Result<Bytes, MultipartError>> {
        let chunk_size = chunk_size.max(1);
        futures::stream::try_unfold(self, move |part| async move {
            let chunk = part.read_chunk(chunk_size).await?;
            Ok::<_, MultipartError>(chunk.map(|chunk| (chunk, part)))
        })
        .boxed_local()
    }

    /// Copies the remaining body into `writer`, returning the number of bytes written.
    pub async fn copy_to<W>(&mut self, writer: &mut W) -> Result<u64, MultipartError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut written = 0u64;
        while let Some(chunk) = self.read_chunk(COPY_CHUNK_SIZE).await? {
            writer
                .write_all(&chunk)
                .await
                .map_err(MultipartError::Write)?;
            written += chunk.len() as u64;
        }

        writer.flush().await.map_err(MultipartError::Write)?;
        Ok(written)
    }
}
