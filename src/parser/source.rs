use bytes::{Buf, Bytes, BytesMut};
use futures::{TryStream, TryStreamExt};
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::error::{BoxError, MultipartError};

/// Pull-based buffer over a chunked byte stream.
///
/// Offers the three primitives the decoder needs: peeking ahead without
/// consuming, reading one `\n`-terminated line, and consuming an exact number
/// of bytes. Chunks are only pulled from the upstream when a request cannot be
/// satisfied from what is already buffered.
#[derive(Debug)]
pub struct BufferedSource<S> {
    stream: S,
    buffer: BytesMut,
    eof: bool,
}

impl<S> BufferedSource<S> {
    /// Wraps a chunk stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: BytesMut::new(),
            eof: false,
        }
    }

    /// Number of bytes currently buffered and not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` once the upstream has reported end of input.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Discards up to `n` buffered bytes.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.buffer.len());
        self.buffer.advance(n);
    }
}

impl<R> BufferedSource<ReaderStream<R>>
where
    R: AsyncRead,
{
    /// Wraps an async reader.
    pub fn from_reader(reader: R) -> Self {
        Self::new(ReaderStream::new(reader))
    }
}

impl<S> BufferedSource<S>
where
    S: TryStream<Ok = Bytes> + Unpin,
    S::Error: Into<BoxError>,
{
    /// Returns up to `n` bytes without consuming them.
    ///
    /// The returned slice is shorter than `n` only when the upstream has ended.
    pub async fn peek(&mut self, n: usize) -> Result<&[u8], MultipartError> {
        while self.buffer.len() < n && self.fill().await? {}
        let len = n.min(self.buffer.len());
        Ok(&self.buffer[..len])
    }

    /// Reads one line, including its trailing `\n`.
    ///
    /// At end of input the unterminated remainder is returned as the last line,
    /// and `None` once nothing is left.
    pub async fn read_line(
        &mut self,
        max_line_length: Option<usize>,
    ) -> Result<Option<Bytes>, MultipartError> {
        let mut scanned = 0usize;

        loop {
            if let Some(pos) = self.buffer[scanned..].iter().position(|&b| b == b'\n') {
                let end = scanned + pos + 1;
                check_line_length(end, max_line_length)?;
                return Ok(Some(self.buffer.split_to(end).freeze()));
            }

            scanned = self.buffer.len();
            check_line_length(scanned, max_line_length)?;

            if !self.fill().await? {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.buffer.split().freeze()));
            }
        }
    }

    /// Fills `dst` completely from the source.
    pub async fn read_full(&mut self, dst: &mut [u8]) -> Result<(), MultipartError> {
        let len = dst.len();
        if self.peek(len).await?.len() < len {
            return Err(MultipartError::UnexpectedEndOfStream);
        }

        dst.copy_from_slice(&self.buffer[..len]);
        self.buffer.advance(len);
        Ok(())
    }

    /// Takes exactly `n` bytes from the source without copying.
    pub async fn read_bytes(&mut self, n: usize) -> Result<Bytes, MultipartError> {
        if self.peek(n).await?.len() < n {
            return Err(MultipartError::UnexpectedEndOfStream);
        }

        Ok(self.buffer.split_to(n).freeze())
    }

    async fn fill(&mut self) -> Result<bool, MultipartError> {
        while !self.eof {
            match self.stream.try_next().await {
                Ok(Some(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    self.buffer.extend_from_slice(&chunk);
                    return Ok(true);
                }
                Ok(None) => self.eof = true,
                Err(err) => return Err(MultipartError::Source(err.into())),
            }
        }

        Ok(false)
    }
}

fn check_line_length(len: usize, max_line_length: Option<usize>) -> Result<(), MultipartError> {
    match max_line_length {
        Some(max_line_length) if len > max_line_length => {
            Err(MultipartError::LineTooLong { max_line_length })
        }
        _ => Ok(()),
    }
}
