use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::{
    config::ReaderConfig,
    error::{ConfigError, MultipartError},
    multipart::MultipartReader,
    parser::{boundary::extract_multipart_boundary, source::BufferedSource},
};

/// Builder for configuring a [`MultipartReader`].
#[derive(Debug, Clone, Default)]
pub struct MultipartBuilder {
    config: ReaderConfig,
}

impl MultipartBuilder {
    /// Creates a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current builder configuration snapshot.
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Replaces the full builder configuration.
    pub fn with_config(mut self, config: ReaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the longest accepted boundary in bytes.
    pub fn max_boundary_length(mut self, max_boundary_length: usize) -> Self {
        self.config.max_boundary_length = max_boundary_length;
        self
    }

    /// Caps the length of preamble, delimiter, and header lines.
    pub fn max_line_length(mut self, max_line_length: usize) -> Self {
        self.config.max_line_length = Some(max_line_length);
        self
    }

    /// Validates builder configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.config.validate()
    }

    /// Builds a reader over a chunk stream.
    pub fn build<S>(self, boundary: &str, stream: S) -> Result<MultipartReader<S>, MultipartError> {
        MultipartReader::with_config(boundary, stream, self.config)
    }

    /// Builds a reader over a chunk stream, taking the boundary from a `Content-Type` value.
    pub fn build_from_content_type<S>(
        self,
        content_type: &str,
        stream: S,
    ) -> Result<MultipartReader<S>, MultipartError> {
        let boundary = extract_multipart_boundary(content_type)?;
        self.build(&boundary, stream)
    }

    /// Builds a reader over an async byte reader.
    pub fn build_from_reader<R>(
        self,
        boundary: &str,
        reader: R,
    ) -> Result<MultipartReader<ReaderStream<R>>, MultipartError>
    where
        R: AsyncRead,
    {
        MultipartReader::with_source(boundary, BufferedSource::from_reader(reader), self.config)
    }
}
