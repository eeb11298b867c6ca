//! Hyper integration helpers.

use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use http_body_util::BodyExt;
use hyper::{Request, header};

use crate::{MultipartBuilder, MultipartError, MultipartReader, error::BoxError};

/// Hyper body stream mapped into the chunk shape read by [`MultipartReader`].
pub type HyperBodyBoxStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send + 'static>>;

/// Multipart reader over a Hyper request body.
pub type HyperMultipart = MultipartReader<HyperBodyBoxStream>;

/// Extracts the raw `Content-Type` header from a Hyper request.
pub fn content_type_from_request<B>(request: &Request<B>) -> Result<&str, MultipartError> {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .ok_or(MultipartError::InvalidBoundary {
            reason: "missing Content-Type header",
        })?
        .to_str()
        .map_err(|_| MultipartError::InvalidBoundary {
            reason: "Content-Type header must be ASCII",
        })
}

/// Maps a Hyper body into a boxed chunk stream.
pub fn map_body_stream<B>(body: B) -> HyperBodyBoxStream
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let stream = body
        .into_data_stream()
        .map(|item| item.map_err(|err| Box::new(err) as BoxError));
    Box::pin(stream)
}

/// Creates a [`MultipartReader`] from a `multipart/form-data` Hyper request.
pub fn multipart_from_request<B>(
    request: Request<B>,
    builder: MultipartBuilder,
) -> Result<HyperMultipart, MultipartError>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let content_type = content_type_from_request(&request)?.to_owned();
    builder.build_from_content_type(&content_type, map_body_stream(request.into_body()))
}
