#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Streaming `multipart/form-data` decoding in bounded memory.
//!
//! A [`MultipartReader`] pulls bytes from a chunk stream, recognizes
//! delimiter lines, reads each part's folded header block, and hands out one
//! [`PartReader`] at a time. Part bodies are never buffered: each read only
//! holds back the few bytes that might still turn out to be a boundary.
//!
//! ```no_run
//! # async fn run() -> Result<(), streaming_multipart::MultipartError> {
//! use bytes::Bytes;
//! use futures::stream;
//! use streaming_multipart::MultipartReader;
//!
//! let body = "--B\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nhi\r\n--B--\r\n";
//! let chunks = stream::iter([Ok::<_, std::io::Error>(Bytes::from_static(body.as_bytes()))]);
//! let mut multipart = MultipartReader::new("B", chunks)?;
//!
//! while let Some(mut part) = multipart.next().await? {
//!     let mut buf = [0u8; 1024];
//!     while let Some(n) = part.read(&mut buf).await? {
//!         println!("{:?}: {} bytes", part.form_name(), n);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// Fluent builder API.
pub mod builder;
/// Reader configuration.
pub mod config;
/// Error types exposed by this crate.
pub mod error;
/// Multipart stream reader.
pub mod multipart;
/// Part metadata and per-part body reader.
pub mod part;
/// Low-level parser components.
pub mod parser;

#[cfg(feature = "hyper")]
pub mod hyper;

pub use builder::MultipartBuilder;
pub use config::ReaderConfig;
pub use error::{BoxError, ConfigError, MultipartError};
pub use multipart::MultipartReader;
pub use parser::{Boundary, BufferedSource, ContentDisposition, extract_multipart_boundary};
pub use part::{Part, PartReader};
