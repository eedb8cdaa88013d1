//! Objects as seen by the adapter's callers: what goes in, what comes back.

use bytes::Bytes;
use futures::{Stream, StreamExt, stream::BoxStream};
use serde::{Deserialize, Serialize};
use std::{fmt, io};
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

pub type PayloadStream = BoxStream<'static, io::Result<Bytes>>;

/// File content handed to `create_file`.
///
/// `Bytes` is uploaded with a single put unless it exceeds one part;
/// `Stream` and `Reader` are consumed part by part so large objects are
/// never fully buffered.
pub enum Payload {
    Bytes(Bytes),
    Stream(PayloadStream),
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl Payload {
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self::Stream(stream.boxed())
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::Reader(Box::new(reader))
    }

    pub fn into_stream(self) -> PayloadStream {
        match self {
            Self::Bytes(bytes) => futures::stream::once(async move { Ok(bytes) }).boxed(),
            Self::Stream(stream) => stream,
            Self::Reader(reader) => ReaderStream::new(reader).boxed(),
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Payload {
    fn from(bytes: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(bytes))
    }
}

impl From<&'static str> for Payload {
    fn from(text: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Bytes(Bytes::from(text))
    }
}

/// Backend response to a completed write.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PutObjectOutput {
    /// Entity tag of the stored object (quotes stripped).
    pub etag: Option<String>,

    /// Version identifier if the bucket is versioned.
    pub version_id: Option<String>,

    /// Number of parts when the object was written with a multipart upload.
    pub parts: Option<u32>,
}

/// Backend response to a delete.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteObjectOutput {
    /// HTTP status the backend answered with (204 for S3).
    pub status: u16,

    /// Whether the backend created a delete marker (versioned buckets).
    pub delete_marker: bool,
}

/// Result of `create_file`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// Canonical backend URL of the stored object.
    pub location: String,

    /// Resolved key without the bucket prefix. Hosts keep this and pass it
    /// back for reads, deletes and locations.
    pub name: String,

    /// Raw backend response.
    pub response: PutObjectOutput,

    /// Access URL, resolved eagerly when an access context was supplied.
    pub url: Option<String>,
}
