//! The object-store capability the adapter is written against.
//!
//! [`ObjectStoreClient`] is the only way the services touch the backing
//! store. [`s3::S3Client`] talks to S3-compatible services;
//! [`memory::MemoryStore`] keeps everything in process for development and
//! tests.

pub mod memory;
pub mod s3;

use crate::{
    errors::{BackendError, BackendResult},
    models::{
        CompletedPart,
        object::{DeleteObjectOutput, PutObjectOutput},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::collections::BTreeMap;

pub use memory::MemoryStore;
pub use s3::S3Client;

/// Object body as delivered by the backend.
pub type ByteStream = BoxStream<'static, Result<Bytes, BackendError>>;

/// Everything about a write except its body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutObjectRequest {
    pub key: String,
    pub content_type: Option<String>,
    /// Canned ACL, e.g. `public-read`.
    pub acl: Option<String>,
    pub cache_control: Option<String>,
    /// `AES256` or `aws:kms`.
    pub server_side_encryption: Option<String>,
    pub metadata: BTreeMap<String, String>,
    /// Tag set already encoded as `k=v&k=v`.
    pub tagging: Option<String>,
}

impl PutObjectRequest {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    /// Header view of the request, as an S3 PutObject/CreateMultipartUpload
    /// call would carry it. Content type is handled separately.
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        if let Some(acl) = &self.acl {
            headers.push(("x-amz-acl".to_string(), acl.clone()));
        }
        if let Some(cache_control) = &self.cache_control {
            headers.push(("cache-control".to_string(), cache_control.clone()));
        }
        if let Some(sse) = &self.server_side_encryption {
            headers.push(("x-amz-server-side-encryption".to_string(), sse.clone()));
        }
        for (key, value) in &self.metadata {
            headers.push((format!("x-amz-meta-{}", key.to_ascii_lowercase()), value.clone()));
        }
        if let Some(tagging) = &self.tagging {
            headers.push(("x-amz-tagging".to_string(), tagging.clone()));
        }
        headers
    }
}

/// Result of a (possibly ranged) read.
pub struct GetObjectOutput {
    /// HTTP status of the read (200, or 206 for a ranged read).
    pub status: u16,
    /// `None` when the backend answered without a body.
    pub body: Option<ByteStream>,
    pub accept_ranges: Option<String>,
    pub content_length: Option<u64>,
    pub content_range: Option<String>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

impl std::fmt::Debug for GetObjectOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetObjectOutput")
            .field("status", &self.status)
            .field("has_body", &self.body.is_some())
            .field("accept_ranges", &self.accept_ranges)
            .field("content_length", &self.content_length)
            .field("content_range", &self.content_range)
            .field("content_type", &self.content_type)
            .field("etag", &self.etag)
            .finish()
    }
}

/// Operations the adapter needs from an S3-like object store. All keys are
/// full storage keys (prefix included).
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Succeeds when the configured bucket exists and is reachable. A
    /// missing bucket is reported with `BackendErrorKind::NoSuchBucket`.
    async fn head_bucket(&self) -> BackendResult<()>;

    async fn create_bucket(&self) -> BackendResult<()>;

    async fn put_object(&self, request: &PutObjectRequest, body: Bytes)
    -> BackendResult<PutObjectOutput>;

    /// Read an object. `range` is an HTTP `Range` header value passed
    /// through untouched.
    async fn get_object(&self, key: &str, range: Option<&str>) -> BackendResult<GetObjectOutput>;

    async fn delete_object(&self, key: &str) -> BackendResult<DeleteObjectOutput>;

    /// Start a multipart upload and return its upload id.
    async fn create_multipart_upload(&self, request: &PutObjectRequest) -> BackendResult<String>;

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> BackendResult<CompletedPart>;

    /// `parts` must be sorted by part number.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> BackendResult<PutObjectOutput>;

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> BackendResult<()>;

    /// Signed GET URL for `key`. `None` uses the backend's default expiry.
    async fn presign_get(&self, key: &str, expires_in: Option<u32>) -> BackendResult<String>;

    /// Canonical, unsigned URL of `key`.
    fn object_url(&self, key: &str) -> String;
}
