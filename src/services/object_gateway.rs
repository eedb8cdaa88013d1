//! Reads, writes and deletes against the object store.
//!
//! Every operation first makes sure the bucket exists. Writes that do not
//! fit in one part are sent as a multipart upload, read from the payload
//! one part at a time; any failure after the upload was started aborts it.

use crate::{
    backends::{ObjectStoreClient, PutObjectRequest},
    config::AdapterConfig,
    errors::{AdapterError, AdapterResult},
    models::{
        CompletedPart, CreateOptions, DEFAULT_PART_SIZE, FileRange, Payload,
        object::{DeleteObjectOutput, PayloadStream, PutObjectOutput},
    },
    services::bucket_provisioner::BucketProvisioner,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::{io, sync::Arc};
use tracing::{debug, warn};

/// Response head written to a [`FileSink`] before the body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartialContent {
    pub status: u16,
    pub accept_ranges: Option<String>,
    pub content_length: Option<u64>,
    pub content_range: Option<String>,
    pub content_type: Option<String>,
}

/// Destination of a streamed read, typically an HTTP response.
#[async_trait]
pub trait FileSink: Send {
    async fn write_head(&mut self, head: PartialContent) -> io::Result<()>;

    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()>;

    async fn end(&mut self) -> io::Result<()>;

    /// Report a failure after the head was already written.
    async fn write_error(&mut self, status: u16, message: &str) -> io::Result<()>;
}

/// A sink that keeps everything it is given.
#[derive(Debug, Default)]
pub struct BufferedSink {
    pub head: Option<PartialContent>,
    pub body: BytesMut,
    pub ended: bool,
    pub error: Option<(u16, String)>,
}

#[async_trait]
impl FileSink for BufferedSink {
    async fn write_head(&mut self, head: PartialContent) -> io::Result<()> {
        self.head = Some(head);
        Ok(())
    }

    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        self.body.extend_from_slice(&chunk);
        Ok(())
    }

    async fn end(&mut self) -> io::Result<()> {
        self.ended = true;
        Ok(())
    }

    async fn write_error(&mut self, status: u16, message: &str) -> io::Result<()> {
        self.error = Some((status, message.to_string()));
        Ok(())
    }
}

/// Splits a payload stream into parts of exactly `part_size` bytes, the
/// last one possibly shorter.
struct PartChunker {
    stream: PayloadStream,
    part_size: usize,
    pending: BytesMut,
    exhausted: bool,
}

impl PartChunker {
    fn new(stream: PayloadStream, part_size: usize) -> Self {
        Self {
            stream,
            part_size,
            pending: BytesMut::new(),
            exhausted: false,
        }
    }

    async fn next_part(&mut self) -> io::Result<Option<Bytes>> {
        while !self.exhausted && self.pending.len() < self.part_size {
            match self.stream.next().await {
                Some(chunk) => self.pending.extend_from_slice(&chunk?),
                None => self.exhausted = true,
            }
        }
        if self.pending.is_empty() {
            return Ok(None);
        }
        let take = self.pending.len().min(self.part_size);
        Ok(Some(self.pending.split_to(take).freeze()))
    }

    /// Whether another part follows. Pulls at most one chunk to find out.
    async fn has_more(&mut self) -> io::Result<bool> {
        while self.pending.is_empty() && !self.exhausted {
            match self.stream.next().await {
                Some(chunk) => self.pending.extend_from_slice(&chunk?),
                None => self.exhausted = true,
            }
        }
        Ok(!self.pending.is_empty())
    }
}

pub struct ObjectGateway {
    client: Arc<dyn ObjectStoreClient>,
    provisioner: BucketProvisioner,
    config: Arc<AdapterConfig>,
    part_size: usize,
}

impl ObjectGateway {
    pub fn new(config: Arc<AdapterConfig>, client: Arc<dyn ObjectStoreClient>) -> Self {
        Self {
            provisioner: BucketProvisioner::new(client.clone(), config.bucket.clone()),
            client,
            config,
            part_size: DEFAULT_PART_SIZE,
        }
    }

    /// Override the multipart part size. Values below one byte are ignored.
    pub fn with_part_size(mut self, part_size: usize) -> Self {
        if part_size > 0 {
            self.part_size = part_size;
        }
        self
    }

    pub fn part_size(&self) -> usize {
        self.part_size
    }

    pub fn provisioner(&self) -> &BucketProvisioner {
        &self.provisioner
    }

    pub async fn ensure_bucket(&self) -> AdapterResult<()> {
        Ok(self.provisioner.ensure().await?)
    }

    /// Headers for a new object. An explicit ACL wins; otherwise direct
    /// access implies `public-read`.
    pub fn write_request(
        &self,
        key: &str,
        content_type: Option<&str>,
        options: Option<&CreateOptions>,
    ) -> PutObjectRequest {
        let acl = match self.config.file_acl {
            Some(acl) => acl.header_value().map(str::to_string),
            None => self.config.direct_access.then(|| "public-read".to_string()),
        };

        PutObjectRequest {
            key: key.to_string(),
            content_type: content_type.map(str::to_string),
            acl,
            cache_control: self.config.global_cache_control.clone(),
            server_side_encryption: self
                .config
                .server_side_encryption
                .map(|sse| sse.as_str().to_string()),
            metadata: options.map(|o| o.metadata.clone()).unwrap_or_default(),
            tagging: options.and_then(CreateOptions::encoded_tags),
        }
    }

    pub async fn create(
        &self,
        request: &PutObjectRequest,
        payload: Payload,
    ) -> AdapterResult<PutObjectOutput> {
        self.ensure_bucket().await?;

        match payload {
            Payload::Bytes(bytes) if bytes.len() <= self.part_size => {
                debug!(key = %request.key, size = bytes.len(), "single put");
                Ok(self.client.put_object(request, bytes).await?)
            }
            payload => self.upload_stream(request, payload.into_stream()).await,
        }
    }

    async fn upload_stream(
        &self,
        request: &PutObjectRequest,
        stream: PayloadStream,
    ) -> AdapterResult<PutObjectOutput> {
        let mut chunker = PartChunker::new(stream, self.part_size);
        let first = chunker
            .next_part()
            .await
            .map_err(AdapterError::Payload)?
            .unwrap_or_default();

        if !chunker.has_more().await.map_err(AdapterError::Payload)? {
            debug!(key = %request.key, size = first.len(), "stream fits in one part");
            return Ok(self.client.put_object(request, first).await?);
        }

        let upload_id = self.client.create_multipart_upload(request).await?;
        debug!(key = %request.key, %upload_id, part_size = self.part_size, "multipart upload started");

        match self
            .upload_parts(&request.key, &upload_id, first, &mut chunker)
            .await
        {
            Ok(output) => Ok(output),
            Err(err) => {
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload(&request.key, &upload_id)
                    .await
                {
                    warn!(
                        key = %request.key,
                        %upload_id,
                        error = %abort_err,
                        "failed to abort multipart upload"
                    );
                }
                Err(err)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first: Bytes,
        chunker: &mut PartChunker,
    ) -> AdapterResult<PutObjectOutput> {
        let mut parts = vec![self.upload_part(key, upload_id, 1, first).await?];
        let mut part_number = 2u32;

        while let Some(body) = chunker.next_part().await.map_err(AdapterError::Payload)? {
            parts.push(self.upload_part(key, upload_id, part_number, body).await?);
            part_number += 1;
        }

        parts.sort_by_key(|part| part.part_number);
        let count = parts.len();
        let mut output = self
            .client
            .complete_multipart_upload(key, upload_id, parts)
            .await?;
        output.parts.get_or_insert(count as u32);
        debug!(key, upload_id, parts = count, "multipart upload completed");
        Ok(output)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> AdapterResult<CompletedPart> {
        debug!(key, part_number, size = body.len(), "uploading part");
        Ok(self
            .client
            .upload_part(key, upload_id, part_number, body)
            .await?)
    }

    pub async fn delete(&self, key: &str) -> AdapterResult<DeleteObjectOutput> {
        self.ensure_bucket().await?;
        Ok(self.client.delete_object(key).await?)
    }

    /// Read the whole object into memory.
    pub async fn get_data(&self, key: &str) -> AdapterResult<Bytes> {
        self.ensure_bucket().await?;
        let output = self.client.get_object(key, None).await?;
        let Some(mut body) = output.body else {
            return Err(AdapterError::not_found(key));
        };

        let mut buffer = BytesMut::with_capacity(output.content_length.unwrap_or(0) as usize);
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    /// Stream a (possibly ranged) read into `sink` as a partial-content
    /// response and return the bytes that were sent.
    ///
    /// A body failure after the head was written is reported to the sink
    /// with a 404 and returned as [`AdapterError::Stream`].
    pub async fn stream_range(
        &self,
        key: &str,
        range: Option<&FileRange>,
        sink: &mut dyn FileSink,
    ) -> AdapterResult<Bytes> {
        self.ensure_bucket().await?;
        let output = self
            .client
            .get_object(key, range.map(FileRange::as_str))
            .await?;
        let Some(mut body) = output.body else {
            return Err(AdapterError::not_found(key));
        };

        let stream_error = |err: io::Error| AdapterError::Stream {
            key: key.to_string(),
            message: err.to_string(),
        };

        sink.write_head(PartialContent {
            status: 206,
            accept_ranges: output.accept_ranges,
            content_length: output.content_length,
            content_range: output.content_range,
            content_type: output.content_type,
        })
        .await
        .map_err(stream_error)?;

        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(chunk) => {
                    buffer.extend_from_slice(&chunk);
                    sink.write_chunk(chunk).await.map_err(stream_error)?;
                }
                Err(err) => {
                    warn!(key, error = %err, "object stream failed after headers were sent");
                    let message = format!("file `{}` could not be read: {}", key, err.message);
                    if let Err(sink_err) = sink.write_error(404, &message).await {
                        debug!(key, error = %sink_err, "sink closed before error was reported");
                    }
                    return Err(AdapterError::Stream { key: key.to_string(), message });
                }
            }
        }

        sink.end().await.map_err(stream_error)?;
        Ok(buffer.freeze())
    }
}
