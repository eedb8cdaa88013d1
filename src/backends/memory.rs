//! Process-local object store with S3-like behaviour.
//!
//! Used by the test suite and by `--memory` runs of the host. It mimics the
//! parts of S3 the adapter depends on: MD5 ETags, byte ranges, multipart
//! sessions, and `BucketAlreadyOwnedByYou` on a repeated create. Call
//! counters and failure switches let tests observe and break it.

use super::{
    ByteStream, GetObjectOutput, ObjectStoreClient, PutObjectRequest, s3::DEFAULT_PRESIGN_EXPIRY,
};
use crate::{
    errors::{BackendError, BackendErrorKind, BackendResult},
    models::{
        CompletedPart, FileRange,
        object::{DeleteObjectOutput, PutObjectOutput},
        range::RangeOutcome,
    },
    utils::encode_path_segments,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::atomic::{AtomicUsize, Ordering},
};
use tracing::debug;
use uuid::Uuid;

/// Size of the chunks a read body is split into.
const BODY_CHUNK_SIZE: usize = 64 * 1024;

/// A stored object and the request headers it was written with.
#[derive(Clone, Debug)]
pub struct MemoryObject {
    pub data: Bytes,
    pub etag: String,
    pub request: PutObjectRequest,
}

struct MultipartSession {
    request: PutObjectRequest,
    parts: BTreeMap<u32, (String, Bytes)>,
}

#[derive(Default)]
struct MemoryState {
    bucket_exists: bool,
    objects: HashMap<String, MemoryObject>,
    uploads: HashMap<String, MultipartSession>,
}

#[derive(Default)]
struct Faults {
    head_bucket: Option<BackendError>,
    create_bucket: Option<BackendError>,
    upload_part: Option<u32>,
    broken_bodies: HashSet<String>,
}

#[derive(Default)]
struct Counters {
    head_bucket: AtomicUsize,
    create_bucket: AtomicUsize,
    put_object: AtomicUsize,
    upload_part: AtomicUsize,
    abort_upload: AtomicUsize,
    presign: AtomicUsize,
}

pub struct MemoryStore {
    bucket: String,
    region: String,
    state: Mutex<MemoryState>,
    faults: Mutex<Faults>,
    counters: Counters,
}

impl MemoryStore {
    /// A store whose bucket does not exist yet.
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            state: Mutex::new(MemoryState::default()),
            faults: Mutex::new(Faults::default()),
            counters: Counters::default(),
        }
    }

    /// A store whose bucket already exists.
    pub fn with_bucket(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        let store = Self::new(bucket, region);
        store.state.lock().bucket_exists = true;
        store
    }

    pub fn object(&self, key: &str) -> Option<MemoryObject> {
        self.state.lock().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn bucket_exists(&self) -> bool {
        self.state.lock().bucket_exists
    }

    /// Multipart uploads started but neither completed nor aborted.
    pub fn open_uploads(&self) -> usize {
        self.state.lock().uploads.len()
    }

    pub fn head_bucket_calls(&self) -> usize {
        self.counters.head_bucket.load(Ordering::SeqCst)
    }

    pub fn create_bucket_calls(&self) -> usize {
        self.counters.create_bucket.load(Ordering::SeqCst)
    }

    pub fn put_object_calls(&self) -> usize {
        self.counters.put_object.load(Ordering::SeqCst)
    }

    pub fn upload_part_calls(&self) -> usize {
        self.counters.upload_part.load(Ordering::SeqCst)
    }

    pub fn abort_upload_calls(&self) -> usize {
        self.counters.abort_upload.load(Ordering::SeqCst)
    }

    pub fn presign_calls(&self) -> usize {
        self.counters.presign.load(Ordering::SeqCst)
    }

    /// Fail the next existence check with `err`.
    pub fn fail_next_head_bucket(&self, err: BackendError) {
        self.faults.lock().head_bucket = Some(err);
    }

    /// Fail the next bucket creation with `err`.
    pub fn fail_next_create_bucket(&self, err: BackendError) {
        self.faults.lock().create_bucket = Some(err);
    }

    /// Reject every upload of the given part number.
    pub fn fail_upload_part(&self, part_number: u32) {
        self.faults.lock().upload_part = Some(part_number);
    }

    /// Reads of `key` yield their first chunk and then an error.
    pub fn break_body(&self, key: impl Into<String>) {
        self.faults.lock().broken_bodies.insert(key.into());
    }

    fn ensure_bucket(&self, state: &MemoryState) -> BackendResult<()> {
        if state.bucket_exists {
            Ok(())
        } else {
            Err(BackendError::new(
                BackendErrorKind::NoSuchBucket,
                "The specified bucket does not exist",
            )
            .with_code("NoSuchBucket")
            .with_status(404))
        }
    }

    fn body_stream(data: Bytes, broken: bool) -> ByteStream {
        let mut chunks = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + BODY_CHUNK_SIZE).min(data.len());
            chunks.push(Ok(data.slice(offset..end)));
            offset = end;
        }
        if broken {
            chunks.truncate(1);
            chunks.push(Err(BackendError::other("connection reset while reading body")));
        }
        futures::stream::iter(chunks).boxed()
    }
}

fn etag_of(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

#[async_trait]
impl ObjectStoreClient for MemoryStore {
    async fn head_bucket(&self) -> BackendResult<()> {
        self.counters.head_bucket.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.faults.lock().head_bucket.take() {
            return Err(err);
        }
        let state = self.state.lock();
        self.ensure_bucket(&state)
    }

    async fn create_bucket(&self) -> BackendResult<()> {
        self.counters.create_bucket.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.faults.lock().create_bucket.take() {
            return Err(err);
        }
        let mut state = self.state.lock();
        if state.bucket_exists {
            return Err(BackendError::new(
                BackendErrorKind::BucketAlreadyOwnedByYou,
                "Your previous request to create the named bucket succeeded and you already own it.",
            )
            .with_code("BucketAlreadyOwnedByYou")
            .with_status(409));
        }
        state.bucket_exists = true;
        debug!(bucket = %self.bucket, "memory bucket created");
        Ok(())
    }

    async fn put_object(
        &self,
        request: &PutObjectRequest,
        body: Bytes,
    ) -> BackendResult<PutObjectOutput> {
        self.counters.put_object.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        self.ensure_bucket(&state)?;

        let etag = etag_of(&body);
        state.objects.insert(
            request.key.clone(),
            MemoryObject {
                data: body,
                etag: etag.clone(),
                request: request.clone(),
            },
        );
        Ok(PutObjectOutput {
            etag: Some(etag),
            version_id: None,
            parts: None,
        })
    }

    async fn get_object(&self, key: &str, range: Option<&str>) -> BackendResult<GetObjectOutput> {
        let object = {
            let state = self.state.lock();
            self.ensure_bucket(&state)?;
            state.objects.get(key).cloned()
        };
        let Some(object) = object else {
            return Err(
                BackendError::new(BackendErrorKind::NotFound, "The specified key does not exist.")
                    .with_code("NoSuchKey")
                    .with_status(404),
            );
        };
        let broken = self.faults.lock().broken_bodies.contains(key);

        let total = object.data.len() as u64;
        let outcome = range
            .map(|header| FileRange::new(header).resolve(total))
            .unwrap_or(RangeOutcome::Full);
        let content_type = object
            .request
            .content_type
            .clone()
            .or_else(|| Some("application/octet-stream".to_string()));

        match outcome {
            RangeOutcome::Unsatisfiable => Err(BackendError::new(
                BackendErrorKind::InvalidRange,
                "The requested range is not satisfiable",
            )
            .with_code("InvalidRange")
            .with_status(416)),
            RangeOutcome::Full => Ok(GetObjectOutput {
                status: 200,
                content_length: Some(total),
                accept_ranges: Some("bytes".to_string()),
                content_range: None,
                content_type,
                etag: Some(object.etag),
                body: Some(Self::body_stream(object.data, broken)),
            }),
            RangeOutcome::Partial { start, end } => {
                let slice = object.data.slice(start as usize..end as usize + 1);
                Ok(GetObjectOutput {
                    status: 206,
                    content_length: Some(slice.len() as u64),
                    accept_ranges: Some("bytes".to_string()),
                    content_range: Some(format!("bytes {}-{}/{}", start, end, total)),
                    content_type,
                    etag: Some(object.etag),
                    body: Some(Self::body_stream(slice, broken)),
                })
            }
        }
    }

    async fn delete_object(&self, key: &str) -> BackendResult<DeleteObjectOutput> {
        let mut state = self.state.lock();
        self.ensure_bucket(&state)?;
        // S3 answers 204 whether or not the key existed.
        state.objects.remove(key);
        Ok(DeleteObjectOutput {
            status: 204,
            delete_marker: false,
        })
    }

    async fn create_multipart_upload(&self, request: &PutObjectRequest) -> BackendResult<String> {
        let mut state = self.state.lock();
        self.ensure_bucket(&state)?;
        let upload_id = Uuid::new_v4().simple().to_string();
        state.uploads.insert(
            upload_id.clone(),
            MultipartSession {
                request: request.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> BackendResult<CompletedPart> {
        self.counters.upload_part.fetch_add(1, Ordering::SeqCst);
        if self.faults.lock().upload_part == Some(part_number) {
            return Err(BackendError::other(format!(
                "injected failure uploading part {}",
                part_number
            ))
            .with_status(500)
            .with_code("InternalError"));
        }

        let mut state = self.state.lock();
        let session = state
            .uploads
            .get_mut(upload_id)
            .filter(|session| session.request.key == key)
            .ok_or_else(|| no_such_upload(upload_id))?;
        let etag = etag_of(&body);
        session.parts.insert(part_number, (etag.clone(), body));
        Ok(CompletedPart { part_number, etag })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> BackendResult<PutObjectOutput> {
        let mut state = self.state.lock();
        if !state
            .uploads
            .get(upload_id)
            .is_some_and(|session| session.request.key == key)
        {
            return Err(no_such_upload(upload_id));
        }
        let session = state
            .uploads
            .remove(upload_id)
            .ok_or_else(|| no_such_upload(upload_id))?;

        if parts.is_empty() || parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            state.uploads.insert(upload_id.to_string(), session);
            return Err(BackendError::other("The list of parts was not in ascending order.")
                .with_code("InvalidPartOrder")
                .with_status(400));
        }

        let mut data = Vec::new();
        let mut digests = Vec::new();
        let mut invalid = None;
        for part in &parts {
            match session.parts.get(&part.part_number) {
                Some((etag, bytes)) if *etag == part.etag => {
                    data.extend_from_slice(bytes);
                    digests.extend_from_slice(&md5::compute(bytes).0);
                }
                _ => {
                    invalid = Some(part.part_number);
                    break;
                }
            }
        }
        if let Some(number) = invalid {
            state.uploads.insert(upload_id.to_string(), session);
            return Err(BackendError::other(format!(
                "part {} was not uploaded or its ETag does not match",
                number
            ))
            .with_code("InvalidPart")
            .with_status(400));
        }

        let etag = format!("{}-{}", etag_of(&digests), parts.len());
        state.objects.insert(
            key.to_string(),
            MemoryObject {
                data: Bytes::from(data),
                etag: etag.clone(),
                request: session.request,
            },
        );
        Ok(PutObjectOutput {
            etag: Some(etag),
            version_id: None,
            parts: Some(parts.len() as u32),
        })
    }

    async fn abort_multipart_upload(&self, _key: &str, upload_id: &str) -> BackendResult<()> {
        self.counters.abort_upload.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .uploads
            .remove(upload_id)
            .map(|_| ())
            .ok_or_else(|| no_such_upload(upload_id))
    }

    /// Not a real signature: the token is an MD5 of key and expiry, enough
    /// to exercise URL assembly without credentials.
    async fn presign_get(&self, key: &str, expires_in: Option<u32>) -> BackendResult<String> {
        self.counters.presign.fetch_add(1, Ordering::SeqCst);
        let expires = expires_in.unwrap_or(DEFAULT_PRESIGN_EXPIRY);
        let token = etag_of(format!("{}:{}", key, expires).as_bytes());
        Ok(format!(
            "{}?X-Amz-Expires={}&X-Amz-Signature={}",
            self.object_url(key),
            expires,
            token
        ))
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket,
            self.region,
            encode_path_segments(key)
        )
    }
}

fn no_such_upload(upload_id: &str) -> BackendError {
    BackendError::other(format!("upload `{}` does not exist", upload_id))
        .with_code("NoSuchUpload")
        .with_status(404)
}
