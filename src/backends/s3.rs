//! S3-compatible backend built on `rust-s3`.
//!
//! - Virtual-host addressing by default, path style for MinIO and friends.
//! - Per-request headers (ACL, SSE, metadata, tags, range) are attached to a
//!   cloned bucket handle so the shared handle never changes.
//! - Reads stream the body; a HEAD first supplies length, type and ETag,
//!   and the GET is pinned to that ETag with `If-Match`.
//! - Presigning is local computation; it never touches the network.

use super::{GetObjectOutput, ObjectStoreClient, PutObjectRequest};
use crate::{
    config::{AdapterConfig, DEFAULT_SIGNATURE_VERSION, StaticCredentials},
    errors::{AdapterError, AdapterResult, BackendError, BackendErrorKind, BackendResult},
    models::{
        CompletedPart, FileRange,
        object::{DeleteObjectOutput, PutObjectOutput},
        range::RangeOutcome,
    },
    utils::{encode_path_segments, extract_xml_element, unquote},
};
use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use bytes::Bytes;
use futures::StreamExt;
use s3::{
    BucketConfiguration, Region, bucket::Bucket, creds::Credentials, error::S3Error,
    request::ResponseData, serde_types::Part,
};
use std::collections::HashMap;
use tracing::debug;

/// Expiry used for presigned URLs when none is configured (seconds).
pub const DEFAULT_PRESIGN_EXPIRY: u32 = 900;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

pub struct S3Client {
    bucket: Box<Bucket>,
    bucket_name: String,
    region_name: String,
    region: Region,
    credentials: Credentials,
    endpoint: Option<String>,
    path_style: bool,
}

impl S3Client {
    /// Build a client for the configured bucket. No request is made.
    pub fn new(config: &AdapterConfig) -> AdapterResult<Self> {
        if !config
            .signature_version
            .eq_ignore_ascii_case(DEFAULT_SIGNATURE_VERSION)
        {
            return Err(AdapterError::configuration(format!(
                "signature version `{}` is not supported; only v4 is",
                config.signature_version
            )));
        }

        let credentials = Self::credentials(config.credentials.as_ref())?;
        let endpoint = config
            .endpoint
            .as_ref()
            .map(|endpoint| endpoint.trim_end_matches('/').to_string());
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: endpoint
                .clone()
                .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", config.region)),
        };

        let bucket = Bucket::new(&config.bucket, region.clone(), credentials.clone())
            .map_err(|e| AdapterError::configuration(format!("creating S3 bucket handle: {}", e)))?;
        let bucket = if config.force_path_style {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(Self {
            bucket,
            bucket_name: config.bucket.clone(),
            region_name: config.region.clone(),
            region,
            credentials,
            endpoint,
            path_style: config.force_path_style,
        })
    }

    fn credentials(explicit: Option<&StaticCredentials>) -> AdapterResult<Credentials> {
        match explicit {
            Some(creds) => Credentials::new(
                Some(&creds.access_key_id),
                Some(&creds.secret_access_key),
                creds.session_token.as_deref(),
                None,
                None,
            )
            .map_err(|e| AdapterError::configuration(format!("invalid S3 credentials: {}", e))),
            None => match Credentials::default() {
                Ok(creds) => Ok(creds),
                Err(err) => {
                    tracing::warn!(
                        "no S3 credentials configured or discovered ({}); using anonymous access",
                        err
                    );
                    Credentials::anonymous().map_err(|e| {
                        AdapterError::configuration(format!("anonymous S3 credentials: {}", e))
                    })
                }
            },
        }
    }

    /// Copy of the shared bucket handle carrying extra request headers.
    ///
    /// Headers are validated first; `rust-s3` panics on invalid ones.
    fn bucket_with_headers(&self, headers: &[(String, String)]) -> BackendResult<Bucket> {
        let mut bucket = self.bucket.as_ref().clone();
        for (name, value) in headers {
            if HeaderName::from_bytes(name.as_bytes()).is_err()
                || HeaderValue::from_str(value).is_err()
            {
                return Err(BackendError::other(format!(
                    "`{}` is not a valid request header value for `{}`",
                    value, name
                )));
            }
            bucket.add_header(name, value);
        }
        Ok(bucket)
    }
}

#[async_trait]
impl ObjectStoreClient for S3Client {
    /// HEAD on the bucket root (S3 HeadBucket). Needs only bucket-level
    /// permissions, unlike ListBuckets.
    async fn head_bucket(&self) -> BackendResult<()> {
        let (_, status) = self.bucket.head_object("/").await.map_err(map_s3_error)?;
        match status {
            200..=299 => Ok(()),
            404 => Err(
                BackendError::new(BackendErrorKind::NoSuchBucket, "bucket does not exist")
                    .with_code("NoSuchBucket")
                    .with_status(404),
            ),
            // HEAD responses carry no body, so the status is all there is.
            status => Err(BackendError::from_response(status, "")),
        }
    }

    async fn create_bucket(&self) -> BackendResult<()> {
        let response = if self.path_style {
            Bucket::create_with_path_style(
                &self.bucket_name,
                self.region.clone(),
                self.credentials.clone(),
                BucketConfiguration::default(),
            )
            .await
        } else {
            Bucket::create(
                &self.bucket_name,
                self.region.clone(),
                self.credentials.clone(),
                BucketConfiguration::default(),
            )
            .await
        }
        .map_err(map_s3_error)?;

        if (200..300).contains(&response.response_code) {
            Ok(())
        } else {
            Err(BackendError::from_response(
                response.response_code,
                &response.response_text,
            ))
        }
    }

    async fn put_object(
        &self,
        request: &PutObjectRequest,
        body: Bytes,
    ) -> BackendResult<PutObjectOutput> {
        let bucket = self.bucket_with_headers(&request.headers())?;
        let content_type = request.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
        debug!(key = %request.key, size = body.len(), "S3 PutObject");

        let response = bucket
            .put_object_with_content_type(&request.key, &body, content_type)
            .await
            .map_err(map_s3_error)?;
        ensure_success(&response)?;

        let headers = response.headers();
        Ok(PutObjectOutput {
            etag: header(&headers, "etag").map(|etag| unquote(&etag)),
            version_id: header(&headers, "x-amz-version-id"),
            parts: None,
        })
    }

    async fn get_object(&self, key: &str, range: Option<&str>) -> BackendResult<GetObjectOutput> {
        let (head, status) = self.bucket.head_object(key).await.map_err(map_s3_error)?;
        match status {
            200..=299 => {}
            404 => {
                return Err(BackendError::new(
                    BackendErrorKind::NotFound,
                    "The specified key does not exist.",
                )
                .with_code("NoSuchKey")
                .with_status(404));
            }
            status => return Err(BackendError::from_response(status, "")),
        }
        let total = head.content_length.and_then(|len| u64::try_from(len).ok());

        let mut headers = Vec::new();
        if let Some(range) = range {
            headers.push(("range".to_string(), range.to_string()));
        }
        if let Some(etag) = &head.e_tag {
            headers.push(("if-match".to_string(), etag.clone()));
        }
        let bucket = self.bucket_with_headers(&headers)?;
        debug!(key, ?range, "S3 GetObject");

        let mut response = bucket.get_object_stream(key).await.map_err(map_s3_error)?;
        let status = response.status_code;
        if !(200..300).contains(&status) {
            let mut body = Vec::new();
            while let Some(chunk) = response.bytes().next().await {
                body.extend_from_slice(&chunk.map_err(map_s3_error)?);
            }
            return Err(BackendError::from_response(
                status,
                &String::from_utf8_lossy(&body),
            ));
        }

        // The stream carries no headers; rebuild the range ones from the HEAD.
        let partial = match (status, range, total) {
            (206, Some(range), Some(total)) => match FileRange::new(range).resolve(total) {
                RangeOutcome::Partial { start, end } => Some((start, end, total)),
                _ => None,
            },
            _ => None,
        };

        Ok(GetObjectOutput {
            status,
            content_length: match partial {
                Some((start, end, _)) => Some(end - start + 1),
                None => total,
            },
            accept_ranges: head.accept_ranges,
            content_range: partial
                .map(|(start, end, total)| format!("bytes {}-{}/{}", start, end, total)),
            content_type: head.content_type,
            etag: head.e_tag.as_deref().map(unquote),
            body: Some(
                response
                    .bytes
                    .map(|chunk| chunk.map_err(map_s3_error))
                    .boxed(),
            ),
        })
    }

    async fn delete_object(&self, key: &str) -> BackendResult<DeleteObjectOutput> {
        let response = self.bucket.delete_object(key).await.map_err(map_s3_error)?;
        ensure_success(&response)?;

        let headers = response.headers();
        Ok(DeleteObjectOutput {
            status: response.status_code(),
            delete_marker: header(&headers, "x-amz-delete-marker").as_deref() == Some("true"),
        })
    }

    async fn create_multipart_upload(&self, request: &PutObjectRequest) -> BackendResult<String> {
        let bucket = self.bucket_with_headers(&request.headers())?;
        let content_type = request.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
        let response = bucket
            .initiate_multipart_upload(&request.key, content_type)
            .await
            .map_err(map_s3_error)?;
        Ok(response.upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> BackendResult<CompletedPart> {
        let part = self
            .bucket
            .put_multipart_chunk(body.to_vec(), key, part_number, upload_id, DEFAULT_CONTENT_TYPE)
            .await
            .map_err(map_s3_error)?;
        Ok(CompletedPart {
            part_number: part.part_number,
            etag: part.etag,
        })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> BackendResult<PutObjectOutput> {
        let count = parts.len() as u32;
        let parts = parts
            .into_iter()
            .map(|part| Part {
                part_number: part.part_number,
                etag: part.etag,
            })
            .collect();
        let response = self
            .bucket
            .complete_multipart_upload(key, upload_id, parts)
            .await
            .map_err(map_s3_error)?;
        ensure_success(&response)?;

        // S3 can report a failed completion inside a 200 response.
        let body = String::from_utf8_lossy(response.bytes());
        if body.contains("<Error>") {
            return Err(BackendError::from_response(500, &body));
        }

        let headers = response.headers();
        Ok(PutObjectOutput {
            etag: extract_xml_element(&body, "ETag")
                .map(|etag| unquote(&etag.replace("&quot;", "\""))),
            version_id: header(&headers, "x-amz-version-id"),
            parts: Some(count),
        })
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> BackendResult<()> {
        self.bucket
            .abort_upload(key, upload_id)
            .await
            .map_err(map_s3_error)
    }

    async fn presign_get(&self, key: &str, expires_in: Option<u32>) -> BackendResult<String> {
        self.bucket
            .presign_get(key, expires_in.unwrap_or(DEFAULT_PRESIGN_EXPIRY), None)
            .await
            .map_err(map_s3_error)
    }

    fn object_url(&self, key: &str) -> String {
        let key = encode_path_segments(key);
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint, self.bucket_name, key),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket_name, self.region_name, key
            ),
        }
    }
}

fn map_s3_error(err: S3Error) -> BackendError {
    match err {
        S3Error::HttpFailWithBody(status, body) => BackendError::from_response(status, &body),
        other => BackendError::other(other.to_string()),
    }
}

fn ensure_success(response: &ResponseData) -> BackendResult<()> {
    let status = response.status_code();
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(BackendError::from_response(
            status,
            &String::from_utf8_lossy(response.bytes()),
        ))
    }
}

fn header(headers: &HashMap<String, String>, name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AdapterOptions, ClientOverrides},
        services::bucket_provisioner::BucketProvisioner,
    };
    use axum::{
        Router,
        body::Body,
        extract::State,
        http::{HeaderMap, Method, StatusCode, Uri, header},
        response::{IntoResponse, Response},
    };
    use futures::TryStreamExt;
    use parking_lot::Mutex;
    use std::{
        io,
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
    };

    const ACCESS_DENIED: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
        <Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>";
    const OBJECT_ETAG: &str = "\"5eb63bbbe01eeed093cb22bb8f5acdc3\"";

    /// An S3 endpoint as seen by credentials scoped to bucket `demo`:
    /// account-level calls are denied.
    #[derive(Clone, Default)]
    struct ScopedS3 {
        bucket_exists: Arc<AtomicBool>,
        requests: Arc<Mutex<Vec<String>>>,
    }

    async fn scoped_s3(
        State(s3): State<ScopedS3>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
    ) -> Response {
        let path = uri.path().to_string();
        s3.requests.lock().push(format!("{} {}", method, path));

        if path == "/" {
            return (StatusCode::FORBIDDEN, ACCESS_DENIED).into_response();
        }
        if path.trim_end_matches('/') == "/demo" {
            return match method {
                Method::HEAD if s3.bucket_exists.load(Ordering::SeqCst) => {
                    StatusCode::OK.into_response()
                }
                Method::HEAD => StatusCode::NOT_FOUND.into_response(),
                Method::PUT => {
                    s3.bucket_exists.store(true, Ordering::SeqCst);
                    StatusCode::OK.into_response()
                }
                _ => (StatusCode::FORBIDDEN, ACCESS_DENIED).into_response(),
            };
        }
        if path != "/demo/a.txt" {
            return StatusCode::NOT_FOUND.into_response();
        }

        let object = Response::builder()
            .header(header::CONTENT_TYPE, "text/plain")
            .header(header::ETAG, OBJECT_ETAG)
            .header(header::ACCEPT_RANGES, "bytes");
        if method == Method::HEAD {
            return object
                .header(header::CONTENT_LENGTH, "11")
                .body(Body::empty())
                .unwrap();
        }
        if headers.get(header::IF_MATCH).and_then(|v| v.to_str().ok()) != Some(OBJECT_ETAG) {
            return StatusCode::PRECONDITION_FAILED.into_response();
        }
        match headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
            Some("bytes=0-4") => {
                let chunks = vec![
                    Ok::<_, io::Error>(Bytes::from_static(b"hel")),
                    Ok(Bytes::from_static(b"lo")),
                ];
                object
                    .status(StatusCode::PARTIAL_CONTENT)
                    .header(header::CONTENT_RANGE, "bytes 0-4/11")
                    .body(Body::from_stream(futures::stream::iter(chunks)))
                    .unwrap()
            }
            _ => object.body(Body::from("hello world")).unwrap(),
        }
    }

    async fn serve(s3: ScopedS3) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().fallback(scoped_s3).with_state(s3);
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}", addr)
    }

    fn path_style_client(endpoint: &str) -> S3Client {
        let options = AdapterOptions::new("demo")
            .endpoint(endpoint)
            .overrides(ClientOverrides {
                force_path_style: Some(true),
                ..Default::default()
            });
        S3Client::new(&config(options)).unwrap()
    }

    fn config(options: AdapterOptions) -> AdapterConfig {
        AdapterConfig::from_options_with_env(
            options.credentials(StaticCredentials::new("ACCESS_KEY", "SECRET_KEY")),
            |_| None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn presigns_with_configured_credentials_and_region() {
        let client = S3Client::new(&config(AdapterOptions::new("demo").region("eu-west-1"))).unwrap();
        let url = client.presign_get("a.txt", Some(600)).await.unwrap();
        let decoded = urlencoding::decode(&url).unwrap();

        assert!(url.contains("X-Amz-Signature="));
        assert!(url.contains("X-Amz-Expires=600"));
        assert!(decoded.contains("X-Amz-Credential=ACCESS_KEY/"));
        assert!(decoded.contains("/eu-west-1/s3/aws4_request"));
    }

    #[test]
    fn object_urls_follow_addressing_mode() {
        let aws = S3Client::new(&config(AdapterOptions::new("demo"))).unwrap();
        assert_eq!(
            aws.object_url("dir/a b.txt"),
            "https://demo.s3.us-east-1.amazonaws.com/dir/a%20b.txt"
        );

        let minio = S3Client::new(&config(
            AdapterOptions::new("demo").endpoint("http://localhost:9000/"),
        ))
        .unwrap();
        assert_eq!(minio.object_url("a.txt"), "http://localhost:9000/demo/a.txt");
    }

    #[test]
    fn rejects_unsupported_signature_versions() {
        let options = AdapterOptions {
            signature_version: Some("v2".into()),
            ..AdapterOptions::new("demo")
        };
        let err = S3Client::new(&config(options)).err().unwrap();
        assert!(matches!(err, AdapterError::Configuration(_)));
    }

    #[tokio::test]
    async fn bucket_check_stays_inside_the_bucket() {
        let s3 = ScopedS3::default();
        s3.bucket_exists.store(true, Ordering::SeqCst);
        let client = path_style_client(&serve(s3.clone()).await);

        client.head_bucket().await.unwrap();
        assert_eq!(*s3.requests.lock(), vec!["HEAD /demo/".to_string()]);
    }

    #[tokio::test]
    async fn missing_bucket_is_reported_and_created() {
        let s3 = ScopedS3::default();
        let client = Arc::new(path_style_client(&serve(s3.clone()).await));

        let err = client.head_bucket().await.unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::NoSuchBucket);
        assert_eq!(err.status, Some(404));

        BucketProvisioner::new(client, "demo").ensure().await.unwrap();
        assert!(s3.bucket_exists.load(Ordering::SeqCst));
        let requests = s3.requests.lock().clone();
        assert!(requests.contains(&"PUT /demo".to_string()), "{:?}", requests);
        assert!(!requests.contains(&"GET /".to_string()), "{:?}", requests);
    }

    #[tokio::test]
    async fn ranged_reads_are_streamed() {
        let s3 = ScopedS3::default();
        s3.bucket_exists.store(true, Ordering::SeqCst);
        let client = path_style_client(&serve(s3.clone()).await);

        let output = client.get_object("a.txt", Some("bytes=0-4")).await.unwrap();
        assert_eq!(output.status, 206);
        assert_eq!(output.content_length, Some(5));
        assert_eq!(output.content_range.as_deref(), Some("bytes 0-4/11"));
        assert_eq!(output.content_type.as_deref(), Some("text/plain"));
        assert_eq!(output.etag.as_deref(), Some("5eb63bbbe01eeed093cb22bb8f5acdc3"));

        let chunks: Vec<Bytes> = output.body.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"hello");
        assert_eq!(
            *s3.requests.lock(),
            vec!["HEAD /demo/a.txt".to_string(), "GET /demo/a.txt".to_string()]
        );
    }

    #[tokio::test]
    async fn full_reads_report_the_object_length() {
        let s3 = ScopedS3::default();
        let client = path_style_client(&serve(s3).await);

        let output = client.get_object("a.txt", None).await.unwrap();
        assert_eq!(output.status, 200);
        assert_eq!(output.content_length, Some(11));
        assert_eq!(output.content_range, None);
        let chunks: Vec<Bytes> = output.body.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"hello world");

        let err = client.get_object("missing.txt", None).await.unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::NotFound);
        assert_eq!(err.code.as_deref(), Some("NoSuchKey"));
    }

    #[test]
    fn refuses_invalid_header_values() {
        let client = S3Client::new(&config(AdapterOptions::new("demo"))).unwrap();
        let err = client
            .bucket_with_headers(&[("x-amz-meta-note".into(), "line\nbreak".into())])
            .err()
            .unwrap();
        assert_eq!(err.kind, BackendErrorKind::Other);
    }
}
