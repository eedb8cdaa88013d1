//! Tests for the files adapter against the in-memory backend.

use bytes::Bytes;
use s3_files_adapter::{
    AccessContext, AdapterConfig, AdapterError, AdapterOptions, BackendError, BaseUrl,
    BufferedSink, CreateOptions, FileRange, FilesAdapter, MemoryStore, Payload, S3Client,
    StaticCredentials, services::bucket_provisioner::BucketReadiness,
};
use std::sync::Arc;

fn adapter(options: AdapterOptions) -> (Arc<MemoryStore>, FilesAdapter) {
    let config = AdapterConfig::from_options_with_env(options, |_| None).unwrap();
    let store = Arc::new(MemoryStore::new(
        config.bucket.clone(),
        config.region.clone(),
    ));
    let adapter = FilesAdapter::with_client(config, store.clone());
    (store, adapter)
}

fn ctx() -> AccessContext {
    AccessContext::new("http://h/api", "app1")
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn test_proxied_location() {
    let (store, adapter) = adapter(AdapterOptions::new("demo"));
    adapter
        .create_file("a.txt", "hi", None, None, None)
        .await
        .unwrap();

    let url = adapter.get_file_location(&ctx(), "a.txt").await.unwrap();
    assert_eq!(url, "http://h/api/files/app1/a.txt");
    assert_eq!(store.presign_calls(), 0);
}

#[tokio::test]
async fn test_direct_location() {
    let (_, adapter) = adapter(AdapterOptions::new("demo").direct_access(true));
    adapter
        .create_file("a.txt", "hi", None, None, None)
        .await
        .unwrap();

    let url = adapter.get_file_location(&ctx(), "a.txt").await.unwrap();
    assert_eq!(url, "https://demo.s3.amazonaws.com/a.txt");
}

#[tokio::test]
async fn test_base_url_direct_drops_prefix() {
    let (_, adapter) = adapter(
        AdapterOptions::new("demo")
            .bucket_prefix("p/")
            .direct_access(true)
            .base_url("http://cdn/x")
            .base_url_direct(true),
    );

    let url = adapter.get_file_location(&ctx(), "a.txt").await.unwrap();
    assert_eq!(url, "http://cdn/x/a.txt");
}

#[tokio::test]
async fn test_dynamic_base_url() {
    let (_, adapter) = adapter(
        AdapterOptions::new("demo")
            .bucket_prefix("p/")
            .direct_access(true)
            .base_url(BaseUrl::dynamic(|ctx: &AccessContext, _: &str| {
                let base = format!("https://{}.files.test", ctx.application_id);
                async move { Ok(base) }
            })),
    );

    let url = adapter.get_file_location(&ctx(), "a b.txt").await.unwrap();
    assert_eq!(url, "https://app1.files.test/p/a%20b.txt");
}

#[tokio::test]
async fn test_presigned_location_is_signed_for_configured_credentials() {
    let config = AdapterConfig::from_options_with_env(
        AdapterOptions::new("demo")
            .region("eu-west-1")
            .credentials(StaticCredentials::new("AKIDEXAMPLE", "secret"))
            .direct_access(true)
            .presigned_url(true, Some(300)),
        |_| None,
    )
    .unwrap();
    let client = Arc::new(S3Client::new(&config).unwrap());
    let adapter = FilesAdapter::with_client(config, client);

    let url = adapter.get_file_location(&ctx(), "a.txt").await.unwrap();
    let decoded = urlencoding::decode(&url).unwrap();
    assert!(url.contains("X-Amz-Signature="), "{}", url);
    assert!(url.contains("X-Amz-Expires=300"), "{}", url);
    assert!(decoded.contains("X-Amz-Credential=AKIDEXAMPLE/"), "{}", decoded);
    assert!(decoded.contains("/eu-west-1/s3/aws4_request"), "{}", decoded);
}

#[tokio::test]
async fn test_create_returns_handle() {
    let (store, adapter) = adapter(AdapterOptions::new("demo").bucket_prefix("uploads/"));
    let stored = adapter
        .create_file("a.txt", "hi", Some("text/plain"), None, Some(&ctx()))
        .await
        .unwrap();

    assert_eq!(stored.name, "a.txt");
    assert_eq!(
        stored.location,
        "https://demo.s3.us-east-1.amazonaws.com/uploads/a.txt"
    );
    assert_eq!(stored.url.as_deref(), Some("http://h/api/files/app1/a.txt"));
    assert_eq!(
        stored.response.etag.as_deref(),
        Some(format!("{:x}", md5::compute(b"hi")).as_str())
    );
    assert_eq!(store.keys(), vec!["uploads/a.txt".to_string()]);
}

#[tokio::test]
async fn test_round_trip_single_part() {
    let (store, adapter) = adapter(AdapterOptions::new("demo"));
    let data = pattern(10_000);

    adapter
        .create_file("blob.bin", data.clone(), None, None, None)
        .await
        .unwrap();

    assert_eq!(adapter.get_file_data("blob.bin").await.unwrap(), data);
    assert_eq!(store.put_object_calls(), 1);
    assert_eq!(store.upload_part_calls(), 0);
}

#[tokio::test]
async fn test_round_trip_multipart() {
    let (store, adapter) = adapter(AdapterOptions::new("demo"));
    let adapter = adapter.with_part_size(1024);
    let data = pattern(5 * 1024 + 17);

    let stored = adapter
        .create_file("big.bin", data.clone(), None, None, None)
        .await
        .unwrap();

    assert_eq!(stored.response.parts, Some(6));
    assert!(stored.response.etag.unwrap().ends_with("-6"));
    assert_eq!(adapter.get_file_data("big.bin").await.unwrap(), data);
    assert_eq!(store.put_object_calls(), 0);
    assert_eq!(store.upload_part_calls(), 6);
    assert_eq!(store.open_uploads(), 0);
}

#[tokio::test]
async fn test_round_trip_from_reader() {
    let (_, adapter) = adapter(AdapterOptions::new("demo"));
    let adapter = adapter.with_part_size(4096);
    let data = pattern(20_000);

    adapter
        .create_file(
            "reader.bin",
            Payload::from_reader(std::io::Cursor::new(data.clone())),
            None,
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(adapter.get_file_data("reader.bin").await.unwrap(), data);
}

#[tokio::test]
async fn test_multipart_failure_leaves_no_upload_behind() {
    let (store, adapter) = adapter(AdapterOptions::new("demo"));
    let adapter = adapter.with_part_size(1024);
    store.fail_upload_part(3);

    let err = adapter
        .create_file("big.bin", pattern(4096), None, None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, AdapterError::Backend(_)));
    assert_eq!(store.abort_upload_calls(), 1);
    assert_eq!(store.open_uploads(), 0);
    assert!(adapter.get_file_data("big.bin").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_delete_then_read_is_not_found() {
    let (_, adapter) = adapter(AdapterOptions::new("demo"));
    adapter
        .create_file("a.txt", "hi", None, None, None)
        .await
        .unwrap();

    let output = adapter.delete_file("a.txt").await.unwrap();
    assert_eq!(output.status, 204);

    let err = adapter.get_file_data("a.txt").await.unwrap_err();
    assert!(err.is_not_found());

    // Deleting again is not an error.
    adapter.delete_file("a.txt").await.unwrap();
}

#[tokio::test]
async fn test_range_stream() {
    let (_, adapter) = adapter(AdapterOptions::new("demo"));
    adapter
        .create_file(
            "movie.mp4",
            "abcdefghijklmnopqrstuvwxyz0123456789",
            Some("video/mp4"),
            None,
            None,
        )
        .await
        .unwrap();

    let mut sink = BufferedSink::default();
    let range = FileRange::new("bytes=0-10");
    let bytes = adapter
        .handle_file_stream("movie.mp4", Some(&range), &mut sink)
        .await
        .unwrap();

    assert_eq!(bytes, Bytes::from_static(b"abcdefghijk"));
    assert_eq!(sink.body, &b"abcdefghijk"[..]);
    let head = sink.head.unwrap();
    assert_eq!(head.status, 206);
    assert_eq!(head.content_range.as_deref(), Some("bytes 0-10/36"));
    assert_eq!(head.content_length, Some(11));
    assert!(sink.ended);
}

#[tokio::test]
async fn test_stream_without_range_is_still_partial_content() {
    let (_, adapter) = adapter(AdapterOptions::new("demo"));
    adapter
        .create_file("a.txt", "hello", None, None, None)
        .await
        .unwrap();

    let mut sink = BufferedSink::default();
    let bytes = adapter
        .handle_file_stream("a.txt", None, &mut sink)
        .await
        .unwrap();

    assert_eq!(bytes, Bytes::from_static(b"hello"));
    assert_eq!(sink.head.unwrap().status, 206);
}

#[tokio::test]
async fn test_bucket_is_provisioned_once() {
    let (store, adapter) = adapter(AdapterOptions::new("demo"));

    for i in 0..5 {
        let name = format!("f{}.txt", i);
        adapter
            .create_file(&name, "x", None, None, None)
            .await
            .unwrap();
        adapter.get_file_data(&name).await.unwrap();
    }
    adapter.delete_file("f0.txt").await.unwrap();

    assert_eq!(store.head_bucket_calls(), 1);
    assert_eq!(store.create_bucket_calls(), 1);
    assert_eq!(adapter.bucket_readiness(), BucketReadiness::Ready);
}

#[tokio::test]
async fn test_bucket_failure_stops_the_write() {
    let (store, adapter) = adapter(AdapterOptions::new("demo"));
    store.fail_next_head_bucket(BackendError::other("Access Denied").with_status(403));

    let err = adapter
        .create_file("a.txt", "hi", None, None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, AdapterError::Backend(ref e) if e.status == Some(403)));
    assert_eq!(store.put_object_calls(), 0);
    assert_eq!(adapter.bucket_readiness(), BucketReadiness::Unknown);

    adapter
        .create_file("a.txt", "hi", None, None, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_failing_key_generator_does_no_io() {
    let (store, adapter) = adapter(
        AdapterOptions::new("demo").generate_key(|_| Err("generator exploded".into())),
    );

    let err = adapter
        .create_file("a.txt", "hi", None, None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, AdapterError::KeyGeneration { .. }));
    assert_eq!(store.head_bucket_calls(), 0);
    assert_eq!(store.put_object_calls(), 0);
}

#[tokio::test]
async fn test_cleaned_names_round_trip() {
    let (store, adapter) = adapter(
        AdapterOptions::new("demo")
            .bucket_prefix("p/")
            .clean_key(true),
    );

    let stored = adapter
        .create_file("my report & notes.txt", "hi", None, None, None)
        .await
        .unwrap();

    assert_eq!(stored.name, "my-report-and-notes.txt");
    assert_eq!(store.keys(), vec!["p/my-report-and-notes.txt".to_string()]);
    assert_eq!(
        adapter.get_file_data(&stored.name).await.unwrap(),
        Bytes::from_static(b"hi")
    );
}

#[tokio::test]
async fn test_metadata_tags_and_headers_are_stored() {
    let (store, adapter) = adapter(
        AdapterOptions::new("demo")
            .direct_access(true)
            .global_cache_control("max-age=3600"),
    );
    let options = CreateOptions::default()
        .with_metadata("owner", "alice")
        .with_tag("project", "demo app")
        .with_tag("skipped", "");

    adapter
        .create_file("a.txt", "hi", Some("text/plain"), Some(&options), None)
        .await
        .unwrap();

    let request = store.object("a.txt").unwrap().request;
    assert_eq!(request.acl.as_deref(), Some("public-read"));
    assert_eq!(request.cache_control.as_deref(), Some("max-age=3600"));
    assert_eq!(request.content_type.as_deref(), Some("text/plain"));
    assert_eq!(request.metadata.get("owner").map(String::as_str), Some("alice"));
    assert_eq!(request.tagging.as_deref(), Some("project=demo%20app"));
}

#[test]
fn test_validate_filename_hook() {
    let (_, plain) = adapter(AdapterOptions::new("demo"));
    assert!(plain.validate_filename("anything").is_none());

    let (_, strict) = adapter(AdapterOptions::new("demo").validate_filename(|name| {
        if name.ends_with(".exe") {
            Err(AdapterError::InvalidFilename(format!("{} is not allowed", name)))
        } else {
            Ok(())
        }
    }));
    assert!(matches!(strict.validate_filename("a.txt"), Some(Ok(()))));
    assert!(matches!(
        strict.validate_filename("a.exe"),
        Some(Err(AdapterError::InvalidFilename(_)))
    ));
}
