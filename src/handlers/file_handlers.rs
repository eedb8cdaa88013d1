//! HTTP handlers for the files routes of the reference host.
//!
//! Uploads stream the request body into the adapter, so large files go out
//! as multipart uploads without being buffered. Downloads are streamed back
//! through a channel-backed [`FileSink`].

use crate::{
    errors::{AdapterError, AdapterResult, AppError},
    handlers::AppState,
    models::{AccessContext, CreateOptions, FileRange, Payload},
    services::object_gateway::{FileSink, PartialContent},
};
use async_trait::async_trait;
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{
    SinkExt, StreamExt,
    channel::{mpsc, oneshot},
};
use serde::Serialize;
use std::io;
use tracing::debug;

const META_HEADER_PREFIX: &str = "x-file-meta-";
const TAG_HEADER_PREFIX: &str = "x-file-tag-";
const MAX_FILENAME_LEN: usize = 128;

#[derive(Debug, Serialize)]
pub struct CreatedFile {
    pub name: String,
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FileLocation {
    pub url: String,
}

/// Filename rule applied when the adapter has no validation hook:
/// 1 to 128 characters, starting with a letter, digit or underscore, then
/// letters, digits, `@`, `.`, space, `~`, `_` or `-`.
pub fn default_filename_rule(filename: &str) -> AdapterResult<()> {
    let mut chars = filename.chars();
    let Some(first) = chars.next() else {
        return Err(AdapterError::InvalidFilename("filename is empty".into()));
    };
    if filename.chars().count() > MAX_FILENAME_LEN {
        return Err(AdapterError::InvalidFilename(format!(
            "filename is longer than {} characters",
            MAX_FILENAME_LEN
        )));
    }
    if !(first.is_ascii_alphanumeric() || first == '_') {
        return Err(AdapterError::InvalidFilename(format!(
            "filename `{}` must start with a letter, digit or underscore",
            filename
        )));
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || "@. ~_-".contains(*c))) {
        return Err(AdapterError::InvalidFilename(format!(
            "filename `{}` contains invalid character `{}`",
            filename, bad
        )));
    }
    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Collect `x-file-meta-*` and `x-file-tag-*` headers.
fn create_options(headers: &HeaderMap) -> Option<CreateOptions> {
    let mut options = CreateOptions::default();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else { continue };
        let name = name.as_str();
        if let Some(key) = name.strip_prefix(META_HEADER_PREFIX) {
            options.metadata.insert(key.to_string(), value.to_string());
        } else if let Some(key) = name.strip_prefix(TAG_HEADER_PREFIX) {
            options.tags.insert(key.to_string(), value.to_string());
        }
    }
    (!options.metadata.is_empty() || !options.tags.is_empty()).then_some(options)
}

/// `POST /files/{app_id}/{filename}`
pub async fn create_file(
    State(state): State<AppState>,
    Path((app_id, filename)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    match state.adapter.validate_filename(&filename) {
        Some(result) => result?,
        None => default_filename_rule(&filename)?,
    }

    let content_type = header_str(&headers, header::CONTENT_TYPE);
    let options = create_options(&headers);
    let access = AccessContext::new(state.public_url.as_str(), app_id);

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));

    let stored = state
        .adapter
        .create_file(
            &filename,
            Payload::from_stream(stream),
            content_type,
            options.as_ref(),
            Some(&access),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedFile {
            name: stored.name,
            url: stored.url,
        }),
    ))
}

/// `GET /files/{app_id}/{*filename}`. With a `Range` header the body is
/// sent as 206 Partial Content, otherwise as a plain 200.
pub async fn get_file(
    State(state): State<AppState>,
    Path((_app_id, filename)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let range = FileRange::from_header(header_str(&headers, header::RANGE));
    let ranged = range.is_some();

    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(8);
    let adapter = state.adapter.clone();
    let task = tokio::spawn(async move {
        let mut sink = ChannelSink {
            head: Some(head_tx),
            body: body_tx,
        };
        adapter
            .handle_file_stream(&filename, range.as_ref(), &mut sink)
            .await
    });

    let Ok(head) = head_rx.await else {
        // The sink was dropped before a head was written: the read failed
        // before any byte was sent.
        return match task.await {
            Ok(Err(err)) => Err(err.into()),
            Ok(Ok(_)) => Err(AppError::internal("stream finished without a response head")),
            Err(err) => Err(AppError::internal(format!("stream task failed: {}", err))),
        };
    };

    let status = if ranged { head.status } else { StatusCode::OK.as_u16() };
    let mut response = Response::builder().status(status);
    if let Some(value) = head.accept_ranges {
        response = response.header(header::ACCEPT_RANGES, value);
    }
    if let Some(value) = head.content_length {
        response = response.header(header::CONTENT_LENGTH, value);
    }
    if let Some(value) = head.content_range.filter(|_| ranged) {
        response = response.header(header::CONTENT_RANGE, value);
    }
    if let Some(value) = head.content_type {
        response = response.header(header::CONTENT_TYPE, value);
    }

    response
        .body(Body::from_stream(body_rx))
        .map_err(|err| AppError::internal(err.to_string()))
}

/// `DELETE /files/{app_id}/{*filename}`
pub async fn delete_file(
    State(state): State<AppState>,
    Path((_app_id, filename)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state.adapter.delete_file(&filename).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /locations/{app_id}/{*filename}`
pub async fn file_location(
    State(state): State<AppState>,
    Path((app_id, filename)): Path<(String, String)>,
) -> Result<Json<FileLocation>, AppError> {
    let access = AccessContext::new(state.public_url.as_str(), app_id);
    let url = state.adapter.get_file_location(&access, &filename).await?;
    Ok(Json(FileLocation { url }))
}

/// Forwards a streamed read into an HTTP response body.
struct ChannelSink {
    head: Option<oneshot::Sender<PartialContent>>,
    body: mpsc::Sender<io::Result<Bytes>>,
}

fn disconnected() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected")
}

#[async_trait]
impl FileSink for ChannelSink {
    async fn write_head(&mut self, head: PartialContent) -> io::Result<()> {
        match self.head.take() {
            Some(tx) => tx.send(head).map_err(|_| disconnected()),
            None => Err(io::Error::other("response head already written")),
        }
    }

    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        self.body.send(Ok(chunk)).await.map_err(|_| disconnected())
    }

    async fn end(&mut self) -> io::Result<()> {
        self.body.close_channel();
        Ok(())
    }

    /// Headers are gone by now; failing the body makes the server abort the
    /// response instead of ending it cleanly.
    async fn write_error(&mut self, status: u16, message: &str) -> io::Result<()> {
        debug!(status, message, "aborting streamed response");
        let err = io::Error::new(io::ErrorKind::NotFound, message.to_string());
        self.body.send(Err(err)).await.map_err(|_| disconnected())
    }
}
