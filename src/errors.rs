//! Error taxonomy for the adapter and its HTTP mapping.
//!
//! Library code returns [`AdapterError`]; the object-store capability
//! reports [`BackendError`]. The reference host converts both into
//! [`AppError`], which renders as a small JSON body.

use crate::utils::extract_xml_element;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{fmt, io};
use thiserror::Error;

/// Error type accepted from caller-supplied hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type AdapterResult<T> = Result<T, AdapterError>;
pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("key generation failed for `{filename}`: {source}")]
    KeyGeneration {
        filename: String,
        #[source]
        source: BoxError,
    },
    #[error("invalid filename: {0}")]
    InvalidFilename(String),
    #[error("file `{key}` not found")]
    NotFound { key: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("failed to read upload payload: {0}")]
    Payload(#[source] io::Error),
    #[error("stream for `{key}` failed after headers were sent: {message}")]
    Stream { key: String, message: String },
}

impl AdapterError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// True for every flavour of "the object is not there", whether the
    /// adapter detected it or the backend reported it.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Backend(err) => err.kind == BackendErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Coarse classification of backend failures. Only the "already exists"
/// kinds are interpreted by the adapter (during bucket creation); the rest
/// exist so callers can map responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    NotFound,
    NoSuchBucket,
    BucketAlreadyExists,
    BucketAlreadyOwnedByYou,
    InvalidRange,
    Other,
}

/// A failure reported by the object store, carried verbatim.
#[derive(Debug, Clone)]
pub struct BackendError {
    pub kind: BackendErrorKind,
    /// HTTP status returned by the backend, when there was one.
    pub status: Option<u16>,
    /// Backend-specific error identifier, e.g. `NoSuchKey`.
    pub code: Option<String>,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Other, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Classify an S3 error response from its status and XML body.
    ///
    /// The `<Code>` element takes priority over the status; HEAD responses
    /// have no body so the status alone decides there.
    pub fn from_response(status: u16, body: &str) -> Self {
        let code = extract_xml_element(body, "Code");
        let message = extract_xml_element(body, "Message")
            .or_else(|| code.clone())
            .unwrap_or_else(|| format!("backend responded with status {}", status));

        let kind = match code.as_deref() {
            Some("NoSuchKey") => BackendErrorKind::NotFound,
            Some("NoSuchBucket") => BackendErrorKind::NoSuchBucket,
            Some("BucketAlreadyExists") => BackendErrorKind::BucketAlreadyExists,
            Some("BucketAlreadyOwnedByYou") => BackendErrorKind::BucketAlreadyOwnedByYou,
            Some("InvalidRange") => BackendErrorKind::InvalidRange,
            Some(_) => BackendErrorKind::Other,
            None => match status {
                404 => BackendErrorKind::NotFound,
                416 => BackendErrorKind::InvalidRange,
                _ => BackendErrorKind::Other,
            },
        };

        Self {
            kind,
            status: Some(status),
            code,
            message,
        }
    }

    /// "Already exists" and "already owned by you" both mean the bucket is
    /// there and usable.
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self.kind,
            BackendErrorKind::BucketAlreadyExists | BackendErrorKind::BucketAlreadyOwnedByYou
        )
    }

    pub fn is_missing_bucket(&self) -> bool {
        matches!(
            self.kind,
            BackendErrorKind::NoSuchBucket | BackendErrorKind::NotFound
        )
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, self.status) {
            (Some(code), Some(status)) => write!(f, "{} ({}, {})", self.message, code, status),
            (Some(code), None) => write!(f, "{} ({})", self.message, code),
            (None, Some(status)) => write!(f, "{} ({})", self.message, status),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for BackendError {}

/// A lightweight wrapper for errors surfaced over HTTP by the reference host.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<AdapterError> for AppError {
    fn from(err: AdapterError) -> Self {
        if err.is_not_found() {
            return AppError::not_found(err.to_string());
        }
        match &err {
            AdapterError::InvalidFilename(_) => AppError::bad_request(err.to_string()),
            AdapterError::Backend(backend) if backend.kind == BackendErrorKind::InvalidRange => {
                AppError::new(StatusCode::RANGE_NOT_SATISFIABLE, err.to_string())
            }
            _ => AppError::internal(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}
