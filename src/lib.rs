//! Files adapter for S3-compatible object storage.
//!
//! A host server hands [`FilesAdapter`] filenames and payloads; the adapter
//! derives storage keys, provisions the bucket once, moves bytes (multipart
//! for large payloads, ranged streaming for reads) and computes the URL a
//! client should use for each file.
//!
//! ```no_run
//! use s3_files_adapter::{AccessContext, AdapterOptions, FilesAdapter};
//!
//! # async fn run() -> Result<(), s3_files_adapter::AdapterError> {
//! let adapter = FilesAdapter::new(AdapterOptions::new("my-bucket").direct_access(true))?;
//! let stored = adapter
//!     .create_file("hello.txt", "hi", Some("text/plain"), None, None)
//!     .await?;
//! let url = adapter
//!     .get_file_location(&AccessContext::new("http://localhost:3000", "app"), &stored.name)
//!     .await?;
//! # let _ = url;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

pub use backends::{MemoryStore, ObjectStoreClient, S3Client};
pub use config::{
    AdapterConfig, AdapterOptions, BaseUrl, ClientOverrides, FileAcl, ServerSideEncryption,
    StaticCredentials,
};
pub use errors::{AdapterError, AdapterResult, BackendError, BackendErrorKind};
pub use models::{AccessContext, CreateOptions, FileRange, Payload, StoredObject};
pub use services::{
    adapter::FilesAdapter,
    object_gateway::{BufferedSink, FileSink, PartialContent},
};
