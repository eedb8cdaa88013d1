//! Multipart upload parts.

use serde::{Deserialize, Serialize};

/// Size of every multipart part except possibly the last (100 MiB).
pub const DEFAULT_PART_SIZE: usize = 100 * 1024 * 1024;

/// A part accepted by the backend, as listed when completing an upload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CompletedPart {
    /// Part number (1-based).
    pub part_number: u32,

    /// ETag returned by the backend for this part.
    pub etag: String,
}
