//! Request handlers of the reference host server.

pub mod file_handlers;
pub mod health_handlers;

use crate::services::adapter::FilesAdapter;
use std::sync::Arc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub adapter: Arc<FilesAdapter>,
    /// Public URL the files routes are reachable under; the mount of
    /// server-proxied locations.
    pub public_url: String,
}

impl AppState {
    pub fn new(adapter: Arc<FilesAdapter>, public_url: impl Into<String>) -> Self {
        Self {
            adapter,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }
}
