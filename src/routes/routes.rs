//! Routes of the reference host server.
//!
//! ## Structure
//! - **Files**
//!   - `POST   /files/{app_id}/{*filename}` : upload (`x-file-meta-*` / `x-file-tag-*` headers)
//!   - `GET    /files/{app_id}/{*filename}` : download, 206 when a `Range` header is sent
//!   - `DELETE /files/{app_id}/{*filename}` : delete
//!
//! - **Locations**
//!   - `GET    /locations/{app_id}/{*filename}` : public URL of a file
//!
//! - **Probes**: `GET /healthz`, `GET /readyz`
//!
//! The wildcard `*filename` allows nested names like `photos/2025/img.jpg`.
//! Uploads go through the filename rule, which rejects `/`.

use crate::handlers::{
    AppState,
    file_handlers::{create_file, delete_file, file_location, get_file},
    health_handlers::{healthz, readyz},
};
use axum::{Router, routing::get};

/// Build the router; the caller attaches an [`AppState`].
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/files/{app_id}/{*filename}",
            get(get_file).post(create_file).delete(delete_file),
        )
        .route("/locations/{app_id}/{*filename}", get(file_location))
}
