//! Request-scoped information the host passes when asking for a location.

use serde::{Deserialize, Serialize};

/// Where the host server is mounted and which application the file belongs
/// to. Used to build server-proxied file URLs.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AccessContext {
    /// Public URL of the host server mount, e.g. `http://h/api`.
    pub mount: String,

    /// Application identifier segment of the files route.
    pub application_id: String,
}

impl AccessContext {
    pub fn new(mount: impl Into<String>, application_id: impl Into<String>) -> Self {
        Self {
            mount: mount.into(),
            application_id: application_id.into(),
        }
    }
}
