//! User-defined metadata and tags attached to an object at creation time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Optional per-file settings accepted by `create_file`.
///
/// Metadata is sent as `x-amz-meta-*` headers; tags are sent as a single
/// `x-amz-tagging` header in query-string form.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Arbitrary key/value strings stored with the object.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    /// Object tags (key/value).
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl CreateOptions {
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Serialize tags as `k1=v1&k2=v2` with URL-encoded keys and values.
    ///
    /// Entries with an empty value are skipped. Returns `None` when nothing
    /// remains to send.
    pub fn encoded_tags(&self) -> Option<String> {
        let encoded = self
            .tags
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(value)
                )
            })
            .collect::<Vec<_>>();

        if encoded.is_empty() {
            None
        } else {
            Some(encoded.join("&"))
        }
    }
}
