//! Value objects shared by the adapter services.
//!
//! None of these are persisted by the adapter itself; the bytes live in the
//! backing object store and the host keeps whatever names it needs.

pub mod access;
pub mod metadata;
pub mod multipart;
pub mod object;
pub mod range;

pub use access::AccessContext;
pub use metadata::CreateOptions;
pub use multipart::{CompletedPart, DEFAULT_PART_SIZE};
pub use object::{Payload, StoredObject};
pub use range::FileRange;
