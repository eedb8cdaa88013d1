//! Adapter services, leaf to root: key resolution, bucket provisioning,
//! object I/O, location resolution and the facade composing them.

pub mod adapter;
pub mod bucket_provisioner;
pub mod key_resolver;
pub mod location_resolver;
pub mod object_gateway;
