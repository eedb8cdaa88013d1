//! One-time bucket provisioning.
//!
//! The readiness flag is an atomic cell rather than a lock. Concurrent
//! callers that all see "not ready" may each run head-then-create; the
//! backend's "already exists" answer is accepted as success, so the worst
//! case is a few redundant calls.

use crate::{backends::ObjectStoreClient, errors::BackendResult};
use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BucketReadiness {
    Unknown = 0,
    Checking = 1,
    Ready = 2,
}

impl BucketReadiness {
    fn from_u8(value: u8) -> Self {
        match value {
            2 => Self::Ready,
            1 => Self::Checking,
            _ => Self::Unknown,
        }
    }
}

pub struct BucketProvisioner {
    client: Arc<dyn ObjectStoreClient>,
    bucket: String,
    state: AtomicU8,
}

impl BucketProvisioner {
    pub fn new(client: Arc<dyn ObjectStoreClient>, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            state: AtomicU8::new(BucketReadiness::Unknown as u8),
        }
    }

    pub fn readiness(&self) -> BucketReadiness {
        BucketReadiness::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Make sure the bucket exists. Free once it has succeeded; on failure
    /// the state drops back to `Unknown` so the next call retries.
    pub async fn ensure(&self) -> BackendResult<()> {
        if self.readiness() == BucketReadiness::Ready {
            return Ok(());
        }

        // Losing this race is fine: the other caller is provisioning too.
        let _ = self.state.compare_exchange(
            BucketReadiness::Unknown as u8,
            BucketReadiness::Checking as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );

        match self.provision().await {
            Ok(()) => {
                self.state
                    .store(BucketReadiness::Ready as u8, Ordering::Release);
                Ok(())
            }
            Err(err) => {
                // Never demote a bucket another caller already made ready.
                let _ = self.state.compare_exchange(
                    BucketReadiness::Checking as u8,
                    BucketReadiness::Unknown as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                Err(err)
            }
        }
    }

    async fn provision(&self) -> BackendResult<()> {
        match self.client.head_bucket().await {
            Ok(()) => {
                debug!(bucket = %self.bucket, "bucket exists");
                Ok(())
            }
            Err(err) if err.is_missing_bucket() => match self.client.create_bucket().await {
                Ok(()) => {
                    info!(bucket = %self.bucket, "created bucket");
                    Ok(())
                }
                Err(err) if err.is_already_exists() => {
                    debug!(bucket = %self.bucket, code = ?err.code, "bucket created concurrently");
                    Ok(())
                }
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        }
    }
}
