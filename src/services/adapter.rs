//! `FilesAdapter`, the surface a host server calls.

use crate::{
    backends::{ObjectStoreClient, S3Client},
    config::{AdapterConfig, AdapterOptions},
    errors::AdapterResult,
    models::{
        AccessContext, CreateOptions, FileRange, Payload, StoredObject,
        object::DeleteObjectOutput,
    },
    services::{
        bucket_provisioner::BucketReadiness,
        key_resolver::KeyResolver,
        location_resolver::LocationResolver,
        object_gateway::{FileSink, ObjectGateway},
    },
};
use bytes::Bytes;
use std::{fmt, sync::Arc};
use tracing::{debug, instrument};

pub struct FilesAdapter {
    config: Arc<AdapterConfig>,
    client: Arc<dyn ObjectStoreClient>,
    keys: KeyResolver,
    gateway: ObjectGateway,
    locations: LocationResolver,
}

impl FilesAdapter {
    /// Build an adapter backed by S3, resolving `options` against the
    /// environment.
    pub fn new(options: AdapterOptions) -> AdapterResult<Self> {
        let config = AdapterConfig::from_options(options)?;
        let client = Arc::new(S3Client::new(&config)?);
        Ok(Self::with_client(config, client))
    }

    /// Build an adapter on an existing backend client.
    pub fn with_client(config: AdapterConfig, client: Arc<dyn ObjectStoreClient>) -> Self {
        let config = Arc::new(config);
        Self {
            keys: KeyResolver::new(&config),
            gateway: ObjectGateway::new(config.clone(), client.clone()),
            locations: LocationResolver::new(config.clone(), client.clone()),
            client,
            config,
        }
    }

    /// Part size for multipart uploads (100 MiB unless changed).
    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.gateway = self.gateway.with_part_size(part_size);
        self
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn bucket_readiness(&self) -> BucketReadiness {
        self.gateway.provisioner().readiness()
    }

    /// Make sure the bucket exists. Every I/O operation does this first.
    pub async fn ensure_bucket(&self) -> AdapterResult<()> {
        self.gateway.ensure_bucket().await
    }

    /// Store `payload` under a key derived from `filename`.
    ///
    /// The returned `name` is what later calls expect. When `access` is
    /// given the public URL is resolved as well.
    #[instrument(skip(self, payload, options, access), fields(bucket = %self.config.bucket))]
    pub async fn create_file(
        &self,
        filename: &str,
        payload: impl Into<Payload>,
        content_type: Option<&str>,
        options: Option<&CreateOptions>,
        access: Option<&AccessContext>,
    ) -> AdapterResult<StoredObject> {
        let resolved = self.keys.resolve_new(filename, content_type, options)?;
        let request = self
            .gateway
            .write_request(&resolved.key, content_type, options);
        let response = self.gateway.create(&request, payload.into()).await?;

        let url = match access {
            Some(ctx) => Some(
                self.locations
                    .resolve(ctx, &resolved.name, &resolved)
                    .await?,
            ),
            None => None,
        };
        debug!(key = %resolved.key, etag = ?response.etag, "file created");

        Ok(StoredObject {
            location: self.client.object_url(&resolved.key),
            name: resolved.name,
            response,
            url,
        })
    }

    /// Deleting a key that does not exist succeeds.
    #[instrument(skip(self))]
    pub async fn delete_file(&self, filename: &str) -> AdapterResult<DeleteObjectOutput> {
        let resolved = self.keys.resolve_existing(filename)?;
        self.gateway.delete(&resolved.key).await
    }

    #[instrument(skip(self))]
    pub async fn get_file_data(&self, filename: &str) -> AdapterResult<Bytes> {
        let resolved = self.keys.resolve_existing(filename)?;
        self.gateway.get_data(&resolved.key).await
    }

    #[instrument(skip(self, ctx), fields(application_id = %ctx.application_id))]
    pub async fn get_file_location(
        &self,
        ctx: &AccessContext,
        filename: &str,
    ) -> AdapterResult<String> {
        let resolved = self.keys.resolve_existing(filename)?;
        self.locations.resolve(ctx, filename, &resolved).await
    }

    /// Stream `filename` into `sink` as partial content, honouring `range`.
    /// Returns the bytes that were streamed.
    #[instrument(skip(self, sink))]
    pub async fn handle_file_stream(
        &self,
        filename: &str,
        range: Option<&FileRange>,
        sink: &mut dyn FileSink,
    ) -> AdapterResult<Bytes> {
        let resolved = self.keys.resolve_existing(filename)?;
        self.gateway.stream_range(&resolved.key, range, sink).await
    }

    /// Run the configured filename hook. `None` when there is none and the
    /// host should apply its own rule.
    pub fn validate_filename(&self, filename: &str) -> Option<AdapterResult<()>> {
        self.config
            .validate_filename
            .as_ref()
            .map(|validate| validate(filename))
    }
}

impl fmt::Debug for FilesAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilesAdapter")
            .field("config", &self.config)
            .field("keys", &self.keys)
            .field("locations", &self.locations)
            .field("part_size", &self.gateway.part_size())
            .finish()
    }
}
