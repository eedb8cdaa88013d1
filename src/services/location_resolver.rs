//! Public URL of a stored file.
//!
//! | direct | presigned | base URL | base URL direct | location                         |
//! |--------|-----------|----------|-----------------|----------------------------------|
//! | no     | any       | any      | any             | `{mount}/files/{app}/{filename}` |
//! | yes    | no        | unset    | any             | `https://{bucket}.s3.amazonaws.com/{key}` |
//! | yes    | no        | set      | no / yes        | `{base}/{key}` / `{base}/{name}` |
//! | yes    | yes       | unset    | any             | presigned GET URL                |
//! | yes    | yes       | set      | no / yes        | as above plus the presigned query |
//!
//! `key` includes the bucket prefix, `name` does not. Path segments are
//! percent-encoded one by one.

use crate::{
    backends::ObjectStoreClient,
    config::{AdapterConfig, BaseUrl},
    errors::AdapterResult,
    models::AccessContext,
    services::key_resolver::ResolvedKey,
    utils::encode_path_segments,
};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocationRule {
    Proxied,
    Bucket,
    BaseUrl { with_prefix: bool },
    Presigned,
    PresignedBaseUrl { with_prefix: bool },
}

impl LocationRule {
    pub fn for_config(config: &AdapterConfig) -> Self {
        match (
            config.direct_access,
            config.presigned_url,
            config.base_url.is_some(),
            config.base_url_direct,
        ) {
            (false, _, _, _) => Self::Proxied,
            (true, false, false, _) => Self::Bucket,
            (true, false, true, direct) => Self::BaseUrl {
                with_prefix: !direct,
            },
            (true, true, false, _) => Self::Presigned,
            (true, true, true, direct) => Self::PresignedBaseUrl {
                with_prefix: !direct,
            },
        }
    }
}

pub struct LocationResolver {
    client: Arc<dyn ObjectStoreClient>,
    config: Arc<AdapterConfig>,
    rule: LocationRule,
}

impl LocationResolver {
    pub fn new(config: Arc<AdapterConfig>, client: Arc<dyn ObjectStoreClient>) -> Self {
        Self {
            rule: LocationRule::for_config(&config),
            client,
            config,
        }
    }

    /// Location of `filename`, already resolved to `resolved`. Only the
    /// presigned rules call into the backend.
    pub async fn resolve(
        &self,
        ctx: &AccessContext,
        filename: &str,
        resolved: &ResolvedKey,
    ) -> AdapterResult<String> {
        let location = match self.rule {
            LocationRule::Proxied => format!(
                "{}/files/{}/{}",
                ctx.mount.trim_end_matches('/'),
                ctx.application_id,
                encode_path_segments(filename)
            ),
            LocationRule::Bucket => format!(
                "https://{}.s3.amazonaws.com/{}",
                self.config.bucket,
                encode_path_segments(&resolved.key)
            ),
            LocationRule::BaseUrl { with_prefix } => {
                self.base_url_location(ctx, filename, resolved, with_prefix)
                    .await?
            }
            LocationRule::Presigned => self.presign(&resolved.key).await?,
            LocationRule::PresignedBaseUrl { with_prefix } => {
                let signed = self.presign(&resolved.key).await?;
                let base = self
                    .base_url_location(ctx, filename, resolved, with_prefix)
                    .await?;
                match signed.split_once('?') {
                    Some((_, query)) if !query.is_empty() => format!("{}?{}", base, query),
                    _ => base,
                }
            }
        };
        debug!(rule = ?self.rule, filename, %location, "resolved file location");
        Ok(location)
    }

    async fn base_url_location(
        &self,
        ctx: &AccessContext,
        filename: &str,
        resolved: &ResolvedKey,
        with_prefix: bool,
    ) -> AdapterResult<String> {
        let base = match &self.config.base_url {
            Some(base_url) => base_url.resolve(ctx, filename).await?,
            None => String::new(),
        };
        let path = if with_prefix {
            &resolved.key
        } else {
            &resolved.name
        };
        Ok(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            encode_path_segments(path)
        ))
    }

    async fn presign(&self, key: &str) -> AdapterResult<String> {
        Ok(self
            .client
            .presign_get(key, self.config.presigned_url_expires)
            .await?)
    }
}

impl std::fmt::Debug for LocationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationResolver")
            .field("rule", &self.rule)
            .field(
                "base_url",
                &self.config.base_url.as_ref().map(|url| match url {
                    BaseUrl::Static(url) => url.as_str(),
                    BaseUrl::Dynamic(_) => "<fn>",
                }),
            )
            .finish()
    }
}
