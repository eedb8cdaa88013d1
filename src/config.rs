//! Adapter and server configuration.
//!
//! Every adapter option resolves with the same precedence: an explicit
//! [`AdapterOptions`] field, then the matching `S3_*` environment variable,
//! then the default. [`ClientOverrides`] are applied last and win over all
//! of them. The binary layers clap arguments on top by filling
//! [`AdapterOptions`] from the command line.

use crate::{
    errors::{AdapterError, AdapterResult, BoxError},
    models::{AccessContext, CreateOptions},
    utils::parse_bool,
};
use anyhow::Context;
use clap::Parser;
use futures::{FutureExt, future::BoxFuture};
use std::{env, fmt, future::Future, str::FromStr, sync::Arc, sync::Once};

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_SIGNATURE_VERSION: &str = "v4";

static DEPRECATED_CREDENTIALS: Once = Once::new();

/// Long-lived access key pair for the backend.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl StaticCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Canned ACL policy for new objects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileAcl {
    PublicRead,
    Private,
    /// Never send an ACL, even with direct access enabled.
    None,
}

impl FileAcl {
    /// Value for the `x-amz-acl` header, if any.
    pub fn header_value(self) -> Option<&'static str> {
        match self {
            Self::PublicRead => Some("public-read"),
            Self::Private => Some("private"),
            Self::None => None,
        }
    }
}

impl FromStr for FileAcl {
    type Err = AdapterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "public-read" | "public" => Ok(Self::PublicRead),
            "private" => Ok(Self::Private),
            "none" => Ok(Self::None),
            other => Err(AdapterError::configuration(format!(
                "unknown file ACL `{}`; expected public-read, private or none",
                other
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerSideEncryption {
    Aes256,
    AwsKms,
}

impl ServerSideEncryption {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aes256 => "AES256",
            Self::AwsKms => "aws:kms",
        }
    }
}

impl FromStr for ServerSideEncryption {
    type Err = AdapterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "AES256" => Ok(Self::Aes256),
            "aws:kms" => Ok(Self::AwsKms),
            other => Err(AdapterError::configuration(format!(
                "unsupported server-side encryption `{}`; expected AES256 or aws:kms",
                other
            ))),
        }
    }
}

pub type BaseUrlFn =
    Arc<dyn Fn(&AccessContext, &str) -> BoxFuture<'static, Result<String, BoxError>> + Send + Sync>;

/// Base URL for direct-access locations: a fixed string, or computed per
/// request (e.g. a per-tenant CDN host).
#[derive(Clone)]
pub enum BaseUrl {
    Static(String),
    Dynamic(BaseUrlFn),
}

impl BaseUrl {
    pub fn dynamic<F, Fut>(f: F) -> Self
    where
        F: Fn(&AccessContext, &str) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, BoxError>> + Send + 'static,
    {
        Self::Dynamic(Arc::new(move |ctx: &AccessContext, filename: &str| {
            f(ctx, filename).boxed()
        }))
    }

    pub async fn resolve(&self, ctx: &AccessContext, filename: &str) -> AdapterResult<String> {
        match self {
            Self::Static(url) => Ok(url.clone()),
            Self::Dynamic(f) => f(ctx, filename).await.map_err(|err| {
                AdapterError::configuration(format!("base URL function failed: {}", err))
            }),
        }
    }
}

impl fmt::Debug for BaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(url) => f.debug_tuple("Static").field(url).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(<fn>)"),
        }
    }
}

impl From<&str> for BaseUrl {
    fn from(url: &str) -> Self {
        Self::Static(url.to_string())
    }
}

impl From<String> for BaseUrl {
    fn from(url: String) -> Self {
        Self::Static(url)
    }
}

/// Input to a caller-supplied key generator.
#[derive(Clone, Copy, Debug)]
pub struct KeyRequest<'a> {
    pub filename: &'a str,
    pub content_type: Option<&'a str>,
    pub options: Option<&'a CreateOptions>,
}

pub type KeyGenerator = Arc<dyn Fn(&KeyRequest<'_>) -> Result<String, BoxError> + Send + Sync>;

/// Host-invoked filename check; `Err` carries the rejection reason.
pub type FilenameValidator = Arc<dyn Fn(&str) -> Result<(), AdapterError> + Send + Sync>;

/// Backend-client settings merged after everything else.
#[derive(Clone, Debug, Default)]
pub struct ClientOverrides {
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub credentials: Option<StaticCredentials>,
    pub force_path_style: Option<bool>,
}

/// Explicit constructor options. Unset fields fall back to the environment
/// and then to defaults.
#[derive(Clone, Default)]
pub struct AdapterOptions {
    pub bucket: Option<String>,
    pub bucket_prefix: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub credentials: Option<StaticCredentials>,
    /// Deprecated flat form of `credentials`.
    pub access_key: Option<String>,
    /// Deprecated flat form of `credentials`.
    pub secret_key: Option<String>,
    pub direct_access: Option<bool>,
    pub base_url: Option<BaseUrl>,
    pub base_url_direct: Option<bool>,
    pub signature_version: Option<String>,
    pub global_cache_control: Option<String>,
    pub server_side_encryption: Option<ServerSideEncryption>,
    pub generate_key: Option<KeyGenerator>,
    pub clean_key: Option<bool>,
    pub file_acl: Option<FileAcl>,
    pub presigned_url: Option<bool>,
    pub presigned_url_expires: Option<u32>,
    pub validate_filename: Option<FilenameValidator>,
    pub overrides: ClientOverrides,
}

impl AdapterOptions {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            ..Default::default()
        }
    }

    pub fn bucket_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.bucket_prefix = Some(prefix.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn credentials(mut self, credentials: StaticCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn direct_access(mut self, enabled: bool) -> Self {
        self.direct_access = Some(enabled);
        self
    }

    pub fn base_url(mut self, base_url: impl Into<BaseUrl>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn base_url_direct(mut self, enabled: bool) -> Self {
        self.base_url_direct = Some(enabled);
        self
    }

    pub fn global_cache_control(mut self, value: impl Into<String>) -> Self {
        self.global_cache_control = Some(value.into());
        self
    }

    pub fn server_side_encryption(mut self, sse: ServerSideEncryption) -> Self {
        self.server_side_encryption = Some(sse);
        self
    }

    pub fn generate_key<F>(mut self, f: F) -> Self
    where
        F: Fn(&KeyRequest<'_>) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        self.generate_key = Some(Arc::new(f));
        self
    }

    pub fn clean_key(mut self, enabled: bool) -> Self {
        self.clean_key = Some(enabled);
        self
    }

    pub fn file_acl(mut self, acl: FileAcl) -> Self {
        self.file_acl = Some(acl);
        self
    }

    pub fn presigned_url(mut self, enabled: bool, expires_in: Option<u32>) -> Self {
        self.presigned_url = Some(enabled);
        self.presigned_url_expires = expires_in;
        self
    }

    pub fn validate_filename<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Result<(), AdapterError> + Send + Sync + 'static,
    {
        self.validate_filename = Some(Arc::new(f));
        self
    }

    pub fn overrides(mut self, overrides: ClientOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

/// Fully resolved adapter configuration. Immutable once built.
#[derive(Clone)]
pub struct AdapterConfig {
    pub bucket: String,
    pub bucket_prefix: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub credentials: Option<StaticCredentials>,
    pub force_path_style: bool,
    pub direct_access: bool,
    pub base_url: Option<BaseUrl>,
    pub base_url_direct: bool,
    pub signature_version: String,
    pub global_cache_control: Option<String>,
    pub server_side_encryption: Option<ServerSideEncryption>,
    pub generate_key: Option<KeyGenerator>,
    pub clean_key: bool,
    pub file_acl: Option<FileAcl>,
    pub presigned_url: bool,
    pub presigned_url_expires: Option<u32>,
    pub validate_filename: Option<FilenameValidator>,
}

impl AdapterConfig {
    /// Resolve options against the process environment.
    pub fn from_options(options: AdapterOptions) -> AdapterResult<Self> {
        Self::from_options_with_env(options, |name| env::var(name).ok())
    }

    /// Resolve options against an arbitrary variable source.
    pub fn from_options_with_env<F>(options: AdapterOptions, lookup: F) -> AdapterResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let flag = |explicit: Option<bool>, name: &str| -> AdapterResult<bool> {
            match explicit {
                Some(value) => Ok(value),
                None => match var(name) {
                    Some(raw) => parse_bool(&raw).ok_or_else(|| {
                        AdapterError::configuration(format!(
                            "environment variable {} is not a boolean: `{}`",
                            name, raw
                        ))
                    }),
                    None => Ok(false),
                },
            }
        };

        let bucket = options.bucket.or_else(|| var("S3_BUCKET"));

        let credentials = match options.credentials {
            Some(credentials) => Some(credentials),
            None => {
                let flat = options.access_key.is_some() || options.secret_key.is_some();
                let access_key = options.access_key.or_else(|| var("S3_ACCESS_KEY"));
                let secret_key = options.secret_key.or_else(|| var("S3_SECRET_KEY"));
                match (access_key, secret_key) {
                    (Some(access_key), Some(secret_key)) => {
                        if flat {
                            DEPRECATED_CREDENTIALS.call_once(|| {
                                tracing::warn!(
                                    "`access_key`/`secret_key` options are deprecated; pass `credentials` instead"
                                );
                            });
                        }
                        Some(StaticCredentials::new(access_key, secret_key))
                    }
                    _ => None,
                }
            }
        };

        let signature_version = options
            .signature_version
            .or_else(|| var("S3_SIGNATURE_VERSION"))
            .unwrap_or_else(|| DEFAULT_SIGNATURE_VERSION.to_string());

        let server_side_encryption = match options.server_side_encryption {
            Some(sse) => Some(sse),
            None => var("S3_SERVER_SIDE_ENCRYPTION")
                .map(|raw| raw.parse())
                .transpose()?,
        };

        let file_acl = match options.file_acl {
            Some(acl) => Some(acl),
            None => var("S3_FILE_ACL").map(|raw| raw.parse()).transpose()?,
        };

        let presigned_url_expires = match options.presigned_url_expires {
            Some(secs) => Some(secs),
            None => var("S3_PRESIGNED_URL_EXPIRES")
                .map(|raw| {
                    raw.trim().parse::<u32>().map_err(|_| {
                        AdapterError::configuration(format!(
                            "S3_PRESIGNED_URL_EXPIRES must be a number of seconds, got `{}`",
                            raw
                        ))
                    })
                })
                .transpose()?,
        };

        let mut config = Self {
            bucket: bucket.unwrap_or_default(),
            bucket_prefix: options
                .bucket_prefix
                .or_else(|| var("S3_BUCKET_PREFIX"))
                .unwrap_or_default(),
            region: options
                .region
                .or_else(|| var("S3_REGION"))
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint: options.endpoint.or_else(|| var("S3_ENDPOINT")),
            credentials,
            force_path_style: false,
            direct_access: flag(options.direct_access, "S3_DIRECT_ACCESS")?,
            base_url: options
                .base_url
                .or_else(|| var("S3_BASE_URL").map(BaseUrl::Static)),
            base_url_direct: flag(options.base_url_direct, "S3_BASE_URL_DIRECT")?,
            signature_version,
            global_cache_control: options
                .global_cache_control
                .or_else(|| var("S3_GLOBAL_CACHE_CONTROL")),
            server_side_encryption,
            generate_key: options.generate_key,
            clean_key: flag(options.clean_key, "S3_CLEAN_KEY")?,
            file_acl,
            presigned_url: flag(options.presigned_url, "S3_PRESIGNED_URL")?,
            presigned_url_expires,
            validate_filename: options.validate_filename,
        };

        let overrides = options.overrides;
        if let Some(bucket) = overrides.bucket {
            config.bucket = bucket;
        }
        if let Some(region) = overrides.region {
            config.region = region;
        }
        if let Some(endpoint) = overrides.endpoint {
            config.endpoint = Some(endpoint);
        }
        if let Some(credentials) = overrides.credentials {
            config.credentials = Some(credentials);
        }
        if let Some(force_path_style) = overrides.force_path_style {
            config.force_path_style = force_path_style;
        }

        if config.bucket.trim().is_empty() {
            return Err(AdapterError::configuration(
                "files adapter requires option `bucket` or environment variable S3_BUCKET",
            ));
        }

        Ok(config)
    }
}

impl fmt::Debug for AdapterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterConfig")
            .field("bucket", &self.bucket)
            .field("bucket_prefix", &self.bucket_prefix)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("credentials", &self.credentials)
            .field("force_path_style", &self.force_path_style)
            .field("direct_access", &self.direct_access)
            .field("base_url", &self.base_url)
            .field("base_url_direct", &self.base_url_direct)
            .field("signature_version", &self.signature_version)
            .field("global_cache_control", &self.global_cache_control)
            .field("server_side_encryption", &self.server_side_encryption)
            .field("generate_key", &self.generate_key.as_ref().map(|_| "<fn>"))
            .field("clean_key", &self.clean_key)
            .field("file_acl", &self.file_acl)
            .field("presigned_url", &self.presigned_url)
            .field("presigned_url_expires", &self.presigned_url_expires)
            .field(
                "validate_filename",
                &self.validate_filename.as_ref().map(|_| "<fn>"),
            )
            .finish()
    }
}

/// Settings of the reference host server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public URL the files routes are mounted under.
    pub public_url: String,
    /// Serve from the in-memory backend instead of S3.
    pub memory: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Files adapter host backed by S3-compatible storage")]
pub struct Args {
    /// Host to bind to (overrides FILES_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILES_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Public URL of this server, used for proxied file locations (overrides FILES_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Keep files in memory instead of an S3 bucket
    #[arg(long)]
    pub memory: bool,

    /// Bucket name (overrides S3_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Key prefix inside the bucket (overrides S3_BUCKET_PREFIX)
    #[arg(long)]
    pub bucket_prefix: Option<String>,

    /// Bucket region (overrides S3_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Custom S3-compatible endpoint, e.g. http://localhost:9000 (overrides S3_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Use path-style bucket addressing (MinIO and friends)
    #[arg(long)]
    pub path_style: bool,

    /// Hand out direct object-store links (overrides S3_DIRECT_ACCESS)
    #[arg(long)]
    pub direct_access: Option<bool>,

    /// Base URL for direct links (overrides S3_BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Drop the bucket prefix from base URL links (overrides S3_BASE_URL_DIRECT)
    #[arg(long)]
    pub base_url_direct: Option<bool>,

    /// Sign direct links (overrides S3_PRESIGNED_URL)
    #[arg(long)]
    pub presigned_url: Option<bool>,

    /// Lifetime of signed links in seconds (overrides S3_PRESIGNED_URL_EXPIRES)
    #[arg(long)]
    pub presigned_url_expires: Option<u32>,

    /// Cache-Control header for every new object (overrides S3_GLOBAL_CACHE_CONTROL)
    #[arg(long)]
    pub cache_control: Option<String>,

    /// AES256 or aws:kms (overrides S3_SERVER_SIDE_ENCRYPTION)
    #[arg(long)]
    pub server_side_encryption: Option<String>,

    /// public-read, private or none (overrides S3_FILE_ACL)
    #[arg(long)]
    pub file_acl: Option<String>,

    /// Sanitize object keys (overrides S3_CLEAN_KEY)
    #[arg(long)]
    pub clean_key: Option<bool>,
}

impl ServerConfig {
    /// Parse environment variables + CLI args into the server settings and
    /// the explicit adapter options.
    pub fn from_env_and_args() -> anyhow::Result<(Self, AdapterOptions)> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> anyhow::Result<(Self, AdapterOptions)> {
        // --- Environment fallback ---
        let env_host = env::var("FILES_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("FILES_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing FILES_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading FILES_PORT"),
        };

        // --- Merge ---
        let host = args.host.unwrap_or(env_host);
        let port = args.port.unwrap_or(env_port);
        let public_url = args
            .public_url
            .or_else(|| env::var("FILES_PUBLIC_URL").ok())
            .unwrap_or_else(|| format!("http://{}:{}", host, port));

        let server = Self {
            host,
            port,
            public_url: public_url.trim_end_matches('/').to_string(),
            memory: args.memory,
        };

        let options = AdapterOptions {
            bucket: args.bucket,
            bucket_prefix: args.bucket_prefix,
            region: args.region,
            endpoint: args.endpoint,
            direct_access: args.direct_access,
            base_url: args.base_url.map(BaseUrl::Static),
            base_url_direct: args.base_url_direct,
            presigned_url: args.presigned_url,
            presigned_url_expires: args.presigned_url_expires,
            global_cache_control: args.cache_control,
            server_side_encryption: args
                .server_side_encryption
                .map(|raw| raw.parse())
                .transpose()?,
            file_acl: args.file_acl.map(|raw| raw.parse()).transpose()?,
            clean_key: args.clean_key,
            overrides: ClientOverrides {
                force_path_style: args.path_style.then_some(true),
                ..Default::default()
            },
            ..Default::default()
        };

        Ok((server, options))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn requires_a_bucket() {
        let err = AdapterConfig::from_options_with_env(AdapterOptions::default(), env_of(&[]))
            .unwrap_err();
        assert!(matches!(err, AdapterError::Configuration(_)));
        assert!(err.to_string().contains("S3_BUCKET"));
    }

    #[test]
    fn takes_bucket_from_environment() {
        let config = AdapterConfig::from_options_with_env(
            AdapterOptions::default(),
            env_of(&[("S3_BUCKET", "testBucket")]),
        )
        .unwrap();
        assert_eq!(config.bucket, "testBucket");
        assert_eq!(config.region, DEFAULT_REGION);
        assert_eq!(config.bucket_prefix, "");
        assert_eq!(config.signature_version, "v4");
        assert!(!config.direct_access);
    }

    #[test]
    fn explicit_options_beat_environment() {
        let config = AdapterConfig::from_options_with_env(
            AdapterOptions::new("bucket").region("eu-west-1"),
            env_of(&[("S3_BUCKET", "other"), ("S3_REGION", "test")]),
        )
        .unwrap();
        assert_eq!(config.bucket, "bucket");
        assert_eq!(config.region, "eu-west-1");
    }

    #[test]
    fn environment_beats_defaults() {
        let config = AdapterConfig::from_options_with_env(
            AdapterOptions::new("bucket"),
            env_of(&[
                ("S3_REGION", "test"),
                ("S3_DIRECT_ACCESS", "true"),
                ("S3_BASE_URL", "http://cdn/x"),
                ("S3_FILE_ACL", "private"),
                ("S3_PRESIGNED_URL_EXPIRES", "60"),
            ]),
        )
        .unwrap();
        assert_eq!(config.region, "test");
        assert!(config.direct_access);
        assert!(matches!(config.base_url, Some(BaseUrl::Static(ref url)) if url == "http://cdn/x"));
        assert_eq!(config.file_acl, Some(FileAcl::Private));
        assert_eq!(config.presigned_url_expires, Some(60));
    }

    #[test]
    fn overrides_win_over_everything() {
        let options = AdapterOptions::new("bucket-1")
            .bucket_prefix("test/")
            .credentials(StaticCredentials::new("key-1", "secret-1"))
            .overrides(ClientOverrides {
                bucket: Some("bucket-2".into()),
                credentials: Some(StaticCredentials::new("key-2", "secret-2")),
                ..Default::default()
            });
        let config =
            AdapterConfig::from_options_with_env(options, env_of(&[("S3_BUCKET", "env")]))
                .unwrap();
        assert_eq!(config.bucket, "bucket-2");
        assert_eq!(config.bucket_prefix, "test/");
        let credentials = config.credentials.unwrap();
        assert_eq!(credentials.access_key_id, "key-2");
        assert_eq!(credentials.secret_access_key, "secret-2");
    }

    #[test]
    fn override_bucket_satisfies_requirement() {
        let options = AdapterOptions::default().overrides(ClientOverrides {
            bucket: Some("bucket".into()),
            ..Default::default()
        });
        let config = AdapterConfig::from_options_with_env(options, env_of(&[])).unwrap();
        assert_eq!(config.bucket, "bucket");
    }

    #[test]
    fn flat_credentials_still_work() {
        let options = AdapterOptions {
            access_key: Some("key".into()),
            secret_key: Some("secret".into()),
            ..AdapterOptions::new("bucket")
        };
        let config = AdapterConfig::from_options_with_env(options, env_of(&[])).unwrap();
        assert_eq!(
            config.credentials,
            Some(StaticCredentials::new("key", "secret"))
        );
    }

    #[test]
    fn rejects_malformed_environment_values() {
        let err = AdapterConfig::from_options_with_env(
            AdapterOptions::new("bucket"),
            env_of(&[("S3_DIRECT_ACCESS", "sometimes")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("S3_DIRECT_ACCESS"));

        let err = AdapterConfig::from_options_with_env(
            AdapterOptions::new("bucket"),
            env_of(&[("S3_SERVER_SIDE_ENCRYPTION", "rot13")]),
        )
        .unwrap_err();
        assert!(matches!(err, AdapterError::Configuration(_)));
    }

    #[test]
    fn parses_acl_and_encryption_names() {
        assert_eq!("public-read".parse::<FileAcl>().unwrap(), FileAcl::PublicRead);
        assert_eq!("none".parse::<FileAcl>().unwrap().header_value(), None);
        assert_eq!(
            "aws:kms".parse::<ServerSideEncryption>().unwrap().as_str(),
            "aws:kms"
        );
    }

    #[test]
    fn cli_arguments_become_explicit_options() {
        let args = Args::parse_from([
            "s3-files-adapter",
            "--bucket",
            "cli-bucket",
            "--port",
            "8080",
            "--host",
            "127.0.0.1",
            "--direct-access",
            "true",
            "--path-style",
        ]);
        let (server, options) = ServerConfig::from_args(args).unwrap();
        assert_eq!(server.addr(), "127.0.0.1:8080");
        assert_eq!(options.bucket.as_deref(), Some("cli-bucket"));
        assert_eq!(options.direct_access, Some(true));
        assert_eq!(options.overrides.force_path_style, Some(true));
    }
}
