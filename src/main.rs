use anyhow::{Context, Result};
use axum::Router;
use s3_files_adapter::{
    AdapterConfig, FilesAdapter, MemoryStore, ObjectStoreClient, S3Client,
    config::ServerConfig, handlers::AppState, routes,
};
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let (cfg, options) = ServerConfig::from_env_and_args()?;
    let adapter_config =
        AdapterConfig::from_options(options).context("resolving adapter configuration")?;

    tracing::info!("Starting files adapter with config: {:?}", cfg);
    tracing::debug!("Adapter config => {:?}", adapter_config);

    // --- Initialize backend ---
    let client: Arc<dyn ObjectStoreClient> = if cfg.memory {
        tracing::warn!("Using the in-memory backend; files are lost on exit");
        Arc::new(MemoryStore::new(
            adapter_config.bucket.clone(),
            adapter_config.region.clone(),
        ))
    } else {
        Arc::new(S3Client::new(&adapter_config).context("building S3 client")?)
    };
    let adapter = Arc::new(FilesAdapter::with_client(adapter_config, client));

    // Provisioning is retried by every request, so a failure here is not fatal.
    if let Err(err) = adapter.ensure_bucket().await {
        tracing::warn!("Bucket is not ready yet: {}", err);
    }

    // --- Build router ---
    let state = AppState::new(adapter, cfg.public_url.clone());
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
