use anyhow::Result;
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use config::{AppConfig, StoreBackend};
use services::{
    fs_store::FsObjectStore,
    metadata_store::SqliteMetadataStore,
    object_store::ObjectStore,
    s3_store::{S3ObjectStore, S3Settings},
    upload_service::UploadService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting file-storage with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    let connect_options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
    let db_path = connect_options.get_filename();
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?,
    );
    let metadata = SqliteMetadataStore::new(db.clone(), cfg.table_name.clone())?;

    // --- Handle migration mode ---
    if migrate {
        metadata.migrate().await?;
        tracing::info!("Database migration complete for table {}.", metadata.table());
        return Ok(()); // exit after migration
    }

    // --- Initialize object store ---
    let objects: Arc<dyn ObjectStore> = match cfg.backend {
        StoreBackend::Fs => {
            if !Path::new(&cfg.storage_dir).exists() {
                fs::create_dir_all(&cfg.storage_dir)?;
                tracing::info!("Created storage directory at {}", cfg.storage_dir);
            }
            Arc::new(FsObjectStore::new(
                cfg.storage_dir.clone(),
                cfg.bucket_name.clone(),
            ))
        }
        StoreBackend::S3 => {
            let settings = S3Settings {
                region: cfg.s3_region.clone(),
                endpoint_url: cfg.s3_endpoint.clone(),
            };
            Arc::new(S3ObjectStore::connect(cfg.bucket_name.clone(), settings).await)
        }
    };

    // --- Initialize core service ---
    let uploads = UploadService::new(objects, Arc::new(metadata), cfg.chunk_size_bytes);

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_body_bytes).with_state(uploads);

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
