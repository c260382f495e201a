use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr};

/// Default part size / single-put threshold (5 MiB).
const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Default request ceiling: 2 GiB of file content plus 100 MiB of form overhead.
const DEFAULT_MAX_BODY: usize = (2 * 1024 + 100) * 1024 * 1024;

/// Which object store receives the uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// Local disk beneath `storage_dir`.
    Fs,
    /// Amazon S3 or an S3-compatible endpoint.
    S3,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "fs" => Ok(Self::Fs),
            "s3" => Ok(Self::S3),
            other => bail!("unknown store backend `{}` (expected `fs` or `s3`)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub bucket_name: String,
    pub table_name: String,
    pub chunk_size_bytes: usize,
    pub max_body_bytes: usize,
    pub backend: StoreBackend,
    pub storage_dir: String,
    pub database_url: String,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(
    author,
    version,
    about = "Streams uploaded files to an object store and records their SHA-256"
)]
pub struct Args {
    /// Host to bind to (overrides FILE_STORAGE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILE_STORAGE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Bucket that receives the files (overrides FILE_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Table that receives the hash records (overrides HASHES_TABLE)
    #[arg(long)]
    pub table: Option<String>,

    /// Part size and single-put threshold in bytes (overrides FILE_STORAGE_CHUNK_SIZE)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Maximum request body in bytes (overrides FILE_STORAGE_MAX_BODY)
    #[arg(long)]
    pub max_body: Option<usize>,

    /// Object store backend (overrides FILE_STORAGE_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<StoreBackend>,

    /// Directory for the fs backend (overrides FILE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Metadata database URL (overrides FILE_STORAGE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// S3 region (overrides FILE_STORAGE_S3_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// S3-compatible endpoint URL (overrides FILE_STORAGE_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// Create the hash table and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Read `name` and parse it, falling back to `default` when it is unset.
fn env_parsed<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    /// CLI values win over environment values, which win over defaults.
    fn merge(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("FILE_STORAGE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parsed("FILE_STORAGE_PORT", 3000u16)?;
        let env_bucket = env::var("FILE_BUCKET").unwrap_or_else(|_| "fileBucket".into());
        let env_table = env::var("HASHES_TABLE").unwrap_or_else(|_| "hashesTable".into());
        let env_chunk = env_parsed("FILE_STORAGE_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        let env_max_body = env_parsed("FILE_STORAGE_MAX_BODY", DEFAULT_MAX_BODY)?;
        let env_backend = env_parsed("FILE_STORAGE_BACKEND", StoreBackend::Fs)?;
        let env_storage =
            env::var("FILE_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("FILE_STORAGE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/file_storage.db".into());

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            bucket_name: args.bucket.unwrap_or(env_bucket),
            table_name: args.table.unwrap_or(env_table),
            chunk_size_bytes: args.chunk_size.unwrap_or(env_chunk),
            max_body_bytes: args.max_body.unwrap_or(env_max_body),
            backend: args.backend.unwrap_or(env_backend),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            s3_region: args.s3_region.or_else(|| env::var("FILE_STORAGE_S3_REGION").ok()),
            s3_endpoint: args
                .s3_endpoint
                .or_else(|| env::var("FILE_STORAGE_S3_ENDPOINT").ok()),
        };

        if cfg.chunk_size_bytes == 0 {
            bail!("chunk size must be at least one byte");
        }
        if cfg.bucket_name.trim().is_empty() {
            bail!("bucket name must not be empty");
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
