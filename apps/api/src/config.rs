use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};

/// Which halves of the service this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRole {
    /// HTTP intake and status endpoints only.
    Api,
    /// Queue consumer only.
    Worker,
    /// Both, with the worker loop spawned next to the server.
    All,
}

impl AppRole {
    pub fn serves_http(self) -> bool {
        matches!(self, AppRole::Api | AppRole::All)
    }

    pub fn runs_worker(self) -> bool {
        matches!(self, AppRole::Worker | AppRole::All)
    }
}

impl FromStr for AppRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" => Ok(AppRole::Api),
            "worker" => Ok(AppRole::Worker),
            "all" => Ok(AppRole::All),
            other => bail!("APP_ROLE must be one of api, worker, all (got '{other}')"),
        }
    }
}

/// S3 / MinIO connection settings, only read when `STORAGE_BACKEND=s3`.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Debug, Clone)]
pub enum StorageConfig {
    Local { root: PathBuf },
    S3(S3Config),
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    /// Only required when this process runs the worker.
    pub anthropic_api_key: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub role: AppRole,
    pub queue_name: String,
    pub worker_poll_secs: u64,
    pub storage: StorageConfig,
    pub max_upload_bytes: usize,
    pub render_max_pixels: u32,
    pub pdfium_lib_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let storage = match optional_env("STORAGE_BACKEND")
            .unwrap_or_else(|| "local".to_string())
            .as_str()
        {
            "local" => StorageConfig::Local {
                root: PathBuf::from(
                    optional_env("UPLOAD_DIR").unwrap_or_else(|| "/mnt/uploads".to_string()),
                ),
            },
            "s3" => StorageConfig::S3(S3Config {
                bucket: require_env("S3_BUCKET")?,
                endpoint: require_env("S3_ENDPOINT")?,
                access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
                secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            }),
            other => return Err(anyhow!("STORAGE_BACKEND must be 'local' or 's3' (got '{other}')")),
        };

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            port: parse_env("PORT", 8080).context("PORT must be a valid port number")?,
            rust_log: optional_env("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            role: parse_env("APP_ROLE", AppRole::All)?,
            queue_name: optional_env("QUEUE_NAME").unwrap_or_else(|| "resume_analysis".to_string()),
            worker_poll_secs: parse_env("WORKER_POLL_SECS", 5)
                .context("WORKER_POLL_SECS must be a whole number of seconds")?,
            storage,
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)
                .context("MAX_UPLOAD_BYTES must be a byte count")?,
            render_max_pixels: parse_env("RENDER_MAX_PIXELS", 1600)
                .context("RENDER_MAX_PIXELS must be a pixel count")?,
            pdfium_lib_dir: optional_env("PDFIUM_LIB_DIR").map(PathBuf::from),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow!("invalid value '{raw}' for {key}: {e}")),
        None => Ok(default),
    }
}
