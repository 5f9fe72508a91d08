//! Configuration module
//!
//! Worker configuration is read from the environment (optionally seeded from a
//! `.env` file). Every value goes through a key lookup so tests can build a
//! configuration from a map instead of mutating the process environment.

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::storage_types::StorageBackend;

// Common constants
const DB_MAX_CONNECTIONS: u32 = 5;
const DB_TIMEOUT_SECS: u64 = 30;
const DB_MAX_RETRIES: u32 = 3;
const S3_DEFAULT_PORT: u16 = 443;
const S3_DEFAULT_REGION: &str = "us-east-1";
const S3_UPLOAD_CONCURRENCY: usize = 2;
const S3_CHUNK_SIZE_MB: usize = 50;
/// Smallest part size S3 accepts for a multipart upload.
pub const S3_MIN_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Which worker a configuration is loaded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Copies archived files to the backup storage.
    Copy,
    /// Decrypts and checksums archived files.
    Verify,
}

impl Display for Service {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Service::Copy => write!(f, "sync"),
            Service::Verify => write!(f, "verify"),
        }
    }
}

/// Queue and routing settings for one worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerSettings {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub routing_error: String,
    pub durable: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_seconds: u64,
    /// Attempts for connection-class failures before an error is surfaced.
    pub max_retries: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PosixConfig {
    pub location: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct S3Config {
    pub url: String,
    pub port: u16,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub upload_concurrency: usize,
    pub chunk_size: usize,
    /// Extra CA certificate (PEM) trusted in addition to the platform store.
    pub ca_cert: Option<String>,
}

impl S3Config {
    /// Endpoint as `url:port`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.url.trim_end_matches('/'), self.port)
    }
}

// Keeps the secret key out of logs.
impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("S3Config")
            .field("url", &self.url)
            .field("port", &self.port)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("bucket", &self.bucket)
            .field("upload_concurrency", &self.upload_concurrency)
            .field("chunk_size", &self.chunk_size)
            .field("ca_cert", &self.ca_cert)
            .finish_non_exhaustive()
    }
}

/// Storage configuration for one role (archive or backup).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageConfig {
    Posix(PosixConfig),
    S3(S3Config),
}

impl StorageConfig {
    pub fn backend(&self) -> StorageBackend {
        match self {
            StorageConfig::Posix(_) => StorageBackend::Posix,
            StorageConfig::S3(_) => StorageBackend::S3,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct CryptConfig {
    pub key_path: String,
    pub passphrase: String,
}

impl std::fmt::Debug for CryptConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CryptConfig")
            .field("key_path", &self.key_path)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Complete configuration of one worker process.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub service: Service,
    pub environment: String,
    pub log_format: LogFormat,
    pub broker: BrokerSettings,
    pub database: DatabaseConfig,
    pub archive: StorageConfig,
    /// Destination of the copy-worker; always `Some` for [`Service::Copy`].
    pub backup: Option<StorageConfig>,
    /// Decryption key of the verify-worker; always `Some` for [`Service::Verify`].
    pub c4gh: Option<CryptConfig>,
}

impl WorkerConfig {
    pub fn from_env(service: Service) -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(service, |key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(service: Service, lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let broker = BrokerSettings {
            queue: vars.required("BROKER_QUEUE")?,
            exchange: vars.required("BROKER_EXCHANGE")?,
            routing_key: vars.required("BROKER_ROUTINGKEY")?,
            routing_error: vars.get("BROKER_ROUTINGERROR").unwrap_or_else(|| "error".into()),
            durable: vars.parse_or("BROKER_DURABLE", true)?,
        };

        let database = DatabaseConfig {
            url: vars.required("DATABASE_URL")?,
            max_connections: vars.parse_or("DB_MAX_CONNECTIONS", DB_MAX_CONNECTIONS)?,
            timeout_seconds: vars.parse_or("DB_TIMEOUT_SECONDS", DB_TIMEOUT_SECS)?,
            max_retries: vars.parse_or("DB_MAX_RETRIES", DB_MAX_RETRIES)?,
        };

        let archive = storage_config(&vars, "ARCHIVE")?;

        let backup = match service {
            Service::Copy => Some(storage_config(&vars, "BACKUP")?),
            Service::Verify => None,
        };

        let c4gh = match service {
            Service::Verify => Some(CryptConfig {
                key_path: vars.required("C4GH_FILEPATH")?,
                passphrase: vars.required("C4GH_PASSPHRASE")?,
            }),
            Service::Copy => None,
        };

        let log_format = match vars.get("LOG_FORMAT").as_deref().map(str::to_lowercase) {
            None => LogFormat::Text,
            Some(ref f) if f == "text" => LogFormat::Text,
            Some(ref f) if f == "json" => LogFormat::Json,
            Some(other) => {
                return Err(anyhow::anyhow!(
                    "LOG_FORMAT must be text or json, got {}",
                    other
                ))
            }
        };

        let config = WorkerConfig {
            service,
            environment: vars
                .get("ENVIRONMENT")
                .unwrap_or_else(|| "development".to_string()),
            log_format,
            broker,
            database,
            archive,
            backup,
            c4gh,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database.url.starts_with("postgres://")
            && !self.database.url.starts_with("postgresql://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("DB_MAX_CONNECTIONS must be greater than 0"));
        }

        let storages = [
            ("ARCHIVE", Some(&self.archive)),
            ("BACKUP", self.backup.as_ref()),
        ];
        for (role, storage) in storages {
            if let Some(StorageConfig::S3(s3)) = storage {
                if s3.upload_concurrency == 0 {
                    return Err(anyhow::anyhow!(
                        "{}_UPLOADCONCURRENCY must be greater than 0",
                        role
                    ));
                }
                if s3.chunk_size < S3_MIN_CHUNK_SIZE {
                    return Err(anyhow::anyhow!(
                        "{}_CHUNKSIZE must be at least {} MB",
                        role,
                        S3_MIN_CHUNK_SIZE / (1024 * 1024)
                    ));
                }
            }
        }

        match self.service {
            Service::Copy if self.backup.is_none() => {
                Err(anyhow::anyhow!("copy worker requires a BACKUP storage"))
            }
            Service::Verify if self.c4gh.is_none() => {
                Err(anyhow::anyhow!("verify worker requires a C4GH key"))
            }
            _ => Ok(()),
        }
    }
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, anyhow::Error> {
        self.get(key)
            .ok_or_else(|| anyhow::anyhow!("{} must be set", key))
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, anyhow::Error> {
        match self.get(key) {
            Some(v) => v
                .trim()
                .to_lowercase()
                .parse()
                .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", key, v)),
            None => Ok(default),
        }
    }
}

fn storage_config<F>(vars: &Vars<'_, F>, role: &str) -> Result<StorageConfig, anyhow::Error>
where
    F: Fn(&str) -> Option<String>,
{
    let key = |name: &str| format!("{}_{}", role, name);

    let backend: StorageBackend = vars
        .get(&key("TYPE"))
        .unwrap_or_else(|| "posix".to_string())
        .parse()?;

    match backend {
        StorageBackend::Posix => Ok(StorageConfig::Posix(PosixConfig {
            location: vars.required(&key("LOCATION"))?,
        })),
        StorageBackend::S3 => {
            let chunk_size_mb: usize = vars.parse_or(&key("CHUNKSIZE"), S3_CHUNK_SIZE_MB)?;
            let chunk_size = chunk_size_mb.checked_mul(1024 * 1024).ok_or_else(|| {
                anyhow::anyhow!("{} of {} MB is too large", key("CHUNKSIZE"), chunk_size_mb)
            })?;
            Ok(StorageConfig::S3(S3Config {
                url: vars.required(&key("URL"))?,
                port: vars.parse_or(&key("PORT"), S3_DEFAULT_PORT)?,
                region: vars
                    .get(&key("REGION"))
                    .unwrap_or_else(|| S3_DEFAULT_REGION.to_string()),
                access_key: vars.required(&key("ACCESSKEY"))?,
                secret_key: vars.required(&key("SECRETKEY"))?,
                bucket: vars.required(&key("BUCKET"))?,
                upload_concurrency: vars
                    .parse_or(&key("UPLOADCONCURRENCY"), S3_UPLOAD_CONCURRENCY)?,
                chunk_size,
                ca_cert: vars.get(&key("CACERT")),
            }))
        }
    }
}
