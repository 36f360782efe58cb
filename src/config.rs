use std::env;
use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::{DEFAULT_WORKERS, PipelineSettings};
use crate::source::ObjectStoreSettings;

const DEFAULT_LOG_FILE: &str = "logs/rusty-ingest.log";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for an ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Where items are listed and fetched from.
    pub source: SourceKind,
    /// Root directory used by the local source.
    pub local_dir: PathBuf,
    /// Whether the local source descends into subdirectories.
    pub recursive: bool,
    /// Object-store connection, present when every required remote variable is set.
    pub remote: Option<RemoteConfig>,
    /// Size of the worker pool.
    pub workers: usize,
    /// Optional bound on buffered units.
    pub buffer_capacity: Option<usize>,
    /// File receiving a copy of the logs.
    pub log_file: PathBuf,
}

/// Object-store connection settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Base URL of the object store.
    pub endpoint: String,
    /// Bucket holding the items.
    pub bucket: String,
    /// Key prefix restricting the listing.
    pub prefix: String,
    /// Optional bearer token.
    pub token: Option<String>,
    /// Continuation token to resume listing from.
    pub start_token: Option<String>,
}

/// Supported item sources.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SourceKind {
    /// Files under a local directory.
    #[default]
    Local,
    /// Objects in an S3-compatible bucket.
    Remote,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let source = optional("INGEST_SOURCE")
            .map(|value| {
                value
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("INGEST_SOURCE".to_string()))
            })
            .transpose()?
            .unwrap_or_default();

        let remote = match (
            optional("INGEST_REMOTE_ENDPOINT"),
            optional("INGEST_REMOTE_BUCKET"),
        ) {
            (Some(endpoint), Some(bucket)) => Some(RemoteConfig {
                endpoint,
                bucket,
                prefix: optional("INGEST_REMOTE_PREFIX").unwrap_or_default(),
                token: optional("INGEST_REMOTE_TOKEN"),
                start_token: optional("INGEST_REMOTE_START_TOKEN"),
            }),
            (None, _) if source == SourceKind::Remote => {
                return Err(ConfigError::MissingVariable(
                    "INGEST_REMOTE_ENDPOINT".to_string(),
                ));
            }
            (_, None) if source == SourceKind::Remote => {
                return Err(ConfigError::MissingVariable("INGEST_REMOTE_BUCKET".to_string()));
            }
            _ => None,
        };

        Ok(Self {
            source,
            local_dir: optional("INGEST_LOCAL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            recursive: optional("INGEST_RECURSIVE")
                .map(|value| parse_flag("INGEST_RECURSIVE", &value))
                .transpose()?
                .unwrap_or(false),
            remote,
            workers: optional("INGEST_WORKERS")
                .map(|value| parse_positive("INGEST_WORKERS", &value))
                .transpose()?
                .unwrap_or(DEFAULT_WORKERS),
            buffer_capacity: optional("INGEST_BUFFER_CAPACITY")
                .map(|value| parse_positive("INGEST_BUFFER_CAPACITY", &value))
                .transpose()?,
            log_file: optional("INGEST_LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
        })
    }

    /// Load `.env` if present, then read configuration from the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        tracing::debug!(
            source = ?config.source,
            local_dir = %config.local_dir.display(),
            recursive = config.recursive,
            workers = config.workers,
            buffer_capacity = ?config.buffer_capacity,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Pipeline settings derived from this configuration, keeping only items ending in `suffix`.
    pub fn pipeline_settings(&self, suffix: impl Into<String>) -> PipelineSettings {
        PipelineSettings {
            workers: self.workers,
            buffer_capacity: self.buffer_capacity,
            suffix: suffix.into(),
        }
    }

    /// Object-store settings, or an error naming the first missing variable.
    pub fn object_store_settings(&self) -> Result<ObjectStoreSettings, ConfigError> {
        let remote = self
            .remote
            .as_ref()
            .ok_or_else(|| ConfigError::MissingVariable("INGEST_REMOTE_ENDPOINT".to_string()))?;
        let mut settings = ObjectStoreSettings::new(&remote.endpoint, &remote.bucket);
        settings.prefix = remote.prefix.clone();
        settings.token = remote.token.clone();
        settings.start_token = remote.start_token.clone();
        Ok(settings)
    }
}

fn parse_positive(key: &str, value: &str) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::InvalidValue(key.to_string())),
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(key.to_string())),
    }
}

impl std::str::FromStr for SourceKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            _ => Err(()),
        }
    }
}
