//! Runtime configuration read from the environment (optionally seeded from `.env`).

use std::path::PathBuf;
use std::sync::Arc;

use flatbook_bucket::{
    BucketError, BucketStore, LocalBucketStore, MemoryBucketStore, S3BucketStore, S3Config,
};
use flatbook_core::artifacts::is_reserved_sheet_char;
use flatbook_core::{ArtifactLayout, IngestSettings};
use thiserror::Error;

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_LOCAL_ROOT: &str = "./flatbook-data";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var}='{value}' is not valid; expected {expected}")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone)]
pub enum StoreKind {
    S3(S3Config),
    Local(PathBuf),
    Memory,
}

impl StoreKind {
    pub fn name(&self) -> &'static str {
        match self {
            StoreKind::S3(_) => "s3",
            StoreKind::Local(_) => "local",
            StoreKind::Memory => "memory",
        }
    }

    pub async fn connect(&self) -> Result<Arc<dyn BucketStore>, BucketError> {
        Ok(match self {
            StoreKind::S3(config) => Arc::new(S3BucketStore::new(config.clone()).await?),
            StoreKind::Local(root) => Arc::new(LocalBucketStore::new(root.clone()).await?),
            StoreKind::Memory => Arc::new(MemoryBucketStore::new()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub settings: IngestSettings,
    pub layout: ArtifactLayout,
    pub store: StoreKind,
    pub bind: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds the configuration from any variable source; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let dataset_name = get("FLATBOOK_DATASET_NAME")
            .ok_or(ConfigError::Missing("FLATBOOK_DATASET_NAME"))?;
        if dataset_name.contains('/') {
            return Err(ConfigError::Invalid {
                var: "FLATBOOK_DATASET_NAME",
                value: dataset_name,
                expected: "a name without '/'",
            });
        }
        let order_key =
            get("FLATBOOK_ORDER_KEY").ok_or(ConfigError::Missing("FLATBOOK_ORDER_KEY"))?;

        let mut settings = IngestSettings::new(dataset_name, order_key);
        if let Some(value) = get("FLATBOOK_PRUNE_PREVIOUS") {
            settings.prune_previous = parse_bool("FLATBOOK_PRUNE_PREVIOUS", value)?;
        }

        let mut layout = ArtifactLayout::default();
        if let Some(prefix) = get("FLATBOOK_ARTIFACT_PREFIX") {
            layout.prefix = prefix;
        }
        if let Some(manifest_key) = get("FLATBOOK_MANIFEST_KEY") {
            layout.manifest_key = manifest_key;
        }
        if let Some(sheet_name) = get("FLATBOOK_SHEET_NAME") {
            if sheet_name.chars().count() > 31 || sheet_name.chars().any(is_reserved_sheet_char) {
                return Err(ConfigError::Invalid {
                    var: "FLATBOOK_SHEET_NAME",
                    value: sheet_name,
                    expected: "at most 31 characters, none of []:*?/\\",
                });
            }
            layout.sheet_name = Some(sheet_name);
        }

        let store = match get("FLATBOOK_STORE_KIND").as_deref() {
            None | Some("local") => StoreKind::Local(PathBuf::from(
                get("FLATBOOK_LOCAL_ROOT").unwrap_or_else(|| DEFAULT_LOCAL_ROOT.to_string()),
            )),
            Some("memory") => StoreKind::Memory,
            Some("s3") => {
                let defaults = S3Config::default();
                StoreKind::S3(S3Config {
                    bucket: get("S3_BUCKET").unwrap_or(defaults.bucket),
                    region: get("S3_REGION").unwrap_or(defaults.region),
                    endpoint: get("S3_ENDPOINT_URL"),
                    access_key_id: get("S3_ACCESS_KEY_ID"),
                    secret_access_key: get("S3_SECRET_ACCESS_KEY"),
                    session_token: get("S3_SESSION_TOKEN"),
                    force_path_style: match get("S3_FORCE_PATH_STYLE") {
                        Some(value) => parse_bool("S3_FORCE_PATH_STYLE", value)?,
                        None => defaults.force_path_style,
                    },
                })
            }
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "FLATBOOK_STORE_KIND",
                    value: other.to_string(),
                    expected: "one of s3, local, memory",
                })
            }
        };

        Ok(Self {
            settings,
            layout,
            store,
            bind: get("FLATBOOK_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
        })
    }
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value,
            expected: "a boolean",
        }),
    }
}
