//! Abstractions over the object storage that holds dataset artifacts and the manifest.
//!
//! Every backend must make a single `put_object` all-or-nothing: a reader either sees the
//! previous object (or nothing) or the complete new one.

mod local;
mod memory;
mod s3;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use local::LocalBucketStore;
pub use memory::MemoryBucketStore;
pub use s3::{S3BucketStore, S3Config};

#[derive(Debug, Error)]
pub enum BucketError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("sdk error: {0}")]
    Sdk(String),
    #[error("io error on '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl BucketError {
    fn from_sdk(err: impl fmt::Display) -> Self {
        Self::Sdk(err.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BucketError::NotFound(_))
    }
}

#[async_trait]
pub trait BucketStore: Send + Sync {
    async fn put_object(&self, key: &str, bytes: Bytes, content_type: &str)
        -> Result<(), BucketError>;
    async fn get_object(&self, key: &str) -> Result<Bytes, BucketError>;
    async fn delete_object(&self, key: &str) -> Result<(), BucketError>;
    /// Keys under `prefix`, sorted ascending.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, BucketError>;
}
