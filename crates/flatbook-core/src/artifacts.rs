//! Adapter between the ingest core and the bucket: manifest resolution, artifact
//! load/store, and pruning of superseded artifacts.
//!
//! Artifacts are immutable. Every write stores its pair under a fresh time-ordered stem, so
//! the manifest write is the single point where a new dataset version becomes visible.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use flatbook_bucket::{BucketError, BucketStore};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::codec::{self, CodecError, PARQUET_CONTENT_TYPE, XLSX_CONTENT_TYPE};
use crate::dataset::Dataset;
use crate::manifest::{ArtifactIds, Manifest};

const PARQUET_EXTENSION: &str = ".parquet";
const XLSX_EXTENSION: &str = ".xlsx";
const MANIFEST_CONTENT_TYPE: &str = "application/json";
const SHEET_NAME_LIMIT: usize = 31;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Bucket(#[from] BucketError),
    #[error("artifact '{0}' not found")]
    NotFound(String),
    #[error("artifact '{key}' could not be decoded: {source}")]
    Decode {
        key: String,
        #[source]
        source: CodecError,
    },
    #[error("dataset could not be encoded: {0}")]
    Encode(#[source] CodecError),
    #[error("manifest '{key}' is not valid: {source}")]
    Manifest {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("manifest entry for '{dataset}' changed since it was read")]
    Conflict { dataset: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    pub prefix: String,
    pub manifest_key: String,
    /// Worksheet name for the tabular artifact; derived from the dataset name when unset.
    pub sheet_name: Option<String>,
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self {
            prefix: "datasets".to_string(),
            manifest_key: "manifest.json".to_string(),
            sheet_name: None,
        }
    }
}

impl ArtifactLayout {
    pub fn dataset_prefix(&self, dataset: &str) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{dataset}/")
        } else {
            format!("{prefix}/{dataset}/")
        }
    }

    /// A new time-ordered stem shared by both artifacts of one write.
    pub fn fresh_stem(&self, dataset: &str) -> ArtifactStem {
        ArtifactStem {
            dataset: dataset.to_string(),
            stem: format!("{}{}", self.dataset_prefix(dataset), Uuid::now_v7()),
        }
    }

    pub fn sheet_name(&self, dataset: &str) -> String {
        if let Some(name) = &self.sheet_name {
            return name.clone();
        }
        dataset
            .chars()
            .map(|c| if is_reserved_sheet_char(c) { '_' } else { c })
            .take(SHEET_NAME_LIMIT)
            .collect()
    }
}

/// Characters a worksheet name may not contain.
pub fn is_reserved_sheet_char(c: char) -> bool {
    matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\')
}

/// Key stem of one write: `<prefix>/<dataset>/<uuid v7>`. The columnar and tabular
/// artifacts differ only by extension, so an incomplete pair is detectable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStem {
    dataset: String,
    stem: String,
}

impl ArtifactStem {
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn columnar_key(&self) -> String {
        format!("{}{PARQUET_EXTENSION}", self.stem)
    }

    pub fn tabular_key(&self) -> String {
        format!("{}{XLSX_EXTENSION}", self.stem)
    }
}

fn stem_of(key: &str) -> Option<&str> {
    key.strip_suffix(PARQUET_EXTENSION)
        .or_else(|| key.strip_suffix(XLSX_EXTENSION))
}

#[derive(Clone)]
pub struct ArtifactStore {
    bucket: Arc<dyn BucketStore>,
    layout: ArtifactLayout,
}

impl ArtifactStore {
    pub fn new(bucket: Arc<dyn BucketStore>, layout: ArtifactLayout) -> Self {
        Self { bucket, layout }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Reads the whole manifest; a missing manifest object is an empty manifest.
    pub async fn load_manifest(&self) -> Result<Manifest, StoreError> {
        let key = &self.layout.manifest_key;
        match self.bucket.get_object(key).await {
            Ok(bytes) => Manifest::from_slice(&bytes).map_err(|source| StoreError::Manifest {
                key: key.clone(),
                source,
            }),
            Err(err) if err.is_not_found() => Ok(Manifest::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Manifest entry recorded for `dataset`.
    pub async fn resolve_manifest(&self, dataset: &str) -> Result<ArtifactIds, StoreError> {
        Ok(self.load_manifest().await?.entry(dataset))
    }

    /// Newest complete artifact pair under the dataset prefix. Used when the manifest has
    /// no entry but artifacts were already written, e.g. the manifest object was lost. A
    /// columnar artifact without its tabular sibling is an unfinished write and is ignored.
    pub async fn discover(&self, dataset: &str) -> Result<ArtifactIds, StoreError> {
        let keys = self
            .bucket
            .list_prefix(&self.layout.dataset_prefix(dataset))
            .await?;
        let stored: HashSet<&str> = keys.iter().map(String::as_str).collect();

        let newest = keys
            .iter()
            .filter_map(|key| key.strip_suffix(PARQUET_EXTENSION))
            .filter(|stem| stored.contains(format!("{stem}{XLSX_EXTENSION}").as_str()))
            .max();

        Ok(match newest {
            Some(stem) => ArtifactIds {
                columnar_id: Some(format!("{stem}{PARQUET_EXTENSION}")),
                tabular_id: Some(format!("{stem}{XLSX_EXTENSION}")),
            },
            None => ArtifactIds::default(),
        })
    }

    pub async fn load_columnar(&self, columnar_id: &str) -> Result<Dataset, StoreError> {
        let bytes = self.bucket.get_object(columnar_id).await.map_err(|err| {
            if err.is_not_found() {
                StoreError::NotFound(columnar_id.to_string())
            } else {
                StoreError::Bucket(err)
            }
        })?;
        codec::decode_parquet(&bytes).map_err(|source| StoreError::Decode {
            key: columnar_id.to_string(),
            source,
        })
    }

    pub async fn store_columnar(
        &self,
        stem: &ArtifactStem,
        dataset: &Dataset,
    ) -> Result<String, StoreError> {
        let bytes = codec::encode_parquet(dataset).map_err(StoreError::Encode)?;
        let key = stem.columnar_key();
        self.bucket
            .put_object(&key, Bytes::from(bytes), PARQUET_CONTENT_TYPE)
            .await?;
        debug!(key = %key, rows = dataset.len(), "stored columnar artifact");
        Ok(key)
    }

    pub async fn store_tabular(
        &self,
        stem: &ArtifactStem,
        dataset: &Dataset,
    ) -> Result<String, StoreError> {
        let sheet_name = self.layout.sheet_name(stem.dataset());
        let bytes = codec::encode_xlsx(dataset, &sheet_name).map_err(StoreError::Encode)?;
        let key = stem.tabular_key();
        self.bucket
            .put_object(&key, Bytes::from(bytes), XLSX_CONTENT_TYPE)
            .await?;
        debug!(key = %key, rows = dataset.len(), sheet = %sheet_name, "stored tabular artifact");
        Ok(key)
    }

    /// Points `dataset` at `ids`, refusing if its entry no longer equals `expected`.
    pub async fn persist_manifest(
        &self,
        dataset: &str,
        expected: &ArtifactIds,
        ids: ArtifactIds,
    ) -> Result<Manifest, StoreError> {
        let mut manifest = self.load_manifest().await?;
        if &manifest.entry(dataset) != expected {
            return Err(StoreError::Conflict {
                dataset: dataset.to_string(),
            });
        }

        manifest.set(dataset, ids);
        let bytes = manifest
            .to_vec()
            .map_err(|source| StoreError::Manifest {
                key: self.layout.manifest_key.clone(),
                source,
            })?;
        self.bucket
            .put_object(
                &self.layout.manifest_key,
                Bytes::from(bytes),
                MANIFEST_CONTENT_TYPE,
            )
            .await?;
        Ok(manifest)
    }

    /// Deletes the artifacts in `superseded` that are not part of `current`. Failures are
    /// logged and skipped; returns the number of objects removed.
    pub async fn prune(&self, superseded: &ArtifactIds, current: &ArtifactIds) -> usize {
        let mut removed = 0;
        let candidates = [&superseded.columnar_id, &superseded.tabular_id];
        for key in candidates.into_iter().flatten() {
            let still_current = current.columnar_id.as_ref() == Some(key)
                || current.tabular_id.as_ref() == Some(key);
            if still_current {
                continue;
            }
            match self.bucket.delete_object(key).await {
                Ok(()) => removed += 1,
                Err(err) => warn!(key = %key, error = %err, "failed to prune superseded artifact"),
            }
        }
        removed
    }

    /// Deletes artifacts under the dataset prefix whose stem is older than the pair in
    /// `current`: superseded versions and leftovers of failed writes. Stems newer than
    /// `current` are kept; they can only belong to writers still heading for their
    /// manifest write. Best effort; returns the number of objects removed.
    pub async fn sweep(&self, dataset: &str, current: &ArtifactIds) -> usize {
        let Some(current_stem) = current.columnar_id.as_deref().and_then(stem_of) else {
            return 0;
        };
        let keys = match self
            .bucket
            .list_prefix(&self.layout.dataset_prefix(dataset))
            .await
        {
            Ok(keys) => keys,
            Err(err) => {
                warn!(dataset, error = %err, "failed to list artifacts for sweep");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys {
            match stem_of(&key) {
                Some(stem) if stem < current_stem => {}
                _ => continue,
            }
            match self.bucket.delete_object(&key).await {
                Ok(()) => removed += 1,
                Err(err) => warn!(key = %key, error = %err, "failed to sweep stale artifact"),
            }
        }
        removed
    }
}
