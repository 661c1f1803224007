//! Request orchestration: payload → flat row → merge against the stored dataset →
//! columnar write → tabular write → manifest write.
//!
//! The manifest is always written last, so a failure part-way through leaves it pointing
//! at the previous, complete artifact pair.

use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::artifacts::{ArtifactStore, StoreError};
use crate::dataset::{Dataset, FlatRow};
use crate::error::{IngestError, Stage};
use crate::flatten::flatten_payload;
use crate::locks::DatasetLocks;
use crate::manifest::ArtifactIds;
use crate::merge::{merge, order_value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSettings {
    pub dataset_name: String,
    pub order_key: String,
    pub prune_previous: bool,
}

impl IngestSettings {
    pub fn new(dataset_name: impl Into<String>, order_key: impl Into<String>) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            order_key: order_key.into(),
            prune_previous: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Appended,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReceipt {
    pub status: IngestStatus,
    pub appended: bool,
    pub rows: usize,
    pub columnar_id: Option<String>,
    pub tabular_id: Option<String>,
}

pub struct IngestService {
    store: ArtifactStore,
    settings: IngestSettings,
    locks: DatasetLocks,
}

impl IngestService {
    pub fn new(store: ArtifactStore, settings: IngestSettings) -> Self {
        Self {
            store,
            settings,
            locks: DatasetLocks::new(),
        }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Handles one raw request body.
    pub async fn ingest(&self, body: &[u8]) -> Result<IngestReceipt, IngestError> {
        let fingerprint = blake3::hash(body).to_hex().to_string();
        let span = info_span!(
            "ingest",
            dataset = %self.settings.dataset_name,
            payload = %&fingerprint[..16],
        );

        async move {
            debug!(stage = %Stage::Received, bytes = body.len(), "payload received");
            let row = flatten_payload(body)?;
            debug!(stage = %Stage::Parsed, columns = row.len(), "payload flattened");
            let receipt = self.ingest_row(row).await?;
            debug!(stage = %Stage::Responded, status = ?receipt.status, "receipt ready");
            Ok::<_, IngestError>(receipt)
        }
        .instrument(span)
        .await
    }

    /// Handles an already flattened row.
    pub async fn ingest_row(&self, row: FlatRow) -> Result<IngestReceipt, IngestError> {
        let dataset_name = self.settings.dataset_name.as_str();
        let order_key = self.settings.order_key.as_str();

        // Reject before touching storage.
        order_value(&row, order_key)?;

        let _guard = self.locks.acquire(dataset_name).await;

        let recorded = self
            .store
            .resolve_manifest(dataset_name)
            .await
            .map_err(IngestError::storage(Stage::Parsed))?;
        let current = if recorded.is_empty() {
            let discovered = self
                .store
                .discover(dataset_name)
                .await
                .map_err(IngestError::storage(Stage::Parsed))?;
            if !discovered.is_empty() {
                warn!(
                    columnar_id = ?discovered.columnar_id,
                    "manifest has no entry; adopting newest stored artifacts"
                );
            }
            discovered
        } else {
            recorded.clone()
        };

        let existing = self
            .load_existing(&current)
            .await
            .map_err(IngestError::storage(Stage::Parsed))?;
        debug!(
            stage = %Stage::Resolved,
            existing_rows = existing.as_ref().map_or(0, Dataset::len),
            "dataset resolved"
        );

        let outcome = merge(existing, &row, order_key)?;
        let rows = outcome.dataset.len();

        if !outcome.appended {
            if recorded != current {
                // Adopted pair: record it so later requests resolve through the manifest.
                self.store
                    .persist_manifest(dataset_name, &recorded, current.clone())
                    .await
                    .map_err(IngestError::storage(Stage::Resolved))?;
            }
            info!(rows, "record already present; nothing written");
            return Ok(IngestReceipt {
                status: IngestStatus::Duplicate,
                appended: false,
                rows,
                columnar_id: current.columnar_id,
                tabular_id: current.tabular_id,
            });
        }
        debug!(stage = %Stage::Merged, rows, "row appended in memory");

        let written = self.persist(&outcome.dataset, &recorded).await?;
        debug!(stage = %Stage::Persisted, "manifest advanced");

        if self.settings.prune_previous {
            let removed = self.store.sweep(dataset_name, &written).await;
            debug!(removed, "swept superseded artifacts");
        }

        info!(
            rows,
            columnar_id = ?written.columnar_id,
            tabular_id = ?written.tabular_id,
            "record appended"
        );
        Ok(IngestReceipt {
            status: IngestStatus::Appended,
            appended: true,
            rows,
            columnar_id: written.columnar_id,
            tabular_id: written.tabular_id,
        })
    }

    async fn load_existing(&self, current: &ArtifactIds) -> Result<Option<Dataset>, StoreError> {
        match current.columnar_id.as_deref() {
            Some(columnar_id) => self.store.load_columnar(columnar_id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Columnar, then tabular, then manifest.
    async fn persist(
        &self,
        dataset: &Dataset,
        recorded: &ArtifactIds,
    ) -> Result<ArtifactIds, IngestError> {
        let dataset_name = self.settings.dataset_name.as_str();
        let stem = self.store.layout().fresh_stem(dataset_name);

        let columnar_id = self
            .store
            .store_columnar(&stem, dataset)
            .await
            .map_err(IngestError::storage(Stage::Merged))?;
        let tabular_id = self
            .store
            .store_tabular(&stem, dataset)
            .await
            .map_err(IngestError::storage(Stage::Merged))?;

        let written = ArtifactIds {
            columnar_id: Some(columnar_id),
            tabular_id: Some(tabular_id),
        };

        match self
            .store
            .persist_manifest(dataset_name, recorded, written.clone())
            .await
        {
            Ok(_) => Ok(written),
            Err(err) => {
                if matches!(err, StoreError::Conflict { .. }) {
                    // The manifest was never updated, so the fresh pair is unreachable.
                    self.store.prune(&written, &ArtifactIds::default()).await;
                }
                warn!(error = %err, "manifest not advanced");
                Err(IngestError::Storage {
                    stage: Stage::Merged,
                    source: err,
                })
            }
        }
    }
}
