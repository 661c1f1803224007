use std::sync::Arc;

use anyhow::Context;
use flatbook_core::codec::encode_csv;
use flatbook_core::{ArtifactStore, IngestService};

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IngestService>,
}

impl AppState {
    pub fn new(service: IngestService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    pub async fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let bucket = config
            .store
            .connect()
            .await
            .with_context(|| format!("failed to open {} artifact store", config.store.name()))?;
        let store = ArtifactStore::new(bucket, config.layout.clone());
        Ok(Self::new(IngestService::new(store, config.settings.clone())))
    }

    /// Current dataset rendered as CSV, resolved through the manifest.
    pub async fn export_csv(&self) -> anyhow::Result<Vec<u8>> {
        let dataset_name = &self.service.settings().dataset_name;
        let store = self.service.store();
        let columnar_id = store
            .resolve_manifest(dataset_name)
            .await?
            .columnar_id
            .with_context(|| format!("dataset '{dataset_name}' has no artifacts yet"))?;
        let dataset = store.load_columnar(&columnar_id).await?;
        Ok(encode_csv(&dataset)?)
    }
}
