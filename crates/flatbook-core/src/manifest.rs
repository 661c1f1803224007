use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Current artifact identifiers for one logical dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columnar_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tabular_id: Option<String>,
}

impl ArtifactIds {
    pub fn is_empty(&self) -> bool {
        self.columnar_id.is_none() && self.tabular_id.is_none()
    }
}

/// Persisted mapping of dataset name to its current artifacts:
/// `{ "<dataset>": { "columnar_id": "...", "tabular_id": "..." } }`.
///
/// Passed by value through each request; nothing caches it between requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    datasets: BTreeMap<String, ArtifactIds>,
}

impl Manifest {
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(bytes)
    }

    pub fn to_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    /// Entry for `dataset`, empty when the dataset has never been written.
    pub fn entry(&self, dataset: &str) -> ArtifactIds {
        self.datasets.get(dataset).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, dataset: &str, ids: ArtifactIds) {
        self.datasets.insert(dataset.to_string(), ids);
    }

    pub fn datasets(&self) -> impl Iterator<Item = (&str, &ArtifactIds)> {
        self.datasets.iter().map(|(name, ids)| (name.as_str(), ids))
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}
