pub mod artifacts;
pub mod codec;
pub mod dataset;
pub mod error;
pub mod flatten;
pub mod ingest;
pub mod locks;
pub mod manifest;
pub mod merge;

pub use artifacts::{ArtifactLayout, ArtifactStem, ArtifactStore, StoreError};
pub use dataset::{Dataset, FlatRow, Scalar};
pub use error::{ErrorKind, IngestError, Stage};
pub use flatten::{flatten, flatten_payload, flatten_with_prefix, FlattenError};
pub use ingest::{IngestReceipt, IngestService, IngestSettings, IngestStatus};
pub use manifest::{ArtifactIds, Manifest};
pub use merge::{merge, MergeError, MergeOutcome};
