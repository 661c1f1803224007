use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::{BucketError, BucketStore};

const TEMP_MARKER: &str = ".tmp-";

/// Directory-backed store. Writes land in a temp file that is renamed over the target.
#[derive(Debug, Clone)]
pub struct LocalBucketStore {
    root: PathBuf,
}

impl LocalBucketStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, BucketError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|source| BucketError::Io {
                key: root.display().to_string(),
                source,
            })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BucketError> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !valid {
            return Err(BucketError::Configuration(format!(
                "invalid object key '{key}'"
            )));
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(key: &str, source: std::io::Error) -> BucketError {
    if source.kind() == ErrorKind::NotFound {
        BucketError::NotFound(key.to_string())
    } else {
        BucketError::Io {
            key: key.to_string(),
            source,
        }
    }
}

#[async_trait]
impl BucketStore for LocalBucketStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        _content_type: &str,
    ) -> Result<(), BucketError> {
        let path = self.path_for(key)?;
        debug!(path = %path.display(), size = bytes.len(), "writing object");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error(key, source))?;
        }

        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(format!("{TEMP_MARKER}{}", Uuid::new_v4().simple()));
        let temp_path = PathBuf::from(temp_name);

        fs::write(&temp_path, &bytes)
            .await
            .map_err(|source| io_error(key, source))?;
        if let Err(source) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(io_error(key, source));
        }
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, BucketError> {
        let path = self.path_for(key)?;
        let data = fs::read(&path)
            .await
            .map_err(|source| io_error(key, source))?;
        Ok(Bytes::from(data))
    }

    async fn delete_object(&self, key: &str) -> Result<(), BucketError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(io_error(key, source)),
        }
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, BucketError> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(source) if source.kind() == ErrorKind::NotFound => continue,
                Err(source) => return Err(io_error(prefix, source)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|source| io_error(prefix, source))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|source| io_error(prefix, source))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|component| component.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) && !key.contains(TEMP_MARKER) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}
