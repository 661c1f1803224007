use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{BucketError, BucketStore};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Bytes,
    content_type: String,
}

/// In-process store for development runs and tests.
///
/// Counts successful writes and can be told to fail, either entirely or for keys
/// with a given suffix, so callers can exercise their failure paths.
#[derive(Debug, Default)]
pub struct MemoryBucketStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    puts: AtomicUsize,
    unavailable: AtomicBool,
    failing_suffix: Mutex<Option<String>>,
}

impl MemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> MutexGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of successful `put_object` calls so far.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects().keys().cloned().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects().contains_key(key)
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects()
            .get(key)
            .map(|object| object.content_type.clone())
    }

    /// Make every operation fail with [`BucketError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Reject writes to keys ending in `suffix`; `None` clears the rule.
    pub fn fail_puts_with_suffix(&self, suffix: Option<&str>) {
        let mut guard = self
            .failing_suffix
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = suffix.map(str::to_string);
    }

    fn check_available(&self, key: &str) -> Result<(), BucketError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(BucketError::Unavailable(format!(
                "memory store offline while accessing '{key}'"
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BucketStore for MemoryBucketStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), BucketError> {
        self.check_available(key)?;
        let rejected = self
            .failing_suffix
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_deref()
            .is_some_and(|suffix| key.ends_with(suffix));
        if rejected {
            return Err(BucketError::Unavailable(format!(
                "write to '{key}' rejected"
            )));
        }

        self.objects().insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, BucketError> {
        self.check_available(key)?;
        self.objects()
            .get(key)
            .map(|object| object.bytes.clone())
            .ok_or_else(|| BucketError::NotFound(key.to_string()))
    }

    async fn delete_object(&self, key: &str) -> Result<(), BucketError> {
        self.check_available(key)?;
        self.objects().remove(key);
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, BucketError> {
        self.check_available(prefix)?;
        Ok(self
            .objects()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
