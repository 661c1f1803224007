use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per dataset name, so at most one request in this process moves a
/// dataset from resolution to persistence at a time.
#[derive(Debug, Default)]
pub struct DatasetLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

#[derive(Debug)]
pub struct DatasetGuard {
    _guard: OwnedMutexGuard<()>,
}

impl DatasetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, dataset: &str) -> DatasetGuard {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks
                .entry(dataset.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        DatasetGuard {
            _guard: lock.lock_owned().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_dataset_is_serialised() {
        let locks = Arc::new(DatasetLocks::new());
        let first = locks.acquire("sales").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire("sales").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("second acquire should proceed once the first guard drops")
            .expect("task panicked");
    }

    #[tokio::test]
    async fn different_datasets_do_not_block() {
        let locks = DatasetLocks::new();
        let _sales = locks.acquire("sales").await;
        tokio::time::timeout(Duration::from_millis(100), locks.acquire("refunds"))
            .await
            .expect("independent dataset should not wait");
    }
}
