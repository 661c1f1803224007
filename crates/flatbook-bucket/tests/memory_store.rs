use bytes::Bytes;
use flatbook_bucket::{BucketError, BucketStore, MemoryBucketStore};

#[tokio::test]
async fn counts_successful_writes_only() {
    let store = MemoryBucketStore::new();
    store
        .put_object("a.parquet", Bytes::from_static(b"1"), "application/vnd.apache.parquet")
        .await
        .expect("put");

    store.fail_puts_with_suffix(Some(".csv"));
    let err = store
        .put_object("a.csv", Bytes::from_static(b"1"), "text/csv")
        .await
        .unwrap_err();
    assert!(matches!(err, BucketError::Unavailable(_)));

    assert_eq!(store.put_count(), 1);
    assert!(store.contains("a.parquet"));
    assert!(!store.contains("a.csv"));
    assert_eq!(
        store.content_type("a.parquet").as_deref(),
        Some("application/vnd.apache.parquet")
    );
}

#[tokio::test]
async fn unavailable_store_fails_every_operation() {
    let store = MemoryBucketStore::new();
    store.set_unavailable(true);

    assert!(store.get_object("manifest.json").await.is_err());
    assert!(store.list_prefix("").await.is_err());
    assert!(store.delete_object("x").await.is_err());

    store.set_unavailable(false);
    let err = store.get_object("manifest.json").await.unwrap_err();
    assert!(err.is_not_found());
}
