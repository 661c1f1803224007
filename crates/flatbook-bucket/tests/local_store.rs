use std::path::PathBuf;

use bytes::Bytes;
use flatbook_bucket::{BucketError, BucketStore, LocalBucketStore};
use uuid::Uuid;

fn scratch_root() -> PathBuf {
    std::env::temp_dir().join(format!("flatbook-local-{}", Uuid::new_v4().simple()))
}

#[tokio::test]
async fn put_get_and_overwrite_roundtrip() {
    let root = scratch_root();
    let store = LocalBucketStore::new(&root).await.expect("create store");

    store
        .put_object("datasets/sales/a.csv", Bytes::from_static(b"first"), "text/csv")
        .await
        .expect("first put");
    store
        .put_object("datasets/sales/a.csv", Bytes::from_static(b"second"), "text/csv")
        .await
        .expect("overwrite");

    let data = store.get_object("datasets/sales/a.csv").await.expect("get");
    assert_eq!(&data[..], b"second");

    let _ = std::fs::remove_dir_all(root);
}

#[tokio::test]
async fn missing_object_is_not_found() {
    let root = scratch_root();
    let store = LocalBucketStore::new(&root).await.expect("create store");

    let err = store.get_object("manifest.json").await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");

    store
        .delete_object("manifest.json")
        .await
        .expect("deleting a missing key is not an error");

    let _ = std::fs::remove_dir_all(root);
}

#[tokio::test]
async fn list_prefix_returns_sorted_nested_keys_without_temp_files() {
    let root = scratch_root();
    let store = LocalBucketStore::new(&root).await.expect("create store");

    for key in ["datasets/b/2.parquet", "datasets/b/1.parquet", "other/x", "manifest.json"] {
        store
            .put_object(key, Bytes::from_static(b"x"), "application/octet-stream")
            .await
            .expect("put");
    }
    std::fs::write(root.join("datasets/b/3.parquet.tmp-abc"), b"partial").expect("stray temp");

    let keys = store.list_prefix("datasets/b/").await.expect("list");
    assert_eq!(keys, vec!["datasets/b/1.parquet", "datasets/b/2.parquet"]);

    let _ = std::fs::remove_dir_all(root);
}

#[tokio::test]
async fn rejects_keys_escaping_the_root() {
    let root = scratch_root();
    let store = LocalBucketStore::new(&root).await.expect("create store");

    let err = store
        .put_object("../outside", Bytes::from_static(b"x"), "text/plain")
        .await
        .unwrap_err();
    assert!(matches!(err, BucketError::Configuration(_)));

    let _ = std::fs::remove_dir_all(root);
}
