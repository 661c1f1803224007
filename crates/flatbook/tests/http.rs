use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use flatbook::{router, AppState};
use flatbook_bucket::{BucketError, BucketStore, MemoryBucketStore};
use flatbook_core::{ArtifactLayout, ArtifactStore, IngestService, IngestSettings};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> (Arc<MemoryBucketStore>, axum::Router) {
    let bucket = Arc::new(MemoryBucketStore::new());
    let store = ArtifactStore::new(bucket.clone(), ArtifactLayout::default());
    let service = IngestService::new(store, IngestSettings::new("sales", "ts"));
    (bucket, router(AppState::new(service)))
}

async fn post(app: &axum::Router, uri: &str, body: Vec<u8>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

fn sale(ts: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "ts": ts,
        "plan": {"title": "Yoga Course", "price": {"value": "20", "currency": "USD"}}
    }))
    .expect("serialize")
}

#[tokio::test]
async fn webhook_appends_then_reports_duplicate() {
    let (bucket, app) = app();

    let (status, body) = post(&app, "/", sale("2024-01-01T00:00:00Z")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "appended");
    assert_eq!(body["appended"], true);
    assert_eq!(body["rows"], 1);
    assert!(body["columnar_id"].as_str().expect("columnar id").ends_with(".parquet"));
    assert!(body["tabular_id"].as_str().expect("tabular id").ends_with(".xlsx"));

    let writes = bucket.put_count();
    let (status, body) = post(&app, "/webhook", sale("2023-12-31T00:00:00Z")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "duplicate");
    assert_eq!(body["appended"], false);
    assert_eq!(body["rows"], 1);
    assert_eq!(bucket.put_count(), writes);
}

#[tokio::test]
async fn missing_order_key_is_bad_request() {
    let (bucket, app) = app();
    let body = serde_json::to_vec(&json!({"plan": {"title": "Yoga"}})).expect("serialize");

    let (status, body) = post(&app, "/", body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["kind"], "validation");
    assert!(body["error"].as_str().expect("message").contains("ts"));
    assert_eq!(bucket.put_count(), 0);
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let (_, app) = app();

    let (status, body) = post(&app, "/webhook", b"{not json".to_vec()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn unavailable_store_is_bad_gateway() {
    let (bucket, app) = app();
    bucket.set_unavailable(true);

    let (status, body) = post(&app, "/", sale("2024-01-01T00:00:00Z")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["kind"], "storage");
}

#[tokio::test]
async fn corrupt_manifest_is_internal_server_error() {
    let (bucket, app) = app();
    bucket
        .put_object("manifest.json", Bytes::from_static(b"{not json"), "application/json")
        .await
        .expect("seed");

    let (status, body) = post(&app, "/", sale("2024-01-01T00:00:00Z")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert_eq!(body["kind"], "internal");
}

/// Advances the manifest behind the handler's back once the tabular artifact is stored.
struct RivalWriter {
    inner: Arc<MemoryBucketStore>,
    fired: AtomicBool,
}

#[async_trait]
impl BucketStore for RivalWriter {
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), BucketError> {
        self.inner.put_object(key, bytes, content_type).await?;
        if key.ends_with(".xlsx") && !self.fired.swap(true, Ordering::SeqCst) {
            let rival = json!({"sales": {"columnar_id": "datasets/sales/rival.parquet"}});
            let bytes = Bytes::from(serde_json::to_vec(&rival).expect("serialize"));
            self.inner
                .put_object("manifest.json", bytes, "application/json")
                .await?;
        }
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, BucketError> {
        self.inner.get_object(key).await
    }

    async fn delete_object(&self, key: &str) -> Result<(), BucketError> {
        self.inner.delete_object(key).await
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, BucketError> {
        self.inner.list_prefix(prefix).await
    }
}

#[tokio::test]
async fn lost_manifest_race_is_conflict() {
    let bucket = Arc::new(MemoryBucketStore::new());
    let rival = Arc::new(RivalWriter {
        inner: bucket.clone(),
        fired: AtomicBool::new(false),
    });
    let store = ArtifactStore::new(rival, ArtifactLayout::default());
    let app = router(AppState::new(IngestService::new(
        store,
        IngestSettings::new("sales", "ts"),
    )));

    let (status, body) = post(&app, "/webhook", sale("2024-01-01T00:00:00Z")).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");
    assert_eq!(bucket.keys(), ["manifest.json"]);
}

#[tokio::test]
async fn export_renders_current_dataset_as_csv() {
    let bucket = Arc::new(MemoryBucketStore::new());
    let store = ArtifactStore::new(bucket, ArtifactLayout::default());
    let state = AppState::new(IngestService::new(store, IngestSettings::new("sales", "ts")));

    assert!(state.export_csv().await.is_err());

    state
        .service
        .ingest(&sale("2024-01-01T00:00:00Z"))
        .await
        .expect("ingest");
    let csv = String::from_utf8(state.export_csv().await.expect("export")).expect("utf8");
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(lines[0], "ts,plan_title,plan_price_value,plan_price_currency");
    assert_eq!(lines[1], "2024-01-01T00:00:00Z,Yoga Course,20,USD");
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (_, app) = app();
    let request = Request::builder()
        .uri("/healthz")
        .body(Body::empty())
        .expect("request");

    let response = app.oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let body: Value = serde_json::from_slice(&bytes).expect("json body");
    assert_eq!(body, json!({"status": "ok"}));
}
