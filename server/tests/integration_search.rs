use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use search_core::persist::save_snapshot;
use search_core::{Artifact, SearchIndex};
use search_pool::PoolConfig;
use serde_json::{json, Value};
use server::{build_app, AppConfig};
use tower::ServiceExt;

const TOKEN: &str = "secret";

fn config() -> AppConfig {
    AppConfig {
        pool: PoolConfig { search_workers: 1, artifact_workers: 1, task_timeout: None },
        admin_token: Some(TOKEN.into()),
        ..Default::default()
    }
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>, token: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        builder = builder.header("X-ADMIN-TOKEN", t);
    }
    let req = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&v).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn fox_and_dog() -> Value {
    json!([
        { "id": "1", "content": "the quick brown fox", "title": "Fox", "type": "note" },
        { "id": "2", "content": "a lazy dog sleeps", "type": "note" }
    ])
}

#[tokio::test]
async fn index_search_remove_flow() {
    let app = build_app(config()).await.unwrap();

    let (status, body) = call(&app, "POST", "/index/batch", Some(fox_and_dog()), Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["indexed"].as_array().unwrap().len(), 2);

    let (status, body) = call(&app, "GET", "/search?q=fox", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalResults"], 1);
    assert_eq!(body["results"][0]["id"], "1");
    assert_eq!(body["results"][0]["snippet"], "the quick brown <em>fox</em>");

    let (_, body) = call(&app, "GET", "/search?q=nonexistentterm", None, None).await;
    assert_eq!(body["totalResults"], 0);

    let (_, body) = call(&app, "GET", "/search/fuzzy?q=foxx&max_distance=2", None, None).await;
    assert_eq!(body["results"][0]["id"], "1");

    let (_, body) = call(&app, "GET", "/search/advanced?q=type:note%20AND%20sleeps", None, None).await;
    assert_eq!(body["totalResults"], 1);
    assert_eq!(body["results"][0]["id"], "2");

    let (status, body) = call(&app, "DELETE", "/index/doc/1", None, Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], true);

    let (_, body) = call(&app, "GET", "/search?q=fox", None, None).await;
    assert_eq!(body["totalResults"], 0);

    let (_, body) = call(&app, "GET", "/stats", None, None).await;
    assert_eq!(body["index"]["totalArtifacts"], 1);
    assert_eq!(body["pool"]["pendingTasks"], 0);
}

#[tokio::test]
async fn mutations_require_admin_token() {
    let app = build_app(config()).await.unwrap();
    let (status, _) = call(&app, "POST", "/index/batch", Some(fox_and_dog()), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(&app, "POST", "/index/clear", None, Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn mutations_are_open_without_configured_token() {
    let app = build_app(AppConfig { admin_token: None, ..config() }).await.unwrap();
    let (status, body) = call(&app, "POST", "/index/batch", Some(fox_and_dog()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["indexed"].as_array().map(Vec::len), Some(2));
    let (status, _) = call(&app, "DELETE", "/index/doc/2", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn documents_named_like_routes_are_addressable() {
    let app = build_app(config()).await.unwrap();
    let docs = json!([
        { "id": "clear", "content": "clear skies tonight" },
        { "id": "export", "content": "export customs paperwork" }
    ]);
    call(&app, "POST", "/index/batch", Some(docs), Some(TOKEN)).await;

    let update = json!({ "id": "clear", "content": "cloudy morning forecast" });
    let (status, _) = call(&app, "PUT", "/index/doc/clear", Some(update), Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&app, "DELETE", "/index/doc/export", None, Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], true);

    let (_, body) = call(&app, "GET", "/search?q=cloudy", None, None).await;
    assert_eq!(body["results"][0]["id"], "clear");
    let (_, body) = call(&app, "GET", "/stats", None, None).await;
    assert_eq!(body["index"]["totalArtifacts"], 1);
}

#[tokio::test]
async fn single_index_is_enriched_and_updatable() {
    let app = build_app(config()).await.unwrap();
    let artifact = json!({ "id": "code-1", "content": "pub fn parse() {\n    let mut tokens = Vec::new();\n}\n", "title": "Parser" });
    let (status, _) = call(&app, "POST", "/index", Some(artifact), Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call(&app, "GET", "/search?q=tokens&language=rust", None, None).await;
    assert_eq!(body["results"][0]["id"], "code-1");

    let update = json!({ "id": "ignored", "content": "rewritten entirely", "title": "Parser" });
    let (status, _) = call(&app, "PUT", "/index/doc/code-1", Some(update), Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = call(&app, "GET", "/search?q=tokens", None, None).await;
    assert_eq!(body["totalResults"], 0);
    let (_, body) = call(&app, "GET", "/search?q=rewritten", None, None).await;
    assert_eq!(body["results"][0]["id"], "code-1");

    let (_, body) = call(&app, "GET", "/suggest?q=rewr", None, None).await;
    assert_eq!(body["suggestions"], json!(["rewritten"]));
}

#[tokio::test]
async fn export_then_import_round_trips() {
    let app = build_app(config()).await.unwrap();
    call(&app, "POST", "/index/batch", Some(fox_and_dog()), Some(TOKEN)).await;
    let (status, snapshot) = call(&app, "GET", "/index/export", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["version"], 1);

    let (_, cleared) = call(&app, "POST", "/index/clear", None, Some(TOKEN)).await;
    assert_eq!(cleared["cleared"], 2);
    let (_, body) = call(&app, "GET", "/search?q=fox", None, None).await;
    assert_eq!(body["totalResults"], 0);

    let (status, imported) = call(&app, "POST", "/index/import", Some(snapshot), Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(imported["artifacts"], 2);
    let (_, body) = call(&app, "GET", "/search?q=fox", None, None).await;
    assert_eq!(body["results"][0]["id"], "1");
}

#[tokio::test]
async fn invalid_import_is_rejected() {
    let app = build_app(config()).await.unwrap();
    call(&app, "POST", "/index/batch", Some(fox_and_dog()), Some(TOKEN)).await;
    let (_, mut snapshot) = call(&app, "GET", "/index/export", None, None).await;
    snapshot["invertedIndex"]["ghost"] = json!(["1"]);
    let (status, _) = call(&app, "POST", "/index/import", Some(snapshot), Some(TOKEN)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (_, body) = call(&app, "GET", "/stats", None, None).await;
    assert_eq!(body["index"]["totalArtifacts"], 2);
}

#[tokio::test]
async fn loads_snapshot_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.json");
    let mut index = SearchIndex::new();
    index.index_document(Artifact::new("1", "persisted rust notes").with_title("Notes")).unwrap();
    save_snapshot(&path, &index.export_snapshot()).unwrap();

    let app = build_app(AppConfig { snapshot: Some(path), ..config() }).await.unwrap();
    let (_, body) = call(&app, "GET", "/search?q=persisted", None, None).await;
    assert_eq!(body["results"][0]["id"], "1");
}
