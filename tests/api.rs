use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use dash_wiz::config::AppConfig;
use dash_wiz::llm::{LlmError, LlmManager, SqlGenerator};
use dash_wiz::web::routes;
use dash_wiz::web::state::AppState;

struct StubGenerator {
    reply: String,
    called: Arc<AtomicBool>,
}

impl StubGenerator {
    fn new(reply: &str) -> (Self, Arc<AtomicBool>) {
        let called = Arc::new(AtomicBool::new(false));
        (
            Self {
                reply: reply.to_string(),
                called: Arc::clone(&called),
            },
            called,
        )
    }
}

#[async_trait]
impl SqlGenerator for StubGenerator {
    async fn generate_sql(&self, _question: &str, _schema: &str) -> Result<String, LlmError> {
        self.called.store(true, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

struct FailingGenerator;

#[async_trait]
impl SqlGenerator for FailingGenerator {
    async fn generate_sql(&self, _question: &str, _schema: &str) -> Result<String, LlmError> {
        Err(LlmError::ResponseError("model exploded".to_string()))
    }
}

fn app(manager: LlmManager) -> Router {
    let state = Arc::new(AppState::new(AppConfig::default(), manager));
    routes::api_routes().with_state(state)
}

fn disabled_app() -> Router {
    let mut config = AppConfig::default();
    config.llm.disabled = true;
    let manager = LlmManager::new(&config.llm).unwrap();
    let state = Arc::new(AppState::new(config, manager));
    routes::api_routes().with_state(state)
}

fn generate_request(body: Value) -> Request<Body> {
    Request::post("/generate-sql")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn body_json(router: Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn generate_sql_end_to_end() {
    let (stub, _) = StubGenerator::new("Sure, here: SELECT COUNT(*) FROM users;");
    let router = app(LlmManager::with_generator(
        Box::new(stub),
        "local",
        "stub-model",
        "cpu",
    ));

    let req = generate_request(json!({
        "db_schema": "CREATE TABLE users(id INT, name TEXT);",
        "question": "count users",
    }));
    let (status, json) = body_json(router, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sql_query"], "SELECT COUNT(*) FROM users;");
    assert_eq!(json["columns"], json!([]));
    assert_eq!(json["data"], json!([]));
    assert_eq!(json["rowCount"], 0);
    assert!(json.get("error").is_none());
}

#[tokio::test]
async fn empty_question_fails_validation_without_invoking_backend() {
    let (stub, called) = StubGenerator::new("SELECT 1;");
    let router = app(LlmManager::with_generator(
        Box::new(stub),
        "local",
        "stub-model",
        "cpu",
    ));

    let req = generate_request(json!({
        "db_schema": "CREATE TABLE t(a INT);",
        "question": "   ",
    }));
    let (status, json) = body_json(router, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sql_query"], "");
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("Validation error"));
    assert!(!called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn missing_schema_fails_validation_without_invoking_backend() {
    let (stub, called) = StubGenerator::new("SELECT 1;");
    let router = app(LlmManager::with_generator(
        Box::new(stub),
        "local",
        "stub-model",
        "cpu",
    ));

    // db_schema left out entirely
    let req = generate_request(json!({ "question": "count users" }));
    let (status, json) = body_json(router, req).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("Validation error"));
    assert!(!called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn backend_failure_is_reported_in_the_body() {
    let router = app(LlmManager::with_generator(
        Box::new(FailingGenerator),
        "local",
        "stub-model",
        "cpu",
    ));

    let req = generate_request(json!({
        "db_schema": "CREATE TABLE t(a INT);",
        "question": "anything",
    }));
    let (status, json) = body_json(router, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sql_query"], "");
    let error = json["error"].as_str().unwrap();
    assert!(error.starts_with("Internal server error"));
    assert!(error.contains("model exploded"));
}

#[tokio::test]
async fn disabled_provider_returns_service_unavailable() {
    let req = generate_request(json!({
        "db_schema": "CREATE TABLE t(a INT);",
        "question": "anything",
    }));
    let response = disabled_app().oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn health_reports_disabled_model_as_healthy() {
    let req = Request::get("/health").body(Body::empty()).unwrap();
    let (status, json) = body_json(disabled_app(), req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["model_loaded"], false);
    assert_eq!(json["device"], "disabled");
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn health_reports_loaded_local_model() {
    let (stub, _) = StubGenerator::new("SELECT 1;");
    let router = app(LlmManager::with_generator(
        Box::new(stub),
        "local",
        "stub-model",
        "cpu",
    ));

    let req = Request::get("/health").body(Body::empty()).unwrap();
    let (status, json) = body_json(router, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["model_loaded"], true);
    assert_eq!(json["device"], "cpu");
}

#[tokio::test]
async fn health_reports_remote_provider() {
    let (stub, _) = StubGenerator::new("SELECT 1;");
    let router = app(LlmManager::with_generator(
        Box::new(stub),
        "remote_http",
        "hosted-model",
        "remote",
    ));

    let req = Request::get("/health").body(Body::empty()).unwrap();
    let (status, json) = body_json(router, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["remote"], true);
    assert_eq!(json["provider"], "remote_http");
}

#[tokio::test]
async fn service_info_names_the_provider() {
    let (stub, _) = StubGenerator::new("SELECT 1;");
    let router = app(LlmManager::with_generator(
        Box::new(stub),
        "local",
        "stub-model",
        "cpu",
    ));

    let req = Request::get("/").body(Body::empty()).unwrap();
    let (status, json) = body_json(router, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["service"], "DASH-Wiz Natural-SQL Backend");
    assert_eq!(json["status"], "running");
    assert_eq!(json["provider"], "local");
    assert_eq!(json["model"], "stub-model");
    assert_eq!(json["device"], "cpu");
}
