use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::llm::LlmError;
use crate::web::state::AppState;

// Query types

// Missing fields deserialize to empty strings so they take the validation
// path instead of a serde rejection.
#[derive(Debug, Deserialize, Clone)]
pub struct QueryRequest {
    #[serde(default)]
    pub db_schema: String,
    #[serde(default)]
    pub question: String,
}

// The tabular fields are placeholders: the service generates SQL but never
// executes it.
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub sql_query: String,
    pub columns: Vec<String>,
    pub data: Vec<serde_json::Value>,
    #[serde(rename = "rowCount")]
    pub row_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResponse {
    fn success(sql_query: String) -> Self {
        Self {
            sql_query,
            columns: Vec::new(),
            data: Vec::new(),
            row_count: 0,
            error: None,
        }
    }

    fn failure(error: String) -> Self {
        Self {
            sql_query: String::new(),
            columns: Vec::new(),
            data: Vec::new(),
            row_count: 0,
            error: Some(error),
        }
    }
}

// API Implementations

// Root endpoint - service information
pub async fn service_info(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "service": "DASH-Wiz Natural-SQL Backend",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "provider": state.llm.provider(),
        "model": state.llm.model(),
        "device": state.llm.device(),
    }))
}

// Health check endpoint
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let timestamp = chrono::Utc::now().to_rfc3339();

    // A disabled deployment is still a healthy one
    if state.config.llm.disabled {
        return Ok(Json(json!({
            "status": "healthy",
            "model_loaded": false,
            "device": "disabled",
            "timestamp": timestamp,
        })));
    }

    if state.llm.provider() == "local" {
        if !state.llm.is_loaded() {
            error!("Health check failed: model not loaded");
            return Err((StatusCode::SERVICE_UNAVAILABLE, "Model not loaded".to_string()));
        }

        return Ok(Json(json!({
            "status": "healthy",
            "model_loaded": true,
            "device": state.llm.device(),
            "timestamp": timestamp,
        })));
    }

    Ok(Json(json!({
        "status": "healthy",
        "remote": true,
        "provider": state.llm.provider(),
        "timestamp": timestamp,
    })))
}

/// Generates a SQL query from a natural-language question and a DB schema.
///
/// Backend failures are reported in the body's `error` field on a success
/// status; only a disabled provider surfaces as a transport-level 503.
pub async fn generate_sql(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, (StatusCode, String)> {
    let start_time = Instant::now();
    info!("Received new SQL generation request");
    info!("Schema length: {} characters", payload.db_schema.len());
    info!("Question: {}", payload.question);

    // Fail fast before any inference cost is spent
    if payload.db_schema.trim().is_empty() || payload.question.trim().is_empty() {
        warn!("Validation error: missing db_schema or question");
        return Ok(Json(QueryResponse::failure(
            "Validation error: Both schema and question are required".to_string(),
        )));
    }

    match state
        .llm
        .generate_sql(&payload.question, &payload.db_schema)
        .await
    {
        Ok(raw_output) => {
            let sql_query = extract_sql(&raw_output);
            info!("Generated SQL: {}", truncate_for_log(&sql_query, 100));
            info!(
                "Processing time: {:.2}s",
                start_time.elapsed().as_secs_f64()
            );
            Ok(Json(QueryResponse::success(sql_query)))
        }
        Err(LlmError::Unavailable(message)) => {
            warn!("Provider unavailable: {}", message);
            Err((StatusCode::SERVICE_UNAVAILABLE, message))
        }
        Err(e) => {
            error!("Internal error: {}", e);
            Ok(Json(QueryResponse::failure(format!(
                "Internal server error: {}",
                e
            ))))
        }
    }
}

/// Trims raw model output down to the SQL statement.
///
/// Keeps from the first `SELECT` onward (dropping any prompt echo), then
/// keeps up to and including the first `;` (dropping trailing commentary).
/// Text matching neither passes through unmodified.
pub fn extract_sql(raw: &str) -> String {
    let from_select = match raw.find("SELECT") {
        Some(start) => &raw[start..],
        None => raw,
    };

    match from_select.find(';') {
        Some(end) => from_select[..=end].to_string(),
        None => from_select.to_string(),
    }
}

fn truncate_for_log(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_sql_trims_echo_and_trailing_text() {
        let raw = "...noise...SELECT a FROM t;trailing";
        assert_eq!(extract_sql(raw), "SELECT a FROM t;");
    }

    #[test]
    fn extract_sql_without_select_passes_through() {
        let raw = "I cannot answer that question";
        assert_eq!(extract_sql(raw), raw);
    }

    #[test]
    fn extract_sql_without_semicolon_keeps_rest_of_string() {
        let raw = "Sure: SELECT name FROM users WHERE id = 1";
        assert_eq!(extract_sql(raw), "SELECT name FROM users WHERE id = 1");
    }

    #[test]
    fn extract_sql_stops_at_first_semicolon() {
        let raw = "SELECT 1; SELECT 2;";
        assert_eq!(extract_sql(raw), "SELECT 1;");
    }

    #[test]
    fn extract_sql_is_case_sensitive() {
        let raw = "select a from t";
        assert_eq!(extract_sql(raw), "select a from t");
    }

    #[test]
    fn extract_sql_truncates_at_semicolon_without_select() {
        let raw = "do the thing; and more";
        assert_eq!(extract_sql(raw), "do the thing;");
    }
}
