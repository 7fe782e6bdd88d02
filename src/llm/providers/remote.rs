use crate::config::LlmConfig;
use crate::llm::{LlmError, SqlGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

/// Forwards generation to a hosted model endpoint with a single POST.
pub struct RemoteLlmProvider {
    client: reqwest::Client,
    api_url: String,
    auth_header: Option<(String, String)>,
}

#[derive(Serialize)]
struct RemoteRequest<'a> {
    schema: &'a str,
    question: &'a str,
}

// Hosted endpoints have answered under either key over time; both stay
// recognized.
#[derive(Deserialize)]
struct RemoteResponse {
    sql_query: Option<String>,
    output: Option<String>,
}

impl RemoteLlmProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_url = config.remote_url.clone().ok_or_else(|| {
            LlmError::ConfigError("REMOTE_URL is required for the remote_http provider".to_string())
        })?;

        let auth_header = match (&config.remote_auth_header, &config.remote_auth_token) {
            (Some(name), Some(value)) => Some((name.clone(), value.clone())),
            _ => None,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            auth_header,
        })
    }
}

#[async_trait]
impl SqlGenerator for RemoteLlmProvider {
    async fn generate_sql(&self, question: &str, schema: &str) -> Result<String, LlmError> {
        info!("Sending generation request to remote endpoint");
        debug!("API URL: {}", self.api_url);

        let request = RemoteRequest { schema, question };

        let mut builder = self.client.post(&self.api_url).json(&request);
        if let Some((name, value)) = &self.auth_header {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            // Carry the error body along when the endpoint sends one
            let error_body = match response.text().await {
                Ok(body) => format!(" - Response body: {}", body),
                Err(_) => String::new(),
            };

            error!("Remote endpoint responded with status code: {}{}", status, error_body);
            return Err(LlmError::ResponseError(format!(
                "Remote endpoint responded with status code: {}{}",
                status, error_body
            )));
        }

        let remote_response: RemoteResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseError(e.to_string()))?;

        let text = remote_response
            .sql_query
            .filter(|s| !s.is_empty())
            .or(remote_response.output.filter(|s| !s.is_empty()));

        match text {
            Some(text) => Ok(text),
            None => Err(LlmError::ResponseError(
                "Remote endpoint returned neither 'sql_query' nor 'output'".to_string(),
            )),
        }
    }
}
