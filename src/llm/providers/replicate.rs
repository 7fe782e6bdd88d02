use crate::config::LlmConfig;
use crate::llm::{LlmError, SqlGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

// One poll per second for at most a minute
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const POLL_ATTEMPTS: usize = 60;

/// Submits generation as an asynchronous prediction job and polls it to
/// completion.
pub struct ReplicateProvider {
    client: reqwest::Client,
    api_url: String,
    api_token: String,
    version: String,
    poll_interval: Duration,
    poll_attempts: usize,
}

#[derive(Serialize)]
struct CreatePrediction<'a> {
    version: &'a str,
    input: PredictionInput,
}

#[derive(Serialize)]
struct PredictionInput {
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    status: String,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: String,
}

impl ReplicateProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_token = config.job_api_token.clone().ok_or_else(|| {
            LlmError::ConfigError(
                "REPLICATE_API_TOKEN is required for the remote_job provider".to_string(),
            )
        })?;

        let version = config.job_model_version.clone().ok_or_else(|| {
            LlmError::ConfigError(
                "REPLICATE_MODEL_VERSION is required for the remote_job provider".to_string(),
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.job_api_url.clone(),
            api_token,
            version,
            poll_interval: POLL_INTERVAL,
            poll_attempts: POLL_ATTEMPTS,
        })
    }

    /// Overrides the polling schedule. The default is one poll per second
    /// for sixty attempts.
    pub fn with_poll_schedule(mut self, interval: Duration, attempts: usize) -> Self {
        self.poll_interval = interval;
        self.poll_attempts = attempts;
        self
    }

    pub fn model_version(&self) -> &str {
        &self.version
    }

    fn prepare_prompt(&self, question: &str, schema: &str) -> String {
        format!(
            r#"### Database Schema:
{}

### Question:
{}

### Please write a SQL query to answer this question.
SQL Query:"#,
            schema, question
        )
    }

    async fn create_prediction(&self, prompt: String) -> Result<Prediction, LlmError> {
        let request = CreatePrediction {
            version: &self.version,
            input: PredictionInput { prompt },
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Token {}", self.api_token))
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        self.parse_prediction(response).await
    }

    async fn fetch_prediction(&self, url: &str) -> Result<Prediction, LlmError> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Token {}", self.api_token))
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        self.parse_prediction(response).await
    }

    async fn parse_prediction(&self, response: reqwest::Response) -> Result<Prediction, LlmError> {
        if !response.status().is_success() {
            let status = response.status();
            let error_body = match response.text().await {
                Ok(body) => format!(" - Response body: {}", body),
                Err(_) => String::new(),
            };

            error!("Prediction API responded with status code: {}{}", status, error_body);
            return Err(LlmError::ResponseError(format!(
                "Prediction API responded with status code: {}{}",
                status, error_body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::ResponseError(e.to_string()))
    }
}

#[async_trait]
impl SqlGenerator for ReplicateProvider {
    async fn generate_sql(&self, question: &str, schema: &str) -> Result<String, LlmError> {
        let prompt = self.prepare_prompt(question, schema);

        info!("Submitting prediction with model version: {}", self.version);
        let mut prediction = self.create_prediction(prompt).await?;

        // The polling URL from the create response stays valid for the
        // whole life of the job.
        let poll_url = prediction
            .urls
            .as_ref()
            .map(|urls| urls.get.clone())
            .ok_or_else(|| {
                LlmError::ResponseError("Prediction response is missing a polling URL".to_string())
            })?;

        for attempt in 0..self.poll_attempts {
            debug!(
                "Prediction status after {} polls: {}",
                attempt, prediction.status
            );

            match prediction.status.as_str() {
                "succeeded" => {
                    let output = prediction.output.as_ref().ok_or_else(|| {
                        LlmError::ResponseError(
                            "Prediction succeeded but returned no output".to_string(),
                        )
                    })?;
                    return Ok(join_output(output));
                }
                "failed" | "canceled" => {
                    let detail = prediction
                        .error
                        .as_ref()
                        .map(|e| format!(": {}", e))
                        .unwrap_or_default();
                    return Err(LlmError::ResponseError(format!(
                        "Prediction ended with status '{}'{}",
                        prediction.status, detail
                    )));
                }
                _ => {}
            }

            tokio::time::sleep(self.poll_interval).await;
            prediction = self.fetch_prediction(&poll_url).await?;
        }

        Err(LlmError::Timeout(format!(
            "Prediction did not reach a terminal state after {} polls",
            self.poll_attempts
        )))
    }
}

// Replicate streams output as a list of text fragments
fn join_output(output: &serde_json::Value) -> String {
    match output {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Array(fragments) => fragments
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}
