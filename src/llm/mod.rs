pub mod hub;
pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;
use std::error::Error;
use std::fmt;
use tracing::info;

#[derive(Debug)]
pub enum LlmError {
    ConnectionError(String),
    ResponseError(String),
    ConfigError(String),
    Unavailable(String),
    Timeout(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::ConnectionError(msg) => write!(f, "LLM connection error: {}", msg),
            LlmError::ResponseError(msg) => write!(f, "LLM response error: {}", msg),
            LlmError::ConfigError(msg) => write!(f, "LLM configuration error: {}", msg),
            LlmError::Unavailable(msg) => write!(f, "LLM backend unavailable: {}", msg),
            LlmError::Timeout(msg) => write!(f, "LLM timeout: {}", msg),
        }
    }
}

impl Error for LlmError {}

#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate_sql(&self, question: &str, schema: &str) -> Result<String, LlmError>;
}

/// Owns the provider selected at startup. The choice is made exactly once;
/// switching providers requires a restart.
pub struct LlmManager {
    generator: Option<Box<dyn SqlGenerator + Send + Sync>>,
    provider: String,
    model: String,
    device: String,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.disabled {
            info!("MODEL_DISABLED is set - skipping model load, /generate-sql is disabled here");
            return Ok(Self {
                generator: None,
                provider: config.provider.clone(),
                model: "disabled".to_string(),
                device: "disabled".to_string(),
            });
        }

        let (generator, model, device): (Box<dyn SqlGenerator + Send + Sync>, String, String) =
            match config.provider.as_str() {
                "local" => {
                    let provider = providers::local::LocalLlmProvider::new(config)?;
                    let model = provider.model_dir().display().to_string();
                    let device = provider.device_tag().to_string();
                    (Box::new(provider), model, device)
                }
                "remote_http" => {
                    let provider = providers::remote::RemoteLlmProvider::new(config)?;
                    (Box::new(provider), config.model.clone(), "remote".to_string())
                }
                "remote_job" => {
                    let provider = providers::replicate::ReplicateProvider::new(config)?;
                    let model = provider.model_version().to_string();
                    (Box::new(provider), model, "remote".to_string())
                }
                other => {
                    return Err(LlmError::ConfigError(format!(
                        "Unsupported LLM provider: {}",
                        other
                    )))
                }
            };

        Ok(Self::with_generator(generator, &config.provider, &model, &device))
    }

    /// Builds a manager around an already-constructed generator. Used by
    /// `new` and by callers injecting their own backend.
    pub fn with_generator(
        generator: Box<dyn SqlGenerator + Send + Sync>,
        provider: &str,
        model: &str,
        device: &str,
    ) -> Self {
        Self {
            generator: Some(generator),
            provider: provider.to_string(),
            model: model.to_string(),
            device: device.to_string(),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn is_loaded(&self) -> bool {
        self.generator.is_some()
    }

    pub async fn generate_sql(&self, question: &str, schema: &str) -> Result<String, LlmError> {
        match &self.generator {
            Some(generator) => generator.generate_sql(question, schema).await,
            None => Err(LlmError::Unavailable(
                "Model is disabled on this deployment. Run the local model service and call it from the client."
                    .to_string(),
            )),
        }
    }
}
