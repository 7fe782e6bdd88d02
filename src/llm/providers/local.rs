use crate::config::LlmConfig;
use crate::llm::{hub, LlmError, SqlGenerator};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::mistral::{Config as MistralConfig, Model as Mistral};
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;
use tracing::{debug, info};

// Generation bounds carried over from the original deployment
const MAX_NEW_TOKENS: usize = 256;
const MAX_CONTEXT: usize = 1024;

pub struct LocalLlmProvider {
    model: Mistral,
    tokenizer: Tokenizer,
    device: Device,
    model_dir: PathBuf,
    eos_token: u32,
}

impl LocalLlmProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let model_dir = hub::ensure_model_present(&config.model)?;

        info!("Loading Natural-SQL model from: {}", model_dir.display());

        let tokenizer = Tokenizer::from_file(model_dir.join("tokenizer.json"))
            .map_err(|e| LlmError::ConfigError(format!("Failed to load tokenizer: {}", e)))?;
        info!("Tokenizer loaded successfully");

        let device = select_device()?;
        // BF16 needs CUDA; plain F32 on CPU
        let dtype = if device.is_cuda() { DType::BF16 } else { DType::F32 };

        let model_config: MistralConfig = {
            let raw = std::fs::read(model_dir.join("config.json"))
                .map_err(|e| LlmError::ConfigError(format!("Failed to read model config: {}", e)))?;
            serde_json::from_slice(&raw)
                .map_err(|e| LlmError::ConfigError(format!("Invalid model config: {}", e)))?
        };

        let filenames = safetensors_files(&model_dir)?;
        let model = {
            // Mmapped weights are read-only for the life of the process
            let vb = unsafe { VarBuilder::from_mmaped_safetensors(&filenames, dtype, &device) }
                .map_err(load_error)?;
            Mistral::new(&model_config, vb).map_err(load_error)?
        };
        info!("Model loaded successfully");

        let eos_token = tokenizer
            .token_to_id("</s>")
            .ok_or_else(|| LlmError::ConfigError("Tokenizer has no </s> token".to_string()))?;

        info!("Model ready on device: {}", device_name(&device).to_uppercase());

        Ok(Self {
            model,
            tokenizer,
            device,
            model_dir,
            eos_token,
        })
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn device_tag(&self) -> &'static str {
        device_name(&self.device)
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

    fn run_generation(&self, prompt: &str) -> Result<String, LlmError> {
        // Each request clones the model so concurrent generations own their
        // own kv-cache; the weights themselves are shared and never mutated.
        let mut model = self.model.clone();

        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| LlmError::ResponseError(format!("Tokenization failed: {}", e)))?;
        let mut tokens = encoding.get_ids().to_vec();
        debug!("Tokenization complete: {} prompt tokens", tokens.len());

        // Greedy decoding; the seed is irrelevant under ArgMax
        let mut logits_processor = LogitsProcessor::from_sampling(0, Sampling::ArgMax);

        for index in 0..MAX_NEW_TOKENS {
            if tokens.len() >= MAX_CONTEXT {
                break;
            }

            let context_size = if index > 0 { 1 } else { tokens.len() };
            let start_pos = tokens.len().saturating_sub(context_size);
            let input = Tensor::new(&tokens[start_pos..], &self.device)
                .map_err(generation_error)?
                .unsqueeze(0)
                .map_err(generation_error)?;

            let logits = model.forward(&input, start_pos).map_err(generation_error)?;
            let logits = logits
                .squeeze(0)
                .map_err(generation_error)?
                .squeeze(0)
                .map_err(generation_error)?
                .to_dtype(DType::F32)
                .map_err(generation_error)?;

            let next_token = logits_processor.sample(&logits).map_err(generation_error)?;
            tokens.push(next_token);

            if next_token == self.eos_token {
                break;
            }
        }
        debug!("Model generation complete: {} total tokens", tokens.len());

        // Decode the whole sequence, prompt included; the request handler
        // trims the echo when it extracts the SQL.
        self.tokenizer
            .decode(&tokens, true)
            .map_err(|e| LlmError::ResponseError(format!("Failed to decode output: {}", e)))
    }
}

#[async_trait]
impl SqlGenerator for LocalLlmProvider {
    async fn generate_sql(&self, question: &str, schema: &str) -> Result<String, LlmError> {
        let prompt = self.prepare_prompt(question, schema);
        debug!("Prompt length: {} characters", prompt.len());

        // Inference runs on the handling task and blocks it until the
        // generation finishes.
        self.run_generation(&prompt)
    }
}

fn select_device() -> Result<Device, LlmError> {
    if candle_core::utils::cuda_is_available() {
        Device::new_cuda(0).map_err(|e| LlmError::ConfigError(e.to_string()))
    } else {
        info!("CUDA not available; running the model on CPU");
        Ok(Device::Cpu)
    }
}

fn device_name(device: &Device) -> &'static str {
    if device.is_cuda() {
        "cuda"
    } else {
        "cpu"
    }
}

// Sharded checkpoints list their files in the index; single-file
// checkpoints ship one model.safetensors.
fn safetensors_files(model_dir: &Path) -> Result<Vec<PathBuf>, LlmError> {
    let index_path = model_dir.join("model.safetensors.index.json");
    if !index_path.exists() {
        return Ok(vec![model_dir.join("model.safetensors")]);
    }

    let filenames = hub::sharded_filenames(&index_path)?;
    Ok(filenames.iter().map(|f| model_dir.join(f)).collect())
}

fn load_error(err: candle_core::Error) -> LlmError {
    LlmError::ConfigError(format!("Failed to load model: {}", err))
}

fn generation_error(err: candle_core::Error) -> LlmError {
    LlmError::ResponseError(format!("Model generation failed: {}", err))
}
