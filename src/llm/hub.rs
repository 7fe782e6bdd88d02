use crate::llm::LlmError;
use hf_hub::api::sync::Api;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

// Repo to fall back to when MODEL_PATH is a bare directory name
const DEFAULT_REPO: &str = "chatdb/natural-sql-7b";

/// Ensures the model weights are present locally, downloading them from the
/// Hugging Face Hub if needed. Returns the directory to load from.
///
/// A download failure is fatal to startup; there is no degraded mode.
pub fn ensure_model_present(model: &str) -> Result<PathBuf, LlmError> {
    let path = Path::new(model);
    if dir_is_populated(path) {
        info!("Using local model at: {}", path.display());
        return Ok(path.to_path_buf());
    }

    // A path containing a slash is taken as a HF repo id
    let repo_id = if model.contains('/') {
        model.to_string()
    } else {
        DEFAULT_REPO.to_string()
    };

    info!("Downloading model from HF Hub: {}", repo_id);

    let api = Api::new().map_err(|e| LlmError::ConfigError(e.to_string()))?;
    let repo = api.model(repo_id.clone());

    let tokenizer = repo
        .get("tokenizer.json")
        .map_err(|e| download_error(&repo_id, "tokenizer.json", e))?;
    repo.get("config.json")
        .map_err(|e| download_error(&repo_id, "config.json", e))?;

    // Sharded checkpoints list their files in the index; single-file
    // checkpoints ship one model.safetensors instead.
    match repo.get("model.safetensors.index.json") {
        Ok(index_path) => {
            for filename in sharded_filenames(&index_path)? {
                repo.get(&filename)
                    .map_err(|e| download_error(&repo_id, &filename, e))?;
            }
        }
        Err(_) => {
            repo.get("model.safetensors")
                .map_err(|e| download_error(&repo_id, "model.safetensors", e))?;
        }
    }

    let snapshot_dir = tokenizer
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| LlmError::ConfigError("Downloaded snapshot has no parent directory".to_string()))?;

    info!("Model snapshot ready at: {}", snapshot_dir.display());
    Ok(snapshot_dir)
}

fn dir_is_populated(path: &Path) -> bool {
    path.is_dir()
        && path
            .read_dir()
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
}

// Collects the distinct shard names referenced by the weight map
pub(crate) fn sharded_filenames(index_path: &Path) -> Result<Vec<String>, LlmError> {
    let raw = std::fs::read(index_path)
        .map_err(|e| LlmError::ConfigError(format!("Could not read safetensors index: {}", e)))?;
    let json: serde_json::Value = serde_json::from_slice(&raw)
        .map_err(|e| LlmError::ConfigError(format!("Invalid safetensors index: {}", e)))?;

    let weight_map = match json.get("weight_map") {
        Some(serde_json::Value::Object(map)) => map,
        _ => {
            return Err(LlmError::ConfigError(
                "Safetensors index has no weight map".to_string(),
            ))
        }
    };

    let mut filenames = HashSet::new();
    for value in weight_map.values() {
        if let Some(file) = value.as_str() {
            filenames.insert(file.to_string());
        }
    }

    Ok(filenames.into_iter().collect())
}

fn download_error(repo_id: &str, file: &str, err: hf_hub::api::sync::ApiError) -> LlmError {
    LlmError::ConfigError(format!(
        "Could not download {} from {}: {}",
        file, repo_id, err
    ))
}
