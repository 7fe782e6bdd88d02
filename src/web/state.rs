use crate::config::AppConfig;
use crate::llm::LlmManager;

/// Shared application state for the web server.
///
/// Built once at startup and read-only afterwards; the manager owns the
/// provider selected from configuration.
pub struct AppState {
    pub config: AppConfig,
    pub llm: LlmManager,
}

impl AppState {
    pub fn new(config: AppConfig, llm: LlmManager) -> Self {
        Self { config, llm }
    }
}
