use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use dash_wiz::config::{AppConfig, CliArgs};
use dash_wiz::llm::LlmManager;
use dash_wiz::util::logging::init_tracing;
use dash_wiz::web;
use dash_wiz::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_tracing();

    // Parse command line arguments
    let args = CliArgs::parse();

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!("DASH-Wiz backend service starting");

    // Resolve the provider once; a failed model load is fatal
    info!(
        "Initializing LLM manager with provider: {}",
        config.llm.provider
    );
    let llm_manager = match LlmManager::new(&config.llm) {
        Ok(manager) => manager,
        Err(e) => {
            error!("Failed to initialize LLM provider: {}", e);
            return Err(e.into());
        }
    };

    // Create application state
    let app_state = Arc::new(AppState::new(config.clone(), llm_manager));

    // Start the web server
    info!(
        "Starting DASH-Wiz server on {}:{}",
        config.web.host, config.web.port
    );
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(std::io::Error::other(e.to_string()).into());
        }
    }

    Ok(())
}
