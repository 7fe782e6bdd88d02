use clap::Parser;
use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub provider: String, // "local", "remote_http", or "remote_job"
    pub model: String,    // local directory or Hugging Face repo id
    pub disabled: bool,
    pub remote_url: Option<String>,
    pub remote_auth_header: Option<String>,
    pub remote_auth_token: Option<String>,
    pub job_api_url: String,
    pub job_api_token: Option<String>,
    pub job_model_version: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub web: WebConfig,
    pub llm: LlmConfig,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        // Start with default configuration
        let mut config_builder = Config::builder()
            .set_default("web.host", "0.0.0.0")?
            .set_default("web.port", 8000_i64)?
            .set_default("web.cors_origins", vec!["http://localhost:5173".to_string()])?
            .set_default("llm.provider", "local")?
            .set_default("llm.model", "models/natural-sql-7b")?
            .set_default("llm.disabled", false)?
            .set_default("llm.job_api_url", "https://api.replicate.com/v1/predictions")?;

        // Add configuration from file if specified
        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            // Check for config in default locations
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/dash-wiz/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // Build the config
        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        // Override with environment variables if set
        config.apply_env();

        // Override with command line args if provided
        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }

        Ok(config)
    }

    // Environment variables keep the names of the original deployment scripts
    fn apply_env(&mut self) {
        if let Ok(host) = env::var("HOST") {
            self.web.host = host;
        }
        if let Ok(port) = env::var("PORT") {
            if let Ok(port) = port.parse() {
                self.web.port = port;
            }
        }
        if let Ok(origins) = env::var("CORS_ORIGINS") {
            self.web.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(provider) = env::var("MODEL_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Ok(model) = env::var("MODEL_PATH") {
            self.llm.model = model;
        }
        if let Ok(disabled) = env::var("MODEL_DISABLED") {
            self.llm.disabled = matches!(disabled.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(url) = env::var("REMOTE_URL") {
            self.llm.remote_url = Some(url);
        }
        if let Ok(header) = env::var("REMOTE_AUTH_HEADER") {
            self.llm.remote_auth_header = Some(header);
        }
        if let Ok(token) = env::var("REMOTE_AUTH_TOKEN") {
            self.llm.remote_auth_token = Some(token);
        }
        if let Ok(url) = env::var("REPLICATE_API_URL") {
            self.llm.job_api_url = url;
        }
        if let Ok(token) = env::var("REPLICATE_API_TOKEN") {
            self.llm.job_api_token = Some(token);
        }
        if let Ok(version) = env::var("REPLICATE_MODEL_VERSION") {
            self.llm.job_model_version = Some(version);
        }
    }
}

// Default implementation
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            web: WebConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                cors_origins: vec!["http://localhost:5173".to_string()],
            },
            llm: LlmConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: "models/natural-sql-7b".to_string(),
            disabled: false,
            remote_url: None,
            remote_auth_header: None,
            remote_auth_token: None,
            job_api_url: "https://api.replicate.com/v1/predictions".to_string(),
            job_api_token: None,
            job_model_version: None,
        }
    }
}
