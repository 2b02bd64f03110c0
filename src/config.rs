use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration, read from environment variables (optionally via a
/// `.env` file).
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the fallback LLM provider.
    pub api_key: String,

    /// Chat model used by the fallback tier.
    pub model: String,

    /// Base URL of the OpenAI-compatible chat completions API.
    pub llm_base_url: String,

    /// Upper bound on a single fallback call.
    pub llm_timeout: Duration,

    /// Path to the passenger CSV.
    pub data_path: PathBuf,

    /// Address the HTTP server binds to.
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let timeout_secs = std::env::var("LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        Self {
            api_key: std::env::var("GROQ_API_KEY").unwrap_or_else(|_| "dummy-api-key".to_string()),
            model: std::env::var("MODEL_NAME").unwrap_or_else(|_| "llama-3.1-8b-instant".to_string()),
            llm_base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string()),
            llm_timeout: Duration::from_secs(timeout_secs),
            data_path: PathBuf::from(
                std::env::var("TITANIC_DATA_PATH").unwrap_or_else(|_| "data/titanic.csv".to_string()),
            ),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        }
    }
}
