use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Table error: {0}")]
    Table(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Request timeout.")]
    Timeout,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl AgentError {
    /// HTTP-equivalent status code for faults that reach the external layer.
    pub fn status_code(&self) -> u16 {
        match self {
            AgentError::Timeout => 504,
            AgentError::InvalidRequest(_) => 422,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
