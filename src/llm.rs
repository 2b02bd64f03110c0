//! LLM fallback tier
//!
//! Invoked only when the guard, the deterministic engine, and the
//! visualization router all decline a question. The client talks to an
//! OpenAI-compatible chat completions endpoint and embeds the dataframe
//! context in the prompt. Calls are bounded by a timeout and never retried.

use crate::config::Config;
use crate::error::{AgentError, Result};
use crate::table::TabularStore;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

const SYSTEM_PROMPT: &str = "You are a data analyst answering questions about the Titanic \
passenger dataset. Use only the provided dataframe context. Reply with a concise plain-text \
answer, no markdown.";

/// Capability the orchestrator consumes for the fallback tier.
#[async_trait]
pub trait FallbackAgent: Send + Sync {
    async fn answer(&self, question: &str, table: &TabularStore) -> Result<String>;
}

pub struct LlmClient {
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String, timeout: Duration) -> Self {
        Self {
            api_key,
            model,
            base_url,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.api_key.clone(),
            config.model.clone(),
            config.llm_base_url.clone(),
            config.llm_timeout,
        )
    }

    fn dataframe_context(table: &TabularStore) -> String {
        format!(
            "The dataframe has {} rows.\nColumns:\n{}\n\nFirst rows:\n{}",
            table.height(),
            table.schema_summary(),
            table.frame().head(Some(5))
        )
    }

    async fn call_llm(&self, prompt: &str) -> Result<String> {
        let client = reqwest::Client::new();
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.0,
        });

        let response = client
            .post(&format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Llm(format!("LLM API call failed: {}", e)))?;

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AgentError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AgentError::Llm("No content in LLM response".to_string()))?;

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl FallbackAgent for LlmClient {
    async fn answer(&self, question: &str, table: &TabularStore) -> Result<String> {
        info!(query = question, "llm_start");

        let prompt = format!(
            "{}\n\nQuestion: {}",
            Self::dataframe_context(table),
            question
        );

        let answer = tokio::time::timeout(self.timeout, self.call_llm(&prompt))
            .await
            .map_err(|_| AgentError::Timeout)??;

        info!(query = question, "llm_finish");
        Ok(answer)
    }
}
