//! Agent Service - orchestrates the answer tiers
//!
//! One pass per question, terminal on the first tier that produces a
//! result: validity guard, deterministic engine, visualization router, LLM
//! fallback. A tier's no-match output is the only signal to advance; there
//! is no backtracking.

use crate::deterministic::DeterministicEngine;
use crate::error::{AgentError, Result};
use crate::guard::QueryGuard;
use crate::llm::FallbackAgent;
use crate::metrics::ServiceMetrics;
use crate::render::ChartRenderer;
use crate::table::TabularStore;
use crate::visualization::VisualizationRouter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

pub const INVALID_QUERY_ANSWER: &str =
    "Please ask a valid question related to the Titanic dataset.";

/// Response envelope for one answered question.
///
/// Token counts and the hallucination flag are zero/false on every tier by
/// construction; real telemetry is not computed for the LLM path either.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReply {
    pub answer: String,
    pub chart: Option<String>,
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub hallucination_detected: bool,
}

impl AgentReply {
    fn text(answer: impl Into<String>) -> Self {
        Self::with_chart(answer.into(), None)
    }

    fn with_chart(answer: String, chart: Option<String>) -> Self {
        Self {
            answer,
            chart,
            tokens_input: 0,
            tokens_output: 0,
            hallucination_detected: false,
        }
    }
}

pub struct AgentService {
    store: Arc<TabularStore>,
    guard: QueryGuard,
    deterministic: DeterministicEngine,
    visualization: VisualizationRouter,
    fallback: Arc<dyn FallbackAgent>,
    metrics: ServiceMetrics,
}

impl AgentService {
    pub fn new(
        store: Arc<TabularStore>,
        renderer: Arc<dyn ChartRenderer>,
        fallback: Arc<dyn FallbackAgent>,
    ) -> Self {
        Self {
            guard: QueryGuard::new(),
            deterministic: DeterministicEngine::new(Arc::clone(&store)),
            visualization: VisualizationRouter::new(Arc::clone(&store), renderer),
            fallback,
            metrics: ServiceMetrics::new(),
            store,
        }
    }

    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    pub async fn run(&self, question: &str) -> Result<AgentReply> {
        let question = question.trim();
        let start = Instant::now();

        self.metrics.record_request(question);
        info!(query = question, "routing_start");

        let result = self.route(question).await;
        match &result {
            Ok(reply) => self
                .metrics
                .record_success(start.elapsed().as_secs_f64(), reply.chart.is_some()),
            Err(AgentError::Timeout) => {
                self.metrics.record_failure();
                error!(query = question, "llm_timeout");
            }
            Err(e) => {
                self.metrics.record_failure();
                error!(query = question, error = %e, "agent_failure");
            }
        }
        result
    }

    async fn route(&self, question: &str) -> Result<AgentReply> {
        if self.guard.is_invalid(question) {
            info!(query = question, "invalid_query_blocked");
            return Ok(AgentReply::text(INVALID_QUERY_ANSWER));
        }

        if let Some(answer) = self.deterministic.handle(question)? {
            info!(query = question, "deterministic_hit");
            return Ok(AgentReply::text(answer));
        }

        if self.visualization.is_visual_request(question) {
            info!(query = question, "visualization_hit");
            let (answer, chart) = self.visualization.generate(question);
            return Ok(AgentReply::with_chart(answer, chart));
        }

        info!(query = question, "llm_routing");
        let answer = self.fallback.answer(question, &self.store).await?;
        Ok(AgentReply::text(answer))
    }
}
