use async_trait::async_trait;
use polars::prelude::*;
use std::sync::Arc;
use titanic_agent::agent_service::{AgentService, INVALID_QUERY_ANSWER};
use titanic_agent::error::{AgentError, Result};
use titanic_agent::llm::FallbackAgent;
use titanic_agent::render::{ChartRenderer, ChartSpec};
use titanic_agent::table::TabularStore;

fn fixture() -> Arc<TabularStore> {
    let df = df![
        "PassengerId" => [1i64, 2, 3, 4, 5, 6, 7, 8, 9, 10],
        "Survived" => [0i64, 1, 1, 1, 0, 0, 0, 1, 1, 0],
        "Pclass" => [3i64, 1, 3, 1, 3, 3, 2, 2, 3, 2],
        "Sex" => [
            "male", "female", "female", "female", "male",
            "male", "male", "male", "female", "male",
        ],
        "Age" => [
            Some(22.0), Some(38.0), Some(26.0), Some(35.0), None,
            Some(54.0), Some(2.0), Some(27.0), Some(14.0), Some(62.0),
        ],
        "Fare" => [7.25, 71.28, 7.92, 53.1, 8.05, 51.86, 21.07, 13.0, 30.07, 10.5],
        "Embarked" => [
            Some("S"), Some("C"), Some("S"), Some("S"), Some("S"),
            Some("S"), Some("Q"), Some("S"), Some("C"), None,
        ],
    ]
    .unwrap();
    Arc::new(TabularStore::from_dataframe(df))
}

struct StubRenderer;

impl ChartRenderer for StubRenderer {
    fn render(&self, _spec: &ChartSpec) -> Result<Vec<u8>> {
        Ok(vec![1, 2, 3])
    }
}

struct StubFallback(&'static str);

#[async_trait]
impl FallbackAgent for StubFallback {
    async fn answer(&self, _question: &str, _table: &TabularStore) -> Result<String> {
        Ok(self.0.to_string())
    }
}

struct FailingFallback(fn() -> AgentError);

#[async_trait]
impl FallbackAgent for FailingFallback {
    async fn answer(&self, _question: &str, _table: &TabularStore) -> Result<String> {
        Err((self.0)())
    }
}

fn service_with(fallback: Arc<dyn FallbackAgent>) -> AgentService {
    AgentService::new(fixture(), Arc::new(StubRenderer), fallback)
}

/// A service whose fallback errors on contact, proving the earlier tiers
/// answered on their own.
fn service() -> AgentService {
    service_with(Arc::new(FailingFallback(|| {
        AgentError::Llm("fallback should not have been called".to_string())
    })))
}

#[tokio::test]
async fn guard_rejects_degenerate_questions() {
    let reply = service().run("hi").await.unwrap();
    assert_eq!(reply.answer, INVALID_QUERY_ANSWER);
    assert!(reply.chart.is_none());
    assert_eq!(reply.tokens_input, 0);
    assert_eq!(reply.tokens_output, 0);
    assert!(!reply.hallucination_detected);
}

#[tokio::test]
async fn lone_domain_keyword_is_still_rejected() {
    let reply = service().run("titanic").await.unwrap();
    assert_eq!(reply.answer, INVALID_QUERY_ANSWER);
}

#[tokio::test]
async fn deterministic_tier_answers_counts() {
    let reply = service().run("How many passengers?").await.unwrap();
    assert_eq!(reply.answer, "There were 10 passengers in total.");
    assert!(reply.chart.is_none());
    assert_eq!(reply.tokens_input, 0);
    assert_eq!(reply.tokens_output, 0);
    assert!(!reply.hallucination_detected);
}

#[tokio::test]
async fn deterministic_tier_applies_conjunctive_filters() {
    let reply = service()
        .run("How many male passengers survived?")
        .await
        .unwrap();
    assert_eq!(reply.answer, "There were 1 passengers matching the criteria.");
}

#[tokio::test]
async fn visualization_tier_returns_caption_and_chart() {
    let reply = service()
        .run("Show a scatter of Age and Fare")
        .await
        .unwrap();
    assert_eq!(reply.answer, "Here is the requested visualization.");
    assert_eq!(reply.chart.as_deref(), Some("AQID"));
    assert_eq!(reply.tokens_input, 0);
    assert_eq!(reply.tokens_output, 0);
    assert!(!reply.hallucination_detected);
}

#[tokio::test]
async fn visualization_failures_stay_in_band() {
    let reply = service().run("Plot a histogram of Sex").await.unwrap();
    assert_eq!(reply.answer, "Histogram requires numeric column.");
    assert!(reply.chart.is_none());
}

#[tokio::test]
async fn fallback_runs_only_when_all_tiers_decline() {
    let service = service_with(Arc::new(StubFallback("It sank in 1912.")));
    let reply = service
        .run("Why is the titanic so famous?")
        .await
        .unwrap();
    assert_eq!(reply.answer, "It sank in 1912.");
    assert!(reply.chart.is_none());
    assert_eq!(reply.tokens_input, 0);
    assert_eq!(reply.tokens_output, 0);
    assert!(!reply.hallucination_detected);
}

#[tokio::test]
async fn fallback_timeout_surfaces_as_504() {
    let service = service_with(Arc::new(FailingFallback(|| AgentError::Timeout)));
    let err = service
        .run("Why is the titanic so famous?")
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Timeout));
    assert_eq!(err.status_code(), 504);
}

#[tokio::test]
async fn fallback_failure_surfaces_as_500() {
    let service = service_with(Arc::new(FailingFallback(|| {
        AgentError::Llm("provider unreachable".to_string())
    })));
    let err = service
        .run("Why is the titanic so famous?")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn repeated_questions_get_byte_identical_answers() {
    let service = service();
    let first = service
        .run("What was the highest survival rate by class?")
        .await
        .unwrap();
    let second = service
        .run("What was the highest survival rate by class?")
        .await
        .unwrap();
    assert_eq!(first.answer, second.answer);
    assert_eq!(
        first.answer,
        "Class 1 had the highest survival rate at 100.00%."
    );
}

#[tokio::test]
async fn metrics_track_the_pipeline() {
    let service = service_with(Arc::new(FailingFallback(|| AgentError::Timeout)));

    service.run("How many passengers?").await.unwrap();
    service.run("Show a scatter of Age and Fare").await.unwrap();
    let _ = service.run("Why is the titanic so famous?").await;

    let snap = service.metrics().snapshot();
    assert_eq!(snap["total_requests"], 3);
    assert_eq!(snap["successful_requests"], 2);
    assert_eq!(snap["failed_requests"], 1);
    assert_eq!(snap["visualization_requests"], 1);
}
