//! Service metrics
//!
//! In-process counters for the chat pipeline, exposed as a JSON snapshot on
//! the metrics endpoint.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

const LAST_QUERIES: usize = 5;

#[derive(Default)]
struct MetricsInner {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    visualization_requests: u64,
    total_response_time: f64,
    last_queries: VecDeque<String>,
}

#[derive(Clone, Default)]
pub struct ServiceMetrics {
    inner: Arc<Mutex<MetricsInner>>,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, question: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.total_requests += 1;
        if inner.last_queries.len() == LAST_QUERIES {
            inner.last_queries.pop_front();
        }
        inner.last_queries.push_back(question.to_string());
    }

    pub fn record_success(&self, response_time: f64, is_visual: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.successful_requests += 1;
        inner.total_response_time += response_time;
        if is_visual {
            inner.visualization_requests += 1;
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failed_requests += 1;
    }

    pub fn snapshot(&self) -> serde_json::Value {
        let inner = self.inner.lock().unwrap();
        let avg = if inner.successful_requests > 0 {
            inner.total_response_time / inner.successful_requests as f64
        } else {
            0.0
        };
        serde_json::json!({
            "total_requests": inner.total_requests,
            "successful_requests": inner.successful_requests,
            "failed_requests": inner.failed_requests,
            "visualization_requests": inner.visualization_requests,
            "average_response_time_seconds": (avg * 1000.0).round() / 1000.0,
            "last_5_queries": inner.last_queries.iter().collect::<Vec<_>>(),
        })
    }
}
