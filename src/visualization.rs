//! Visualization Router
//!
//! Detects chart intent, picks a chart kind and target columns, and
//! delegates drawing to the renderer seam. Rendering failures never reach
//! the caller; they are converted into clarifying answers.

use crate::error::{AgentError, Result};
use crate::render::{ChartRenderer, ChartSpec};
use crate::table::TabularStore;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use polars::prelude::*;
use std::sync::Arc;
use tracing::warn;

/// Keywords that route a question to the visualization tier.
pub const VISUAL_KEYWORDS: &[&str] = &[
    "show",
    "plot",
    "chart",
    "graph",
    "scatter",
    "visualize",
    "draw",
    "display",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChartKind {
    Scatter,
    Pie,
    Bar,
    Histogram,
}

enum SpecFailure {
    NonNumericHistogram,
    Data(AgentError),
}

pub struct VisualizationRouter {
    store: Arc<TabularStore>,
    renderer: Arc<dyn ChartRenderer>,
}

impl VisualizationRouter {
    pub fn new(store: Arc<TabularStore>, renderer: Arc<dyn ChartRenderer>) -> Self {
        Self { store, renderer }
    }

    pub fn is_visual_request(&self, question: &str) -> bool {
        let q = question.to_lowercase();
        VISUAL_KEYWORDS.iter().any(|k| q.contains(k))
    }

    /// Returns a caption and, on success, a base64-encoded PNG. Every
    /// failure mode maps to a clarifying caption with no image.
    pub fn generate(&self, question: &str) -> (String, Option<String>) {
        let q = question.to_lowercase();

        let kind = if q.contains("scatter") {
            ChartKind::Scatter
        } else if q.contains("pie") {
            ChartKind::Pie
        } else if q.contains("bar") {
            ChartKind::Bar
        } else {
            ChartKind::Histogram
        };

        let columns = self.store.matching_columns(&q);
        if columns.is_empty() {
            return ("Specify a valid column.".to_string(), None);
        }

        let spec = match self.build_spec(kind, &columns) {
            Ok(spec) => spec,
            Err(SpecFailure::NonNumericHistogram) => {
                return ("Histogram requires numeric column.".to_string(), None);
            }
            Err(SpecFailure::Data(e)) => {
                warn!(error = %e, "chart data extraction failed");
                return ("Failed to generate chart.".to_string(), None);
            }
        };

        match self.renderer.render(&spec) {
            Ok(bytes) => (
                "Here is the requested visualization.".to_string(),
                Some(STANDARD.encode(bytes)),
            ),
            Err(e) => {
                warn!(error = %e, "chart rendering failed");
                ("Failed to generate chart.".to_string(), None)
            }
        }
    }

    /// A scatter kind without two detected columns falls through to the
    /// non-scatter arms on the first column, ending at the histogram
    /// default.
    fn build_spec(
        &self,
        kind: ChartKind,
        columns: &[String],
    ) -> std::result::Result<ChartSpec, SpecFailure> {
        if kind == ChartKind::Scatter && columns.len() >= 2 {
            let (x, y) = (&columns[0], &columns[1]);
            if !self.store.is_numeric(x) || !self.store.is_numeric(y) {
                return Err(SpecFailure::Data(AgentError::Render(format!(
                    "scatter needs numeric columns, got {} and {}",
                    x, y
                ))));
            }
            let points = self.numeric_pairs(x, y).map_err(SpecFailure::Data)?;
            return Ok(ChartSpec::Scatter {
                x_label: x.clone(),
                y_label: y.clone(),
                points,
            });
        }

        let column = &columns[0];
        match kind {
            ChartKind::Pie => Ok(ChartSpec::Pie {
                label: column.clone(),
                slices: self.count_pairs(column).map_err(SpecFailure::Data)?,
            }),
            ChartKind::Bar => Ok(ChartSpec::Bar {
                label: column.clone(),
                bars: self.count_pairs(column).map_err(SpecFailure::Data)?,
            }),
            _ => {
                if !self.store.is_numeric(column) {
                    return Err(SpecFailure::NonNumericHistogram);
                }
                Ok(ChartSpec::Histogram {
                    label: column.clone(),
                    values: self.numeric_values(column).map_err(SpecFailure::Data)?,
                })
            }
        }
    }

    fn count_pairs(&self, column: &str) -> Result<Vec<(String, f64)>> {
        Ok(self
            .store
            .value_counts(column)?
            .into_iter()
            .map(|(value, count)| (value, count as f64))
            .collect())
    }

    fn numeric_values(&self, column: &str) -> Result<Vec<f64>> {
        let df = self
            .store
            .frame()
            .clone()
            .lazy()
            .select([col(column).cast(DataType::Float64)])
            .drop_nulls(None)
            .collect()
            .map_err(|e| AgentError::Polars(format!("Column {} unreadable: {}", column, e)))?;
        let values = df
            .column(column)
            .and_then(|s| s.f64())
            .map_err(|e| AgentError::Polars(format!("Column {} not numeric: {}", column, e)))?;
        Ok(values.into_iter().flatten().collect())
    }

    fn numeric_pairs(&self, x: &str, y: &str) -> Result<Vec<(f64, f64)>> {
        let df = self
            .store
            .frame()
            .clone()
            .lazy()
            .select([
                col(x).cast(DataType::Float64),
                col(y).cast(DataType::Float64),
            ])
            .drop_nulls(None)
            .collect()
            .map_err(|e| AgentError::Polars(format!("Columns {}/{} unreadable: {}", x, y, e)))?;
        let xs = df
            .column(x)
            .and_then(|s| s.f64())
            .map_err(|e| AgentError::Polars(format!("Column {} not numeric: {}", x, e)))?;
        let ys = df
            .column(y)
            .and_then(|s| s.f64())
            .map_err(|e| AgentError::Polars(format!("Column {} not numeric: {}", y, e)))?;
        Ok(xs
            .into_iter()
            .zip(ys)
            .filter_map(|(a, b)| Some((a?, b?)))
            .collect())
    }
}
