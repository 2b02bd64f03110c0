//! Tabular Store - in-memory passenger table
//!
//! Loads the dataset once at startup and exposes read-only, typed access to
//! it. The held frame is never mutated; every consumer that needs a subset
//! works on a fresh filtered view.

use crate::error::{AgentError, Result};
use itertools::Itertools;
use polars::prelude::*;
use std::path::Path;
use tracing::info;

pub struct TabularStore {
    df: DataFrame,
}

impl TabularStore {
    /// Load the passenger table from a CSV file.
    pub fn load(path: &Path) -> Result<Self> {
        let df = LazyCsvReader::new(path)
            .with_infer_schema_length(Some(1000))
            .finish()
            .map_err(|e| AgentError::Table(format!("Failed to read {}: {}", path.display(), e)))?
            .collect()
            .map_err(|e| AgentError::Table(format!("Failed to collect {}: {}", path.display(), e)))?;

        info!(
            "Loaded passenger table: {} rows, {} columns",
            df.height(),
            df.width()
        );

        Ok(Self { df })
    }

    /// Wrap an already-built frame. Used by tests and embedders.
    pub fn from_dataframe(df: DataFrame) -> Self {
        Self { df }
    }

    /// Shared read-only view of the full table.
    pub fn frame(&self) -> &DataFrame {
        &self.df
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn numeric_columns(&self) -> Vec<String> {
        self.df
            .get_columns()
            .iter()
            .filter(|s| s.dtype().is_numeric())
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn is_numeric(&self, name: &str) -> bool {
        self.df
            .column(name)
            .map(|s| s.dtype().is_numeric())
            .unwrap_or(false)
    }

    /// First column (in native column order) whose lower-cased name appears
    /// as a substring of the lower-cased question.
    pub fn matching_column(&self, question: &str) -> Option<String> {
        self.column_names()
            .into_iter()
            .find(|c| question.contains(&c.to_lowercase()))
    }

    /// Like [`matching_column`], restricted to numeric columns.
    ///
    /// [`matching_column`]: Self::matching_column
    pub fn matching_numeric_column(&self, question: &str) -> Option<String> {
        self.numeric_columns()
            .into_iter()
            .find(|c| question.contains(&c.to_lowercase()))
    }

    /// Every column whose lower-cased name appears in the question,
    /// preserving native column order.
    pub fn matching_columns(&self, question: &str) -> Vec<String> {
        self.column_names()
            .into_iter()
            .filter(|c| question.contains(&c.to_lowercase()))
            .collect()
    }

    /// Per-value row counts for a column, nulls dropped. Ordered by count
    /// descending, then value ascending, so repeated calls are
    /// byte-identical.
    pub fn value_counts(&self, name: &str) -> Result<Vec<(String, u32)>> {
        let out = self
            .df
            .clone()
            .lazy()
            .filter(col(name).is_not_null())
            .group_by([col(name)])
            .agg([len().alias("count")])
            .sort_by_exprs(
                vec![col("count"), col(name)],
                SortMultipleOptions::default().with_order_descendings([true, false]),
            )
            .collect()
            .map_err(|e| AgentError::Polars(format!("Value counts failed for {}: {}", name, e)))?;

        let keys = out
            .column(name)
            .map_err(|e| AgentError::Polars(format!("Missing column {}: {}", name, e)))?;
        let counts = out
            .column("count")
            .and_then(|s| s.u32())
            .map_err(|e| AgentError::Polars(format!("Bad count column: {}", e)))?;

        let mut result = Vec::with_capacity(out.height());
        for i in 0..out.height() {
            let key = keys
                .get(i)
                .map_err(|e| AgentError::Polars(format!("Row {} unreadable: {}", i, e)))?;
            result.push((any_value_to_string(&key), counts.get(i).unwrap_or(0)));
        }
        Ok(result)
    }

    /// Mean of `value` per distinct value of `group`, nulls in the group key
    /// dropped. Ordered by group key ascending.
    pub fn group_mean(&self, group: &str, value: &str) -> Result<Vec<(String, f64)>> {
        let out = self
            .df
            .clone()
            .lazy()
            .filter(col(group).is_not_null())
            .group_by([col(group)])
            .agg([col(value).mean().alias("mean")])
            .sort_by_exprs(vec![col(group)], SortMultipleOptions::default())
            .collect()
            .map_err(|e| {
                AgentError::Polars(format!("Grouped mean of {} by {} failed: {}", value, group, e))
            })?;

        let keys = out
            .column(group)
            .map_err(|e| AgentError::Polars(format!("Missing column {}: {}", group, e)))?;
        let means = out
            .column("mean")
            .and_then(|s| s.f64())
            .map_err(|e| AgentError::Polars(format!("Bad mean column: {}", e)))?;

        let mut result = Vec::with_capacity(out.height());
        for i in 0..out.height() {
            let key = keys
                .get(i)
                .map_err(|e| AgentError::Polars(format!("Row {} unreadable: {}", i, e)))?;
            if let Some(mean) = means.get(i) {
                result.push((any_value_to_string(&key), mean));
            }
        }
        Ok(result)
    }

    pub fn column_mean(df: &DataFrame, name: &str) -> Result<Option<f64>> {
        let series = df
            .column(name)
            .map_err(|e| AgentError::Polars(format!("Missing column {}: {}", name, e)))?;
        Ok(series.mean())
    }

    pub fn column_max(df: &DataFrame, name: &str) -> Result<Option<f64>> {
        let series = df
            .column(name)
            .map_err(|e| AgentError::Polars(format!("Missing column {}: {}", name, e)))?;
        series
            .max::<f64>()
            .map_err(|e| AgentError::Polars(format!("Max of {} failed: {}", name, e)))
    }

    pub fn column_min(df: &DataFrame, name: &str) -> Result<Option<f64>> {
        let series = df
            .column(name)
            .map_err(|e| AgentError::Polars(format!("Missing column {}: {}", name, e)))?;
        series
            .min::<f64>()
            .map_err(|e| AgentError::Polars(format!("Min of {} failed: {}", name, e)))
    }

    /// Schema summary used for LLM prompt context.
    pub fn schema_summary(&self) -> String {
        self.df
            .get_columns()
            .iter()
            .map(|s| format!("  {}: {}", s.name(), s.dtype()))
            .join("\n")
    }
}

/// Render a cell value the way it appears in answers: strings bare, numbers
/// via their natural display form (so `80.0` renders as `80` and fractional
/// infant ages keep their fraction).
pub fn any_value_to_string(value: &AnyValue) -> String {
    match value {
        AnyValue::Null => String::new(),
        AnyValue::String(s) => (*s).to_string(),
        AnyValue::StringOwned(s) => s.to_string(),
        AnyValue::Boolean(b) => b.to_string(),
        AnyValue::Int8(v) => v.to_string(),
        AnyValue::Int16(v) => v.to_string(),
        AnyValue::Int32(v) => v.to_string(),
        AnyValue::Int64(v) => v.to_string(),
        AnyValue::UInt8(v) => v.to_string(),
        AnyValue::UInt16(v) => v.to_string(),
        AnyValue::UInt32(v) => v.to_string(),
        AnyValue::UInt64(v) => v.to_string(),
        AnyValue::Float32(v) => v.to_string(),
        AnyValue::Float64(v) => v.to_string(),
        other => format!("{}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> TabularStore {
        let df = df![
            "Pclass" => [3i64, 1, 3, 2, 3],
            "Sex" => ["male", "female", "female", "male", "male"],
            "Age" => [Some(22.0), Some(38.0), None, Some(54.0), Some(2.0)],
        ]
        .unwrap();
        TabularStore::from_dataframe(df)
    }

    #[test]
    fn value_counts_orders_by_count_then_key() {
        let counts = store().value_counts("Pclass").unwrap();
        assert_eq!(
            counts,
            vec![
                ("3".to_string(), 3),
                ("1".to_string(), 1),
                ("2".to_string(), 1)
            ]
        );
    }

    #[test]
    fn matching_column_uses_native_order() {
        let store = store();
        // "class" alone matches nothing; the full column name does.
        assert_eq!(store.matching_column("count by class"), None);
        assert_eq!(
            store.matching_column("count by pclass"),
            Some("Pclass".to_string())
        );
    }

    #[test]
    fn numeric_introspection() {
        let store = store();
        assert!(store.is_numeric("Age"));
        assert!(!store.is_numeric("Sex"));
        assert_eq!(store.numeric_columns(), vec!["Pclass", "Age"]);
    }

    #[test]
    fn scalar_aggregates_skip_nulls() {
        let store = store();
        let mean = TabularStore::column_mean(store.frame(), "Age").unwrap().unwrap();
        assert!((mean - 29.0).abs() < 1e-9);
        assert_eq!(
            TabularStore::column_max(store.frame(), "Age").unwrap(),
            Some(54.0)
        );
        assert_eq!(
            TabularStore::column_min(store.frame(), "Age").unwrap(),
            Some(2.0)
        );
    }
}
