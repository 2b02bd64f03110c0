//! Deterministic Query Engine
//!
//! Pattern-matches a question against the passenger table and either
//! computes an exact answer or reports no-match so the caller can try the
//! next tier. Both the filter keywords and the answer patterns live in
//! explicit ordered tables: evaluation order is part of the contract, since
//! the phrase sets overlap ("how many passengers embarked" must resolve as
//! an embarked count, not a plain total).

use crate::error::{AgentError, Result};
use crate::table::TabularStore;
use itertools::Itertools;
use polars::prelude::*;
use std::sync::Arc;
use tracing::debug;

/// Conjunction of column constraints detected from question tokens.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FilterSet {
    pub sex: Option<&'static str>,
    pub pclass: Option<i64>,
    pub survived: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
enum FilterRule {
    Sex(&'static str),
    Pclass(i64),
    Survived(i64),
}

/// Keyword-to-filter table, applied in order; a later rule overwrites an
/// earlier one for the same column (last write wins).
const FILTER_RULES: &[(&str, FilterRule)] = &[
    ("male", FilterRule::Sex("male")),
    ("female", FilterRule::Sex("female")),
    ("first", FilterRule::Pclass(1)),
    ("1st", FilterRule::Pclass(1)),
    ("second", FilterRule::Pclass(2)),
    ("2nd", FilterRule::Pclass(2)),
    ("third", FilterRule::Pclass(3)),
    ("3rd", FilterRule::Pclass(3)),
    ("survived", FilterRule::Survived(1)),
    ("died", FilterRule::Survived(0)),
    ("dead", FilterRule::Survived(0)),
];

impl FilterSet {
    pub fn detect(tokens: &[&str]) -> Self {
        let mut set = FilterSet::default();
        for (keyword, rule) in FILTER_RULES {
            if tokens.contains(keyword) {
                match *rule {
                    FilterRule::Sex(v) => set.sex = Some(v),
                    FilterRule::Pclass(v) => set.pclass = Some(v),
                    FilterRule::Survived(v) => set.survived = Some(v),
                }
            }
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.sex.is_none() && self.pclass.is_none() && self.survived.is_none()
    }

    /// Whether a non-gender constraint (class or survival) is present.
    pub fn has_structured(&self) -> bool {
        self.pclass.is_some() || self.survived.is_some()
    }

    /// Produce a fresh filtered view; the input frame is never mutated.
    pub fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut lf = df.clone().lazy();
        if let Some(sex) = self.sex {
            lf = lf.filter(col("Sex").eq(lit(sex)));
        }
        if let Some(pclass) = self.pclass {
            lf = lf.filter(col("Pclass").eq(lit(pclass)));
        }
        if let Some(survived) = self.survived {
            lf = lf.filter(col("Survived").eq(lit(survived)));
        }
        lf.collect()
            .map_err(|e| AgentError::Polars(format!("Filter failed: {}", e)))
    }
}

/// Lower-cased question plus everything the pattern handlers need.
struct QueryContext<'a> {
    q: &'a str,
    filters: FilterSet,
    view: DataFrame,
    store: &'a TabularStore,
}

type PatternFn = for<'a, 'b> fn(&'a QueryContext<'b>) -> Result<Option<String>>;

/// Answer patterns in priority order; the first to produce an answer wins.
const PATTERNS: &[(&str, PatternFn)] = &[
    ("embarked_count", embarked_count),
    ("grouped_count", grouped_count),
    ("total_count", total_count),
    ("filtered_count", filtered_count),
    ("filtered_percentage", filtered_percentage),
    ("gender_percentage", gender_percentage),
    ("average", average),
    ("maximum", maximum),
    ("minimum", minimum),
    ("survival_rate_by", survival_rate_by),
    ("highest_survival_rate", highest_survival_rate),
    ("lowest_survival_rate", lowest_survival_rate),
    ("oldest", oldest),
    ("youngest", youngest),
];

pub struct DeterministicEngine {
    store: Arc<TabularStore>,
}

impl DeterministicEngine {
    pub fn new(store: Arc<TabularStore>) -> Self {
        Self { store }
    }

    /// Returns `None` when no pattern matches; that is the no-match
    /// sentinel, not an error.
    pub fn handle(&self, question: &str) -> Result<Option<String>> {
        let q = question.to_lowercase().trim().to_string();
        let tokens: Vec<&str> = q
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| matches!(c, ',' | '?' | '!' | '.')))
            .collect();

        let filters = FilterSet::detect(&tokens);
        let view = filters.apply(self.store.frame())?;
        let ctx = QueryContext {
            q: &q,
            filters,
            view,
            store: &self.store,
        };

        for (name, pattern) in PATTERNS {
            if let Some(answer) = pattern(&ctx)? {
                debug!(pattern = name, "deterministic pattern matched");
                return Ok(Some(answer));
            }
        }
        Ok(None)
    }
}

fn count_phrase(q: &str) -> bool {
    q.contains("how many") || q.contains("number")
}

fn embarked_count(ctx: &QueryContext) -> Result<Option<String>> {
    if !(ctx.q.contains("embarked") && count_phrase(ctx.q)) {
        return Ok(None);
    }
    let counts = ctx.store.value_counts("Embarked")?;
    let lines = counts
        .iter()
        .map(|(port, n)| format!("{}: {}", port, n))
        .join("\n");
    Ok(Some(format!(
        "Passengers embarked from each port:\n{}",
        lines
    )))
}

fn grouped_count(ctx: &QueryContext) -> Result<Option<String>> {
    if !(ctx.q.contains("how many") && ctx.q.contains("by")) {
        return Ok(None);
    }
    let Some(column) = ctx.store.matching_column(ctx.q) else {
        return Ok(None);
    };
    let counts = ctx.store.value_counts(&column)?;
    let lines = counts
        .iter()
        .map(|(value, n)| format!("{}: {}", value, n))
        .join("\n");
    Ok(Some(format!("Passenger count by {}:\n{}", column, lines)))
}

fn total_count(ctx: &QueryContext) -> Result<Option<String>> {
    if !(ctx.q.contains("how many passengers") && ctx.filters.is_empty()) {
        return Ok(None);
    }
    Ok(Some(format!(
        "There were {} passengers in total.",
        ctx.store.height()
    )))
}

fn filtered_count(ctx: &QueryContext) -> Result<Option<String>> {
    if !(count_phrase(ctx.q) && !ctx.filters.is_empty()) {
        return Ok(None);
    }
    Ok(Some(format!(
        "There were {} passengers matching the criteria.",
        ctx.view.height()
    )))
}

fn filtered_percentage(ctx: &QueryContext) -> Result<Option<String>> {
    if !(ctx.q.contains("percentage") && ctx.filters.has_structured()) {
        return Ok(None);
    }
    let pct = (ctx.view.height() as f64 / ctx.store.height() as f64) * 100.0;
    Ok(Some(format!(
        "{:.2}% of passengers match the given criteria.",
        pct
    )))
}

fn gender_percentage(ctx: &QueryContext) -> Result<Option<String>> {
    if !ctx.q.contains("percentage") {
        return Ok(None);
    }
    // "female" is checked first: every occurrence of "female" also contains
    // "male" as a substring.
    let gender = if ctx.q.contains("female") {
        "female"
    } else if ctx.q.contains("male") {
        "male"
    } else {
        return Ok(None);
    };
    let only_gender = FilterSet {
        sex: Some(gender),
        ..FilterSet::default()
    };
    let count = only_gender.apply(ctx.store.frame())?.height();
    let pct = (count as f64 / ctx.store.height() as f64) * 100.0;
    Ok(Some(format!("{:.2}% of passengers were {}.", pct, gender)))
}

fn average(ctx: &QueryContext) -> Result<Option<String>> {
    if !(ctx.q.contains("average") || ctx.q.contains("mean")) {
        return Ok(None);
    }
    let Some(column) = ctx.store.matching_numeric_column(ctx.q) else {
        return Ok(None);
    };
    let Some(avg) = TabularStore::column_mean(&ctx.view, &column)? else {
        return Ok(None);
    };
    Ok(Some(format!("The average {} was {:.2}.", column, avg)))
}

fn maximum(ctx: &QueryContext) -> Result<Option<String>> {
    if !(ctx.q.contains("maximum") || ctx.q.contains("max")) {
        return Ok(None);
    }
    let Some(column) = ctx.store.matching_numeric_column(ctx.q) else {
        return Ok(None);
    };
    let Some(value) = TabularStore::column_max(&ctx.view, &column)? else {
        return Ok(None);
    };
    Ok(Some(format!("The maximum {} was {}.", column, value)))
}

fn minimum(ctx: &QueryContext) -> Result<Option<String>> {
    if !(ctx.q.contains("minimum") || ctx.q.contains("min")) {
        return Ok(None);
    }
    let Some(column) = ctx.store.matching_numeric_column(ctx.q) else {
        return Ok(None);
    };
    let Some(value) = TabularStore::column_min(&ctx.view, &column)? else {
        return Ok(None);
    };
    Ok(Some(format!("The minimum {} was {}.", column, value)))
}

fn survival_rate_by(ctx: &QueryContext) -> Result<Option<String>> {
    if !(ctx.q.contains("survival rate") && ctx.q.contains("by")) {
        return Ok(None);
    }
    let Some(column) = ctx.store.matching_column(ctx.q) else {
        return Ok(None);
    };
    let rates = ctx.store.group_mean(&column, "Survived")?;
    let lines = rates
        .iter()
        .map(|(value, rate)| format!("{}: {:.2}%", value, rate * 100.0))
        .join("\n");
    Ok(Some(format!("Survival rate by {}:\n{}", column, lines)))
}

fn class_survival_rates(ctx: &QueryContext) -> Result<Vec<(String, f64)>> {
    ctx.store.group_mean("Pclass", "Survived")
}

fn highest_survival_rate(ctx: &QueryContext) -> Result<Option<String>> {
    if !(ctx.q.contains("highest") && ctx.q.contains("survival rate")) {
        return Ok(None);
    }
    let rates = class_survival_rates(ctx)?;
    // Keys come back ascending, so a strict comparison keeps the lowest
    // class on ties.
    let Some((class, rate)) = rates
        .into_iter()
        .fold(None::<(String, f64)>, |best, candidate| match best {
            Some(b) if candidate.1 <= b.1 => Some(b),
            _ => Some(candidate),
        })
    else {
        return Ok(None);
    };
    Ok(Some(format!(
        "Class {} had the highest survival rate at {:.2}%.",
        class,
        rate * 100.0
    )))
}

fn lowest_survival_rate(ctx: &QueryContext) -> Result<Option<String>> {
    if !(ctx.q.contains("lowest") && ctx.q.contains("survival rate")) {
        return Ok(None);
    }
    let rates = class_survival_rates(ctx)?;
    let Some((class, rate)) = rates
        .into_iter()
        .fold(None::<(String, f64)>, |best, candidate| match best {
            Some(b) if candidate.1 >= b.1 => Some(b),
            _ => Some(candidate),
        })
    else {
        return Ok(None);
    };
    Ok(Some(format!(
        "Class {} had the lowest survival rate at {:.2}%.",
        class,
        rate * 100.0
    )))
}

fn oldest(ctx: &QueryContext) -> Result<Option<String>> {
    if !ctx.q.contains("oldest") {
        return Ok(None);
    }
    let Some(age) = TabularStore::column_max(&ctx.view, "Age")? else {
        return Ok(None);
    };
    Ok(Some(format!("The oldest passenger was {} years old.", age)))
}

fn youngest(ctx: &QueryContext) -> Result<Option<String>> {
    if !ctx.q.contains("youngest") {
        return Ok(None);
    }
    let Some(age) = TabularStore::column_min(&ctx.view, "Age")? else {
        return Ok(None);
    };
    Ok(Some(format!("The youngest passenger was {} years old.", age)))
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn engine() -> DeterministicEngine {
        DeterministicEngine::new(fixture())
    }

    fn answer(question: &str) -> String {
        engine().handle(question).unwrap().unwrap()
    }

    #[test]
    fn total_count_without_filters() {
        assert_eq!(
            answer("How many passengers?"),
            "There were 10 passengers in total."
        );
    }

    #[test]
    fn filtered_count_applies_all_filters_conjunctively() {
        assert_eq!(
            answer("How many male passengers survived?"),
            "There were 1 passengers matching the criteria."
        );
    }

    #[test]
    fn contradictory_gender_tokens_keep_the_last_rule() {
        assert_eq!(
            answer("How many male or female passengers survived?"),
            "There were 4 passengers matching the criteria."
        );
    }

    #[test]
    fn gender_percentage_shortcut_beats_filtered_percentage() {
        assert_eq!(
            answer("What percentage of passengers were female?"),
            "40.00% of passengers were female."
        );
        assert_eq!(
            answer("What percentage of passengers were male?"),
            "60.00% of passengers were male."
        );
    }

    #[test]
    fn structured_filters_take_the_percentage_path() {
        assert_eq!(
            answer("What percentage of passengers survived?"),
            "50.00% of passengers match the given criteria."
        );
        assert_eq!(
            answer("What percentage of female passengers survived?"),
            "40.00% of passengers match the given criteria."
        );
    }

    #[test]
    fn average_uses_first_matching_numeric_column() {
        assert_eq!(answer("What was the mean fare?"), "The average Fare was 27.41.");
        // "average" itself contains "age", so Age wins the column scan.
        assert_eq!(
            answer("What was the average fare?"),
            "The average Age was 31.11."
        );
    }

    #[test]
    fn average_respects_filters() {
        assert_eq!(
            answer("What was the mean fare of female passengers?"),
            "The average Fare was 40.59."
        );
    }

    #[test]
    fn extremes_render_raw_values() {
        assert_eq!(
            answer("What was the maximum fare?"),
            "The maximum Fare was 71.28."
        );
        assert_eq!(
            answer("What was the minimum fare?"),
            "The minimum Fare was 7.25."
        );
    }

    #[test]
    fn embarked_count_wins_over_total_count() {
        assert_eq!(
            answer("How many passengers embarked from each port?"),
            "Passengers embarked from each port:\nS: 6\nC: 2\nQ: 1"
        );
    }

    #[test]
    fn grouped_count_by_column() {
        assert_eq!(
            answer("How many passengers by sex?"),
            "Passenger count by Sex:\nmale: 6\nfemale: 4"
        );
    }

    #[test]
    fn survival_rate_by_column() {
        assert_eq!(
            answer("What was the survival rate by sex?"),
            "Survival rate by Sex:\nfemale: 100.00%\nmale: 16.67%"
        );
    }

    #[test]
    fn highest_and_lowest_survival_rate_by_class() {
        assert_eq!(
            answer("What was the highest survival rate by class?"),
            "Class 1 had the highest survival rate at 100.00%."
        );
        assert_eq!(
            answer("What was the lowest survival rate by class?"),
            "Class 2 had the lowest survival rate at 33.33%."
        );
    }

    #[test]
    fn oldest_and_youngest() {
        assert_eq!(
            answer("Who was the oldest passenger?"),
            "The oldest passenger was 62 years old."
        );
        assert_eq!(
            answer("Who was the youngest passenger?"),
            "The youngest passenger was 2 years old."
        );
    }

    #[test]
    fn age_extremes_respect_filters() {
        assert_eq!(
            answer("Who was the oldest female passenger?"),
            "The oldest passenger was 38 years old."
        );
    }

    #[test]
    fn fractional_ages_keep_their_fraction() {
        let df = df![
            "Survived" => [1i64, 0],
            "Pclass" => [3i64, 3],
            "Sex" => ["male", "female"],
            "Age" => [0.42, 30.0],
        ]
        .unwrap();
        let engine = DeterministicEngine::new(Arc::new(TabularStore::from_dataframe(df)));
        assert_eq!(
            engine.handle("Who was the youngest passenger?").unwrap().unwrap(),
            "The youngest passenger was 0.42 years old."
        );
    }

    #[test]
    fn unmatched_questions_return_the_no_match_sentinel() {
        assert_eq!(engine().handle("Tell me about the captain").unwrap(), None);
    }

    #[test]
    fn answers_are_idempotent() {
        let engine = engine();
        let first = engine.handle("What was the highest survival rate by class?").unwrap();
        let second = engine.handle("What was the highest survival rate by class?").unwrap();
        assert_eq!(first, second);
    }
}
