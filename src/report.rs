use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::cohort::Cohort;
use crate::cohort_list::CohortList;
use crate::data::model::Value;

/// Flat, serialisable snapshot of one cohort's stats.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortSummary {
    pub name: String,
    pub filters: Vec<String>,
    pub total: usize,
    pub error_count: usize,
    pub error_rate: f64,
    pub accuracy: f64,
    pub count_by_label: BTreeMap<String, usize>,
    pub count_by_prediction: BTreeMap<String, usize>,
}

impl CohortSummary {
    pub fn from_cohort(cohort: &Cohort) -> Self {
        let stats = cohort.stats();
        CohortSummary {
            name: cohort.name().to_string(),
            filters: cohort
                .filters()
                .iter()
                .map(|f| serde_json::to_string(f).unwrap_or_else(|e| format!("<{e}>")))
                .collect(),
            total: stats.total,
            error_count: stats.error_count,
            error_rate: stats.error_rate(),
            accuracy: stats.accuracy(),
            count_by_label: stringify_keys(&stats.count_by_label),
            count_by_prediction: stringify_keys(&stats.count_by_prediction),
        }
    }
}

fn stringify_keys(counts: &BTreeMap<Value, usize>) -> BTreeMap<String, usize> {
    counts.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

impl fmt::Display for CohortSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        for filter in &self.filters {
            writeln!(f, "  filter: {filter}")?;
        }
        writeln!(
            f,
            "  rows: {}  errors: {} ({:.1}%)  accuracy: {:.3}",
            self.total,
            self.error_count,
            self.error_rate * 100.0,
            self.accuracy
        )?;
        let labels: Vec<String> = self
            .count_by_label
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        write!(f, "  labels: {}", labels.join(", "))
    }
}

/// Summaries for every cohort, in list order.
pub fn summarize(list: &CohortList) -> Vec<CohortSummary> {
    list.iter().map(CohortSummary::from_cohort).collect()
}
