use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

use crate::data::filter::FilterNode;
use crate::data::model::{Dataset, Value};
use crate::error::{CohortError, Result};

// ---------------------------------------------------------------------------
// Serialisable cohort definition
// ---------------------------------------------------------------------------

/// Name and filter tree of a cohort, without any derived state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortDefinition {
    pub name: String,
    /// `null` and a missing key both mean "no filters".
    #[serde(default, deserialize_with = "null_as_empty")]
    pub cohort_filter_list: Vec<FilterNode>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<FilterNode>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<FilterNode>>::deserialize(deserializer)?.unwrap_or_default())
}

impl CohortDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        CohortDefinition {
            name: name.into(),
            cohort_filter_list: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: impl Into<FilterNode>) -> Self {
        self.cohort_filter_list.push(filter.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Exact tallies over a cohort's rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CohortStats {
    pub total: usize,
    /// True-label value → row count. Empty without a true-label column.
    pub count_by_label: BTreeMap<Value, usize>,
    /// Predicted-label value → row count.
    pub count_by_prediction: BTreeMap<Value, usize>,
    /// Rows whose prediction differs from the true label.
    pub error_count: usize,
}

impl CohortStats {
    pub fn compute(dataset: &Dataset, rows: &[usize]) -> Self {
        let truth = dataset.true_labels();
        let pred = dataset.predicted_labels();

        let mut stats = CohortStats {
            total: rows.len(),
            ..Default::default()
        };
        for &row in rows {
            let t = truth.map(|c| c.get(row));
            let p = pred.map(|c| c.get(row));
            if let Some(t) = t.filter(|v| !v.is_null()) {
                *stats.count_by_label.entry(t.clone()).or_default() += 1;
            }
            if let Some(p) = p.filter(|v| !v.is_null()) {
                *stats.count_by_prediction.entry(p.clone()).or_default() += 1;
            }
            if let (Some(t), Some(p)) = (t, p) {
                if !t.is_null() && !p.is_null() && !t.same_as(p) {
                    stats.error_count += 1;
                }
            }
        }
        stats
    }

    /// Fraction of rows that are errors; 0.0 for an empty cohort.
    pub fn error_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.error_count as f64 / self.total as f64
    }

    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        1.0 - self.error_rate()
    }
}

// ---------------------------------------------------------------------------
// Cohort
// ---------------------------------------------------------------------------

/// A named, filtered view over a shared [`Dataset`].
///
/// Row indices are recomputed on every write; a write that fails to bind
/// leaves the cohort exactly as it was. Stats are computed on first read
/// after a write.
#[derive(Debug)]
pub struct Cohort {
    name: String,
    filters: Vec<FilterNode>,
    dataset: Arc<Dataset>,
    row_indices: Vec<usize>,
    stats: OnceCell<CohortStats>,
}

impl Cohort {
    /// Create a cohort; an empty filter list selects every row.
    pub fn new(name: impl Into<String>, dataset: Arc<Dataset>, filters: Vec<FilterNode>) -> Result<Self> {
        let name = name.into();
        let row_indices = compute_row_indices(&dataset, &filters)?;
        log::debug!("Cohort '{name}' selects {} of {} rows", row_indices.len(), dataset.len());
        Ok(Cohort {
            name,
            filters,
            dataset,
            row_indices,
            stats: OnceCell::new(),
        })
    }

    /// A cohort over every row.
    pub fn unfiltered(name: impl Into<String>, dataset: Arc<Dataset>) -> Self {
        let row_indices = (0..dataset.len()).collect();
        Cohort {
            name: name.into(),
            filters: Vec::new(),
            dataset,
            row_indices,
            stats: OnceCell::new(),
        }
    }

    pub fn from_definition(definition: CohortDefinition, dataset: Arc<Dataset>) -> Result<Self> {
        Self::new(definition.name, dataset, definition.cohort_filter_list)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filters(&self) -> &[FilterNode] {
        &self.filters
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    /// Rows satisfying every top-level filter, ascending.
    pub fn filtered_row_indices(&self) -> &[usize] {
        &self.row_indices
    }

    pub fn len(&self) -> usize {
        self.row_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_indices.is_empty()
    }

    pub fn stats(&self) -> &CohortStats {
        self.stats
            .get_or_init(|| CohortStats::compute(&self.dataset, &self.row_indices))
    }

    pub fn definition(&self) -> CohortDefinition {
        CohortDefinition {
            name: self.name.clone(),
            cohort_filter_list: self.filters.clone(),
        }
    }

    // -- filter mutation --

    pub fn add_filter(&mut self, filter: impl Into<FilterNode>) -> Result<()> {
        let mut filters = self.filters.clone();
        filters.push(filter.into());
        self.commit_filters(filters)
    }

    /// Remove and return the top-level filter at `position`.
    pub fn remove_filter(&mut self, position: usize) -> Result<FilterNode> {
        self.check_position(position)?;
        let mut filters = self.filters.clone();
        let removed = filters.remove(position);
        self.commit_filters(filters)?;
        Ok(removed)
    }

    /// Replace the top-level filter at `position`, returning the old one.
    pub fn replace_filter(&mut self, position: usize, filter: impl Into<FilterNode>) -> Result<FilterNode> {
        self.check_position(position)?;
        let mut filters = self.filters.clone();
        let old = std::mem::replace(&mut filters[position], filter.into());
        self.commit_filters(filters)?;
        Ok(old)
    }

    /// Reorder top-level filters; `order[i]` is the current position of the
    /// filter that should end up at position `i`.
    pub fn reorder_filters(&mut self, order: &[usize]) -> Result<()> {
        if !is_permutation(order, self.filters.len()) {
            return Err(CohortError::InvalidOrder(format!(
                "{order:?} is not a permutation of 0..{}",
                self.filters.len()
            )));
        }
        let filters = order.iter().map(|&i| self.filters[i].clone()).collect();
        self.commit_filters(filters)
    }

    pub fn set_filters(&mut self, filters: Vec<FilterNode>) -> Result<()> {
        self.commit_filters(filters)
    }

    pub fn clear_filters(&mut self) {
        self.filters.clear();
        self.row_indices = (0..self.dataset.len()).collect();
        self.stats = OnceCell::new();
    }

    // -- crate-internal helpers used by CohortList --
    //
    // A cohort only changes dataset together with the rest of its list.

    /// Row indices these filters would select on `dataset`, without committing.
    pub(crate) fn rows_for(&self, dataset: &Dataset) -> Result<Vec<usize>> {
        compute_row_indices(dataset, &self.filters)
    }

    pub(crate) fn commit_dataset(&mut self, dataset: Arc<Dataset>, row_indices: Vec<usize>) {
        self.dataset = dataset;
        self.row_indices = row_indices;
        self.stats = OnceCell::new();
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Deep copy of the filter tree under a new name; stats start cold.
    pub(crate) fn duplicate(&self, name: String) -> Cohort {
        Cohort {
            name,
            filters: self.filters.clone(),
            dataset: Arc::clone(&self.dataset),
            row_indices: self.row_indices.clone(),
            stats: OnceCell::new(),
        }
    }

    fn commit_filters(&mut self, filters: Vec<FilterNode>) -> Result<()> {
        let row_indices = compute_row_indices(&self.dataset, &filters).inspect_err(|e| {
            log::warn!("Rejected filter change on cohort '{}': {e}", self.name);
        })?;
        log::debug!(
            "Cohort '{}' now has {} filters selecting {} rows",
            self.name,
            filters.len(),
            row_indices.len()
        );
        self.filters = filters;
        self.row_indices = row_indices;
        self.stats = OnceCell::new();
        Ok(())
    }

    fn check_position(&self, position: usize) -> Result<()> {
        if position >= self.filters.len() {
            return Err(CohortError::InvalidFilter(format!(
                "no filter at position {position} (cohort '{}' has {})",
                self.name,
                self.filters.len()
            )));
        }
        Ok(())
    }
}

/// Rows where every top-level node holds. Binds everything before scanning.
fn compute_row_indices(dataset: &Dataset, filters: &[FilterNode]) -> Result<Vec<usize>> {
    let bound = filters
        .iter()
        .map(|f| f.bind(dataset))
        .collect::<Result<Vec<_>>>()?;
    Ok((0..dataset.len())
        .filter(|&row| bound.iter().all(|p| p.test(row)))
        .collect())
}

pub(crate) fn is_permutation(order: &[usize], len: usize) -> bool {
    if order.len() != len {
        return false;
    }
    let mut seen = vec![false; len];
    for &i in order {
        if i >= len || std::mem::replace(&mut seen[i], true) {
            return false;
        }
    }
    true
}
