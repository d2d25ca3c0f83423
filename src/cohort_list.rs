use std::collections::BTreeSet;
use std::sync::Arc;

use crate::cohort::{Cohort, CohortDefinition};
use crate::data::filter::FilterNode;
use crate::data::model::Dataset;
use crate::error::{CohortError, Result};

/// Name of the unfiltered cohort created by [`CohortList::with_all_data`].
pub const ALL_DATA_COHORT: &str = "All data";

// ---------------------------------------------------------------------------
// CohortList – ordered, uniquely-named cohorts over one dataset
// ---------------------------------------------------------------------------

/// The set of cohorts a dashboard compares side by side.
///
/// Every operation validates before it mutates, so a returned error means
/// the list is unchanged.
#[derive(Debug)]
pub struct CohortList {
    dataset: Arc<Dataset>,
    cohorts: Vec<Cohort>,
}

impl CohortList {
    pub fn new(dataset: Arc<Dataset>) -> Self {
        CohortList {
            dataset,
            cohorts: Vec::new(),
        }
    }

    /// A list holding a single unfiltered "All data" cohort.
    pub fn with_all_data(dataset: Arc<Dataset>) -> Self {
        let all = Cohort::unfiltered(ALL_DATA_COHORT, Arc::clone(&dataset));
        CohortList {
            dataset,
            cohorts: vec![all],
        }
    }

    /// Build a list from serialised definitions, in order.
    pub fn from_definitions(
        dataset: Arc<Dataset>,
        definitions: impl IntoIterator<Item = CohortDefinition>,
    ) -> Result<Self> {
        let mut list = Self::new(dataset);
        for def in definitions {
            list.add_definition(def)?;
        }
        Ok(list)
    }

    pub fn definitions(&self) -> Vec<CohortDefinition> {
        self.cohorts.iter().map(Cohort::definition).collect()
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn len(&self) -> usize {
        self.cohorts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cohorts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Cohort> {
        self.cohorts.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.cohorts.iter().map(Cohort::name).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.cohorts.iter().position(|c| c.name() == name)
    }

    pub fn get(&self, name: &str) -> Option<&Cohort> {
        self.cohorts.iter().find(|c| c.name() == name)
    }

    /// Mutable access for filter editing. Renaming goes through [`rename`](Self::rename).
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Cohort> {
        self.cohorts.iter_mut().find(|c| c.name() == name)
    }

    // -- membership --

    pub fn add(&mut self, name: impl Into<String>, filters: Vec<FilterNode>) -> Result<&Cohort> {
        let name = name.into();
        self.check_free(&name)?;
        let cohort = Cohort::new(name, Arc::clone(&self.dataset), filters)?;
        Ok(self.push(cohort))
    }

    pub fn add_definition(&mut self, definition: CohortDefinition) -> Result<&Cohort> {
        self.add(definition.name, definition.cohort_filter_list)
    }

    pub fn rename(&mut self, old_name: &str, new_name: impl Into<String>) -> Result<()> {
        let new_name = new_name.into();
        let pos = self.require(old_name)?;
        if new_name == old_name {
            return Ok(());
        }
        self.check_free(&new_name)?;
        log::info!("Renamed cohort '{old_name}' to '{new_name}'");
        self.cohorts[pos].set_name(new_name);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Cohort> {
        let pos = self.require(name)?;
        log::info!("Removed cohort '{name}'");
        Ok(self.cohorts.remove(pos))
    }

    /// Reorder by name; `new_order` must name every cohort exactly once.
    pub fn reorder<S: AsRef<str>>(&mut self, new_order: &[S]) -> Result<()> {
        let mut seen = BTreeSet::new();
        let mut positions = Vec::with_capacity(new_order.len());
        for name in new_order {
            let name = name.as_ref();
            let pos = self.position(name).ok_or_else(|| {
                CohortError::InvalidOrder(format!("'{name}' is not in the cohort list"))
            })?;
            if !seen.insert(pos) {
                return Err(CohortError::InvalidOrder(format!("'{name}' appears more than once")));
            }
            positions.push(pos);
        }
        if positions.len() != self.cohorts.len() {
            return Err(CohortError::InvalidOrder(format!(
                "expected {} names, got {}",
                self.cohorts.len(),
                positions.len()
            )));
        }

        let mut slots: Vec<Option<Cohort>> = self.cohorts.drain(..).map(Some).collect();
        self.cohorts = positions
            .into_iter()
            .filter_map(|pos| slots[pos].take())
            .collect();
        log::info!("Reordered cohorts: {:?}", self.names());
        Ok(())
    }

    /// Copy `name`'s filter tree into a new cohort called `new_name`,
    /// appended at the end of the list.
    pub fn duplicate(&mut self, name: &str, new_name: impl Into<String>) -> Result<&Cohort> {
        let new_name = new_name.into();
        let pos = self.require(name)?;
        self.check_free(&new_name)?;
        let copy = self.cohorts[pos].duplicate(new_name);
        Ok(self.push(copy))
    }

    /// Swap in a new dataset and rebind every cohort; all or nothing.
    pub fn set_dataset(&mut self, dataset: Arc<Dataset>) -> Result<()> {
        let rows = self
            .cohorts
            .iter()
            .map(|c| c.rows_for(&dataset))
            .collect::<Result<Vec<_>>>()
            .inspect_err(|e| log::warn!("Dataset change rejected: {e}"))?;
        for (cohort, rows) in self.cohorts.iter_mut().zip(rows) {
            cohort.commit_dataset(Arc::clone(&dataset), rows);
        }
        self.dataset = dataset;
        log::info!("Rebound {} cohorts to a dataset of {} rows", self.cohorts.len(), self.dataset.len());
        Ok(())
    }

    fn push(&mut self, cohort: Cohort) -> &Cohort {
        log::info!("Added cohort '{}' ({} rows)", cohort.name(), cohort.len());
        self.cohorts.push(cohort);
        &self.cohorts[self.cohorts.len() - 1]
    }

    fn require(&self, name: &str) -> Result<usize> {
        self.position(name)
            .ok_or_else(|| CohortError::NotFound(name.to_string()))
    }

    fn check_free(&self, name: &str) -> Result<()> {
        if self.contains(name) {
            log::warn!("Cohort name '{name}' is already taken");
            return Err(CohortError::DuplicateName(name.to_string()));
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a CohortList {
    type Item = &'a Cohort;
    type IntoIter = std::slice::Iter<'a, Cohort>;

    fn into_iter(self) -> Self::IntoIter {
        self.cohorts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::Filter;

    fn dataset() -> Arc<Dataset> {
        Arc::new(
            Dataset::builder()
                .column("x", [1, 5, 10])
                .column("y", ["a", "b", "a"])
                .build()
                .unwrap(),
        )
    }

    fn list() -> CohortList {
        let mut list = CohortList::new(dataset());
        list.add("a", vec![Filter::equal("y", "a").unwrap().into()]).unwrap();
        list.add("b", vec![Filter::equal("y", "b").unwrap().into()]).unwrap();
        list.add("c", vec![]).unwrap();
        list
    }

    #[test]
    fn add_rejects_duplicates_without_change() {
        let mut l = list();
        let err = l.add("a", vec![]).unwrap_err();
        assert_eq!(err, CohortError::DuplicateName("a".into()));
        assert_eq!(l.names(), ["a", "b", "c"]);
        assert_eq!(l.get("a").unwrap().filtered_row_indices(), [0, 2]);
    }

    #[test]
    fn add_with_bad_filter_leaves_list_unchanged() {
        let mut l = list();
        assert!(l.add("d", vec![Filter::equal("zzz", 1).unwrap().into()]).is_err());
        assert_eq!(l.len(), 3);
        assert!(!l.contains("d"));
    }

    #[test]
    fn rename() {
        let mut l = list();
        l.rename("a", "alpha").unwrap();
        assert_eq!(l.names(), ["alpha", "b", "c"]);
        assert_eq!(l.rename("b", "c").unwrap_err(), CohortError::DuplicateName("c".into()));
        assert_eq!(l.rename("zzz", "q").unwrap_err(), CohortError::NotFound("zzz".into()));
        l.rename("b", "b").unwrap();
        assert_eq!(l.names(), ["alpha", "b", "c"]);
    }

    #[test]
    fn remove() {
        let mut l = list();
        let removed = l.remove("b").unwrap();
        assert_eq!(removed.name(), "b");
        assert_eq!(l.names(), ["a", "c"]);
        assert_eq!(l.remove("b").unwrap_err(), CohortError::NotFound("b".into()));
    }

    #[test]
    fn reorder() {
        let mut l = list();
        l.reorder(&["c", "a", "b"]).unwrap();
        assert_eq!(l.names(), ["c", "a", "b"]);
        assert_eq!(l.get("a").unwrap().filtered_row_indices(), [0, 2]);

        for bad in [&["c", "a"][..], &["c", "a", "a"], &["c", "a", "zzz"], &["c", "a", "b", "b"]] {
            assert!(matches!(l.reorder(bad), Err(CohortError::InvalidOrder(_))));
            assert_eq!(l.names(), ["c", "a", "b"]);
        }
    }

    #[test]
    fn duplicate_copies_filters_independently() {
        let mut l = list();
        l.duplicate("a", "a2").unwrap();
        assert_eq!(l.names(), ["a", "b", "c", "a2"]);
        assert_eq!(l.get("a2").unwrap().filters(), l.get("a").unwrap().filters());

        l.get_mut("a2")
            .unwrap()
            .add_filter(Filter::greater_than("x", 5).unwrap())
            .unwrap();
        assert_eq!(l.get("a2").unwrap().filtered_row_indices(), [2]);
        assert_eq!(l.get("a").unwrap().filtered_row_indices(), [0, 2]);

        assert!(matches!(l.duplicate("a", "b"), Err(CohortError::DuplicateName(_))));
        assert!(matches!(l.duplicate("zzz", "q"), Err(CohortError::NotFound(_))));
    }

    #[test]
    fn with_all_data_starts_with_unfiltered_cohort() {
        let l = CohortList::with_all_data(dataset());
        assert_eq!(l.names(), [ALL_DATA_COHORT]);
        assert_eq!(l.get(ALL_DATA_COHORT).unwrap().filtered_row_indices(), [0, 1, 2]);
    }

    #[test]
    fn set_dataset_is_all_or_nothing() {
        let mut l = list();
        let wider = Arc::new(
            Dataset::builder()
                .column("x", [7, 8])
                .column("y", ["b", "b"])
                .build()
                .unwrap(),
        );
        l.set_dataset(Arc::clone(&wider)).unwrap();
        assert!(l.iter().all(|c| Arc::ptr_eq(c.dataset(), l.dataset())));
        assert_eq!(l.get("b").unwrap().filtered_row_indices(), [0, 1]);
        assert!(l.get("a").unwrap().is_empty());

        let no_y = Arc::new(Dataset::builder().column("x", [1]).build().unwrap());
        assert!(l.set_dataset(no_y).is_err());
        assert!(Arc::ptr_eq(l.dataset(), &wider));
        assert_eq!(l.get("b").unwrap().filtered_row_indices(), [0, 1]);
    }

    #[test]
    fn definitions_round_trip() {
        let l = list();
        let defs = l.definitions();
        let rebuilt = CohortList::from_definitions(dataset(), defs.clone()).unwrap();
        assert_eq!(rebuilt.definitions(), defs);
        assert_eq!(rebuilt.names(), ["a", "b", "c"]);
    }
}
