//! Cohort and filter model for slicing a model-evaluation dataset into
//! named sub-populations and comparing their label and error statistics.

pub mod cohort;
pub mod cohort_list;
pub mod config;
pub mod data;
pub mod error;
pub mod report;

pub use cohort::{Cohort, CohortDefinition, CohortStats};
pub use cohort_list::{CohortList, ALL_DATA_COHORT};
pub use data::filter::{BoundPredicate, CompositeFilter, Filter, FilterMethod, FilterNode, Operator};
pub use data::model::{Column, ColumnKind, Dataset, DatasetBuilder, SpecialColumn, TaskKind, Value};
pub use error::{CohortError, Result};
