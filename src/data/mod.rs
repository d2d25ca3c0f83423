/// Data layer: the dataset table, filter trees, and synthetic data.
///
/// Architecture:
/// ```text
///   DatasetBuilder
///        │
///        ▼
///   ┌──────────┐
///   │  Dataset  │  columns, label designation, derived columns
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  bind Filter / CompositeFilter trees → BoundPredicate
///   └──────────┘
///        │
///        ▼
///   Cohort row indices
/// ```

pub mod filter;
pub mod model;
pub mod synthetic;
