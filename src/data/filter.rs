use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize};

use super::model::{Column, ColumnKind, Dataset, SpecialColumn, TaskKind, Value, CLASSIFICATION_OUTCOMES};
use crate::error::{CohortError, Result};

// ---------------------------------------------------------------------------
// Filter methods
// ---------------------------------------------------------------------------

/// Predicate kinds a [`Filter`] can apply to one column.
///
/// Serialised names match the strings the dashboard exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterMethod {
    #[serde(rename = "equal")]
    Equal,
    #[serde(rename = "includes")]
    Includes,
    #[serde(rename = "excludes")]
    Excludes,
    #[serde(rename = "greater")]
    GreaterThan,
    #[serde(rename = "greater and equal")]
    GreaterThanEqualTo,
    #[serde(rename = "less")]
    LessThan,
    #[serde(rename = "less and equal")]
    LessThanEqualTo,
    #[serde(rename = "in the range of")]
    InTheRangeOf,
}

impl FilterMethod {
    pub const ALL: [FilterMethod; 8] = [
        FilterMethod::GreaterThan,
        FilterMethod::GreaterThanEqualTo,
        FilterMethod::LessThan,
        FilterMethod::LessThanEqualTo,
        FilterMethod::Equal,
        FilterMethod::Includes,
        FilterMethod::Excludes,
        FilterMethod::InTheRangeOf,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FilterMethod::Equal => "equal",
            FilterMethod::Includes => "includes",
            FilterMethod::Excludes => "excludes",
            FilterMethod::GreaterThan => "greater",
            FilterMethod::GreaterThanEqualTo => "greater and equal",
            FilterMethod::LessThan => "less",
            FilterMethod::LessThanEqualTo => "less and equal",
            FilterMethod::InTheRangeOf => "in the range of",
        }
    }

    /// Methods that take exactly one operand.
    pub fn is_single_value(self) -> bool {
        matches!(
            self,
            FilterMethod::Equal
                | FilterMethod::GreaterThan
                | FilterMethod::GreaterThanEqualTo
                | FilterMethod::LessThan
                | FilterMethod::LessThanEqualTo
        )
    }

    /// Methods that only apply to numeric columns.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            FilterMethod::GreaterThan
                | FilterMethod::GreaterThanEqualTo
                | FilterMethod::LessThan
                | FilterMethod::LessThanEqualTo
                | FilterMethod::InTheRangeOf
        )
    }
}

impl fmt::Display for FilterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Filter – one predicate on one column
// ---------------------------------------------------------------------------

/// A single predicate over one dataset column.
///
/// Operand arity and operand types are checked on construction (and on
/// deserialisation); column existence and column type are checked when
/// the filter is bound to a [`Dataset`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFilter")]
pub struct Filter {
    method: FilterMethod,
    arg: Vec<Value>,
    column: String,
}

#[derive(Deserialize)]
struct RawFilter {
    method: FilterMethod,
    arg: Vec<Value>,
    column: String,
}

impl TryFrom<RawFilter> for Filter {
    type Error = CohortError;

    fn try_from(raw: RawFilter) -> Result<Self> {
        Filter::new(raw.column, raw.method, raw.arg)
    }
}

impl Filter {
    pub fn new(column: impl Into<String>, method: FilterMethod, arg: Vec<Value>) -> Result<Self> {
        validate_arg(method, &arg)?;
        Ok(Filter {
            method,
            arg,
            column: column.into(),
        })
    }

    pub fn equal(column: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        Self::new(column, FilterMethod::Equal, vec![value.into()])
    }

    pub fn includes<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Result<Self> {
        Self::new(column, FilterMethod::Includes, values.into_iter().map(Into::into).collect())
    }

    pub fn excludes<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Result<Self> {
        Self::new(column, FilterMethod::Excludes, values.into_iter().map(Into::into).collect())
    }

    pub fn greater_than(column: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        Self::new(column, FilterMethod::GreaterThan, vec![value.into()])
    }

    pub fn greater_than_equal_to(column: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        Self::new(column, FilterMethod::GreaterThanEqualTo, vec![value.into()])
    }

    pub fn less_than(column: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        Self::new(column, FilterMethod::LessThan, vec![value.into()])
    }

    pub fn less_than_equal_to(column: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        Self::new(column, FilterMethod::LessThanEqualTo, vec![value.into()])
    }

    /// Closed interval `[lo, hi]`.
    pub fn in_range(column: impl Into<String>, lo: impl Into<Value>, hi: impl Into<Value>) -> Result<Self> {
        Self::new(column, FilterMethod::InTheRangeOf, vec![lo.into(), hi.into()])
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn method(&self) -> FilterMethod {
        self.method
    }

    pub fn arg(&self) -> &[Value] {
        &self.arg
    }

    /// Resolve the column and check operand types against it.
    pub fn bind<'a>(&self, dataset: &'a Dataset) -> Result<BoundPredicate<'a>> {
        let special = dataset.special_column(&self.column);
        let column = dataset
            .column(&self.column)
            .ok_or_else(|| self.missing_column(dataset, special))?;

        if let Some(special) = special {
            self.check_special_operands(special, dataset.task())?;
        }

        if self.method.is_numeric() && column.kind() != ColumnKind::Numeric {
            return Err(CohortError::TypeMismatch {
                column: self.column.clone(),
                expected: ColumnKind::Numeric.to_string(),
                found: column.kind().to_string(),
            });
        }
        if let Some(bad) = self.arg.iter().find(|v| !column.kind().accepts(v)) {
            return Err(CohortError::TypeMismatch {
                column: self.column.clone(),
                expected: column.kind().to_string(),
                found: bad.type_name().to_string(),
            });
        }

        let test = match self.method {
            FilterMethod::Equal => LeafTest::Equal(self.arg[0].clone()),
            FilterMethod::Includes => LeafTest::Includes(self.arg.clone()),
            FilterMethod::Excludes => LeafTest::Excludes(self.arg.clone()),
            FilterMethod::GreaterThan => LeafTest::Greater(numeric_operand(&self.arg[0])),
            FilterMethod::GreaterThanEqualTo => LeafTest::GreaterEqual(numeric_operand(&self.arg[0])),
            FilterMethod::LessThan => LeafTest::Less(numeric_operand(&self.arg[0])),
            FilterMethod::LessThanEqualTo => LeafTest::LessEqual(numeric_operand(&self.arg[0])),
            FilterMethod::InTheRangeOf => {
                LeafTest::Range(numeric_operand(&self.arg[0]), numeric_operand(&self.arg[1]))
            }
        };

        Ok(BoundPredicate::Leaf { column, test })
    }

    /// Evaluate this filter on a single row.
    pub fn evaluate(&self, dataset: &Dataset, row: usize) -> Result<bool> {
        check_row(dataset, row)?;
        Ok(self.bind(dataset)?.test(row))
    }

    fn missing_column(&self, dataset: &Dataset, special: Option<SpecialColumn>) -> CohortError {
        match special {
            Some(SpecialColumn::ClassificationOutcome) if dataset.has_labels() => CohortError::InvalidFilter(
                format!("{} filter is only supported for binary classification", self.column),
            ),
            Some(SpecialColumn::RegressionError) if dataset.has_labels() => CohortError::InvalidFilter(
                format!("{} filter is only supported for regression with numeric labels", self.column),
            ),
            _ => CohortError::UnknownColumn(self.column.clone()),
        }
    }

    // -- rules for the columns the dataset answers for itself --

    fn check_special_operands(&self, special: SpecialColumn, task: TaskKind) -> Result<()> {
        match special {
            SpecialColumn::Index => {
                if self.method == FilterMethod::Excludes {
                    return Err(CohortError::InvalidFilter(
                        "excludes filter is not supported with Index based selection".into(),
                    ));
                }
                self.require_operands("integer", |v| matches!(v, Value::Integer(_)))
            }
            SpecialColumn::ClassificationOutcome => {
                if self.method != FilterMethod::Includes {
                    return Err(CohortError::InvalidFilter(format!(
                        "only '{}' is supported for {}, got '{}'",
                        FilterMethod::Includes,
                        self.column,
                        self.method
                    )));
                }
                let known = |v: &Value| matches!(v, Value::String(s) if CLASSIFICATION_OUTCOMES.contains(&s.as_str()));
                if let Some(bad) = self.arg.iter().find(|v| !known(*v)) {
                    return Err(CohortError::InvalidFilter(format!(
                        "{bad} is not a classification outcome, expected one of {}",
                        CLASSIFICATION_OUTCOMES.join(", ")
                    )));
                }
                Ok(())
            }
            SpecialColumn::RegressionError => self.check_numeric_target(),
            SpecialColumn::TrueY | SpecialColumn::PredictedY if task == TaskKind::Regression => {
                self.check_numeric_target()
            }
            SpecialColumn::TrueY | SpecialColumn::PredictedY => Ok(()),
        }
    }

    /// Continuous targets take comparisons only.
    fn check_numeric_target(&self) -> Result<()> {
        if matches!(self.method, FilterMethod::Includes | FilterMethod::Excludes) {
            return Err(CohortError::InvalidFilter(format!(
                "'{}' is not supported for {}",
                self.method, self.column
            )));
        }
        self.require_operands("numeric", Value::is_numeric)
    }

    fn require_operands(&self, expected: &str, ok: impl Fn(&Value) -> bool) -> Result<()> {
        if let Some(bad) = self.arg.iter().find(|v| !ok(*v)) {
            return Err(CohortError::TypeMismatch {
                column: self.column.clone(),
                expected: expected.into(),
                found: bad.type_name().into(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.arg.iter().map(|v| v.to_string()).collect();
        write!(f, "{} {} [{}]", self.column, self.method, args.join(", "))
    }
}

fn validate_arg(method: FilterMethod, arg: &[Value]) -> Result<()> {
    if arg.is_empty() {
        return Err(CohortError::InvalidFilter("Empty list supplied for arg".into()));
    }
    if arg.iter().any(Value::is_null) {
        return Err(CohortError::InvalidFilter("null is not a valid filter operand".into()));
    }
    if let Some(bad) = arg.iter().find(|v| v.as_f64().is_some_and(|x| !x.is_finite())) {
        return Err(CohortError::InvalidFilter(format!("{bad} is not a valid filter operand")));
    }
    if method.is_single_value() && arg.len() != 1 {
        return Err(CohortError::InvalidFilter(format!(
            "expected a single value in arg for method '{method}', got {}",
            arg.len()
        )));
    }
    if method == FilterMethod::InTheRangeOf && arg.len() != 2 {
        return Err(CohortError::InvalidFilter(format!(
            "expected two entries in arg for method '{method}', got {}",
            arg.len()
        )));
    }
    if method.is_numeric() {
        if let Some(bad) = arg.iter().find(|v| !v.is_numeric()) {
            return Err(CohortError::InvalidFilter(format!(
                "expected int or float arg for method '{method}', got {}",
                bad.type_name()
            )));
        }
    }
    if method == FilterMethod::InTheRangeOf && numeric_operand(&arg[0]) > numeric_operand(&arg[1]) {
        return Err(CohortError::InvalidFilter(format!(
            "range lower bound {} exceeds upper bound {}",
            arg[0], arg[1]
        )));
    }
    Ok(())
}

/// Operands of numeric methods are validated on construction.
fn numeric_operand(v: &Value) -> f64 {
    v.as_f64().unwrap_or(f64::NAN)
}

fn check_row(dataset: &Dataset, row: usize) -> Result<()> {
    if row >= dataset.len() {
        return Err(CohortError::RowOutOfRange {
            row,
            len: dataset.len(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Composite filters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    And,
    Or,
}

/// Boolean combination of child nodes.
///
/// Children are owned, so a tree can never contain itself; cloning copies
/// the whole subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeFilter {
    #[serde(rename = "operation")]
    operator: Operator,
    #[serde(rename = "compositeFilters")]
    children: Vec<FilterNode>,
}

impl CompositeFilter {
    pub fn new(operator: Operator, children: Vec<FilterNode>) -> Self {
        CompositeFilter { operator, children }
    }

    pub fn and(children: Vec<FilterNode>) -> Self {
        Self::new(Operator::And, children)
    }

    pub fn or(children: Vec<FilterNode>) -> Self {
        Self::new(Operator::Or, children)
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn children(&self) -> &[FilterNode] {
        &self.children
    }

    /// Append a child, taking ownership of it.
    pub fn push(&mut self, child: impl Into<FilterNode>) {
        self.children.push(child.into());
    }

    pub fn bind<'a>(&self, dataset: &'a Dataset) -> Result<BoundPredicate<'a>> {
        let children = self
            .children
            .iter()
            .map(|c| c.bind(dataset))
            .collect::<Result<Vec<_>>>()?;
        Ok(match self.operator {
            Operator::And => BoundPredicate::All(children),
            Operator::Or => BoundPredicate::Any(children),
        })
    }

    pub fn evaluate(&self, dataset: &Dataset, row: usize) -> Result<bool> {
        check_row(dataset, row)?;
        Ok(self.bind(dataset)?.test(row))
    }
}

/// A node in a filter tree: either a leaf [`Filter`] or a [`CompositeFilter`].
///
/// Serialises as whichever shape it holds. Deserialising picks the shape by
/// the presence of the `operation` key, so a bad leaf keeps its own message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterNode {
    Filter(Filter),
    Composite(CompositeFilter),
}

impl<'de> Deserialize<'de> for FilterNode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let node = if value.get("operation").is_some() {
            CompositeFilter::deserialize(value).map(FilterNode::Composite)
        } else {
            Filter::deserialize(value).map(FilterNode::Filter)
        };
        node.map_err(de::Error::custom)
    }
}

impl FilterNode {
    pub fn bind<'a>(&self, dataset: &'a Dataset) -> Result<BoundPredicate<'a>> {
        match self {
            FilterNode::Filter(f) => f.bind(dataset),
            FilterNode::Composite(c) => c.bind(dataset),
        }
    }

    pub fn evaluate(&self, dataset: &Dataset, row: usize) -> Result<bool> {
        check_row(dataset, row)?;
        Ok(self.bind(dataset)?.test(row))
    }

    /// Number of nodes in this subtree, including itself.
    pub fn node_count(&self) -> usize {
        match self {
            FilterNode::Filter(_) => 1,
            FilterNode::Composite(c) => 1 + c.children.iter().map(FilterNode::node_count).sum::<usize>(),
        }
    }
}

impl From<Filter> for FilterNode {
    fn from(f: Filter) -> Self {
        FilterNode::Filter(f)
    }
}

impl From<CompositeFilter> for FilterNode {
    fn from(c: CompositeFilter) -> Self {
        FilterNode::Composite(c)
    }
}

// ---------------------------------------------------------------------------
// Bound predicates: filters resolved against one dataset
// ---------------------------------------------------------------------------

/// A filter tree whose columns and operand types have been checked against
/// a dataset. Testing a row cannot fail.
#[derive(Debug)]
pub enum BoundPredicate<'a> {
    Leaf { column: &'a Column, test: LeafTest },
    All(Vec<BoundPredicate<'a>>),
    Any(Vec<BoundPredicate<'a>>),
}

#[derive(Debug, Clone)]
pub enum LeafTest {
    Equal(Value),
    Includes(Vec<Value>),
    Excludes(Vec<Value>),
    Greater(f64),
    GreaterEqual(f64),
    Less(f64),
    LessEqual(f64),
    Range(f64, f64),
}

impl<'a> BoundPredicate<'a> {
    /// Whether `row` satisfies the predicate. Null cells never match.
    pub fn test(&self, row: usize) -> bool {
        match self {
            BoundPredicate::Leaf { column, test } => {
                let cell = column.get(row);
                !cell.is_null() && test.matches(cell)
            }
            // Empty And is vacuously true, empty Or is false.
            BoundPredicate::All(children) => children.iter().all(|c| c.test(row)),
            BoundPredicate::Any(children) => children.iter().any(|c| c.test(row)),
        }
    }
}

impl LeafTest {
    fn matches(&self, cell: &Value) -> bool {
        match self {
            LeafTest::Equal(v) => cell.same_as(v),
            LeafTest::Includes(vs) => vs.iter().any(|v| cell.same_as(v)),
            LeafTest::Excludes(vs) => !vs.iter().any(|v| cell.same_as(v)),
            LeafTest::Greater(x) => cell.as_f64().is_some_and(|c| c > *x),
            LeafTest::GreaterEqual(x) => cell.as_f64().is_some_and(|c| c >= *x),
            LeafTest::Less(x) => cell.as_f64().is_some_and(|c| c < *x),
            LeafTest::LessEqual(x) => cell.as_f64().is_some_and(|c| c <= *x),
            LeafTest::Range(lo, hi) => cell.as_f64().is_some_and(|c| *lo <= c && c <= *hi),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{
        CLASSIFICATION_OUTCOME_COLUMN, FALSE_NEGATIVE, INDEX_COLUMN, PREDICTED_Y_COLUMN, REGRESSION_ERROR_COLUMN,
        TRUE_POSITIVE, TRUE_Y_COLUMN,
    };

    fn sample() -> Dataset {
        Dataset::builder()
            .column("x", [Some(1.0), Some(5.0), Some(10.0), None])
            .column("y", ["a", "b", "a", "c"])
            .column("flag", [true, false, true, false])
            .column("label", [1, 0, 1, 0])
            .column("pred", [1, 1, 0, 0])
            .true_y("label")
            .predicted_y("pred")
            .build()
            .unwrap()
    }

    fn rows(ds: &Dataset, node: impl Into<FilterNode>) -> Vec<usize> {
        let node = node.into();
        (0..ds.len())
            .filter(|&r| node.evaluate(ds, r).unwrap())
            .collect()
    }

    #[test]
    fn equal_on_categorical_and_numeric() {
        let ds = sample();
        assert_eq!(rows(&ds, Filter::equal("y", "a").unwrap()), [0, 2]);
        // integer operand matches float cells numerically
        assert_eq!(rows(&ds, Filter::equal("x", 5).unwrap()), [1]);
        assert_eq!(rows(&ds, Filter::equal("flag", true).unwrap()), [0, 2]);
    }

    #[test]
    fn includes_and_excludes() {
        let ds = sample();
        assert_eq!(rows(&ds, Filter::includes("y", ["a", "c"]).unwrap()), [0, 2, 3]);
        assert_eq!(rows(&ds, Filter::excludes("y", ["a"]).unwrap()), [1, 3]);
    }

    #[test]
    fn comparators() {
        let ds = sample();
        assert_eq!(rows(&ds, Filter::greater_than("x", 5).unwrap()), [2]);
        assert_eq!(rows(&ds, Filter::greater_than_equal_to("x", 5).unwrap()), [1, 2]);
        assert_eq!(rows(&ds, Filter::less_than("x", 5).unwrap()), [0]);
        assert_eq!(rows(&ds, Filter::less_than_equal_to("x", 5).unwrap()), [0, 1]);
    }

    #[test]
    fn range_is_inclusive_at_both_ends() {
        let ds = sample();
        assert_eq!(rows(&ds, Filter::in_range("x", 1, 5).unwrap()), [0, 1]);
        assert_eq!(rows(&ds, Filter::in_range("x", 5.0, 5.0).unwrap()), [1]);
    }

    #[test]
    fn null_cells_never_match() {
        let ds = sample();
        // row 3 has x = null
        assert_eq!(rows(&ds, Filter::excludes("x", [1]).unwrap()), [1, 2]);
        assert!(!Filter::less_than("x", 100).unwrap().evaluate(&ds, 3).unwrap());
    }

    #[test]
    fn arity_is_checked_on_construction() {
        assert!(matches!(
            Filter::new("x", FilterMethod::InTheRangeOf, vec![Value::from(1)]),
            Err(CohortError::InvalidFilter(_))
        ));
        assert!(matches!(
            Filter::new("x", FilterMethod::GreaterThan, vec![Value::from(1), Value::from(9)]),
            Err(CohortError::InvalidFilter(_))
        ));
        assert!(matches!(
            Filter::new("x", FilterMethod::Includes, vec![]),
            Err(CohortError::InvalidFilter(_))
        ));
        assert!(matches!(
            Filter::greater_than("x", "val"),
            Err(CohortError::InvalidFilter(_))
        ));
        assert!(matches!(Filter::in_range("x", 9, 1), Err(CohortError::InvalidFilter(_))));
    }

    #[test]
    fn non_finite_operands_are_rejected() {
        assert!(matches!(
            Filter::in_range("x", f64::NAN, 1.0),
            Err(CohortError::InvalidFilter(_))
        ));
        assert!(matches!(
            Filter::greater_than("x", f64::INFINITY),
            Err(CohortError::InvalidFilter(_))
        ));
        assert!(matches!(
            Filter::includes("x", [1.0, f64::NEG_INFINITY]),
            Err(CohortError::InvalidFilter(_))
        ));
    }

    #[test]
    fn binding_reports_unknown_columns_and_type_mismatch() {
        let ds = sample();
        assert_eq!(
            Filter::equal("nope", 1).unwrap().bind(&ds).unwrap_err(),
            CohortError::UnknownColumn("nope".into())
        );
        assert!(matches!(
            Filter::greater_than("y", 1).unwrap().bind(&ds),
            Err(CohortError::TypeMismatch { .. })
        ));
        assert!(matches!(
            Filter::equal("x", "a").unwrap().bind(&ds),
            Err(CohortError::TypeMismatch { .. })
        ));
        assert!(matches!(
            Filter::includes("flag", [1]).unwrap().bind(&ds),
            Err(CohortError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn out_of_range_row_is_an_error() {
        let ds = sample();
        let err = Filter::equal("y", "a").unwrap().evaluate(&ds, 4).unwrap_err();
        assert_eq!(err, CohortError::RowOutOfRange { row: 4, len: 4 });
    }

    #[test]
    fn index_filters() {
        let ds = sample();
        assert_eq!(rows(&ds, Filter::less_than(INDEX_COLUMN, 2).unwrap()), [0, 1]);
        assert!(matches!(
            Filter::excludes(INDEX_COLUMN, [1]).unwrap().bind(&ds),
            Err(CohortError::InvalidFilter(_))
        ));
        assert!(matches!(
            Filter::greater_than(INDEX_COLUMN, 1.5).unwrap().bind(&ds),
            Err(CohortError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn special_label_columns() {
        let ds = sample();
        assert_eq!(rows(&ds, Filter::equal("Predicted Y", 1).unwrap()), [0, 1]);
        assert_eq!(
            rows(&ds, Filter::includes(CLASSIFICATION_OUTCOME_COLUMN, [TRUE_POSITIVE]).unwrap()),
            [0]
        );
    }

    #[test]
    fn classification_outcome_takes_known_outcomes_through_includes() {
        let ds = sample();
        assert_eq!(
            rows(&ds, Filter::includes(CLASSIFICATION_OUTCOME_COLUMN, [TRUE_POSITIVE, FALSE_NEGATIVE]).unwrap()),
            [0, 2]
        );
        assert!(matches!(
            Filter::equal(CLASSIFICATION_OUTCOME_COLUMN, TRUE_POSITIVE).unwrap().bind(&ds),
            Err(CohortError::InvalidFilter(_))
        ));
        assert!(matches!(
            Filter::excludes(CLASSIFICATION_OUTCOME_COLUMN, [TRUE_POSITIVE]).unwrap().bind(&ds),
            Err(CohortError::InvalidFilter(_))
        ));
        let typo = Filter::includes(CLASSIFICATION_OUTCOME_COLUMN, ["False posit"]).unwrap();
        let err = typo.bind(&ds).unwrap_err();
        assert!(matches!(err, CohortError::InvalidFilter(_)));
        assert!(err.to_string().contains("False posit"));
    }

    #[test]
    fn classification_outcome_needs_binary_classification() {
        let multiclass = Dataset::builder()
            .column("label", ["a", "b", "c"])
            .column("pred", ["a", "b", "b"])
            .true_y("label")
            .predicted_y("pred")
            .build()
            .unwrap();
        let f = Filter::includes(CLASSIFICATION_OUTCOME_COLUMN, [TRUE_POSITIVE]).unwrap();
        assert!(matches!(f.bind(&multiclass), Err(CohortError::InvalidFilter(_))));

        let unlabelled = Dataset::builder().column("x", [1]).build().unwrap();
        assert_eq!(
            f.bind(&unlabelled).unwrap_err(),
            CohortError::UnknownColumn(CLASSIFICATION_OUTCOME_COLUMN.into())
        );
    }

    #[test]
    fn regression_targets_take_comparisons_only() {
        let ds = Dataset::builder()
            .column("y", [1.0, 4.0, 2.0])
            .column("p", [1.5, 2.0, 2.0])
            .true_y("y")
            .predicted_y("p")
            .task(TaskKind::Regression)
            .build()
            .unwrap();
        assert_eq!(rows(&ds, Filter::greater_than(REGRESSION_ERROR_COLUMN, 1.0).unwrap()), [1]);
        assert_eq!(rows(&ds, Filter::less_than_equal_to(TRUE_Y_COLUMN, 2).unwrap()), [0, 2]);

        for column in [REGRESSION_ERROR_COLUMN, TRUE_Y_COLUMN, PREDICTED_Y_COLUMN] {
            assert!(matches!(
                Filter::includes(column, [2.0]).unwrap().bind(&ds),
                Err(CohortError::InvalidFilter(_))
            ));
            assert!(matches!(
                Filter::excludes(column, [2.0]).unwrap().bind(&ds),
                Err(CohortError::InvalidFilter(_))
            ));
            assert!(matches!(
                Filter::equal(column, "high").unwrap().bind(&ds),
                Err(CohortError::TypeMismatch { .. })
            ));
        }

        let classification = sample();
        let f = Filter::less_than(REGRESSION_ERROR_COLUMN, 1.0).unwrap();
        assert!(matches!(f.bind(&classification), Err(CohortError::InvalidFilter(_))));
    }

    #[test]
    fn empty_composites() {
        let ds = sample();
        let and = CompositeFilter::and(vec![]);
        let or = CompositeFilter::or(vec![]);
        for r in 0..ds.len() {
            assert!(and.evaluate(&ds, r).unwrap());
            assert!(!or.evaluate(&ds, r).unwrap());
        }
    }

    #[test]
    fn nested_composites() {
        let ds = sample();
        // y == "b" OR (flag AND x >= 10)
        let tree = CompositeFilter::or(vec![
            Filter::equal("y", "b").unwrap().into(),
            CompositeFilter::and(vec![
                Filter::equal("flag", true).unwrap().into(),
                Filter::greater_than_equal_to("x", 10).unwrap().into(),
            ])
            .into(),
        ]);
        assert_eq!(rows(&ds, tree.clone()), [1, 2]);
        assert_eq!(FilterNode::from(tree).node_count(), 5);
    }

    #[test]
    fn composite_binding_propagates_child_errors() {
        let ds = sample();
        let tree = CompositeFilter::or(vec![
            Filter::equal("y", "b").unwrap().into(),
            Filter::equal("missing", 1).unwrap().into(),
        ]);
        assert_eq!(tree.bind(&ds).unwrap_err(), CohortError::UnknownColumn("missing".into()));
    }

    #[test]
    fn serialises_in_dashboard_shape() {
        let f = Filter::in_range("age", 65.0, 70.0).unwrap();
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"method": "in the range of", "arg": [65.0, 70.0], "column": "age"})
        );

        let tree: FilterNode = serde_json::from_value(serde_json::json!({
            "operation": "or",
            "compositeFilters": [
                {"method": "less", "arg": [65], "column": "age"},
                {"method": "includes", "arg": ["a", "b"], "column": "y"}
            ]
        }))
        .unwrap();
        let FilterNode::Composite(c) = &tree else {
            panic!("expected composite, got {tree:?}");
        };
        assert_eq!(c.operator(), Operator::Or);
        assert_eq!(c.children().len(), 2);
    }

    #[test]
    fn deserialising_validates_arity() {
        let err = serde_json::from_value::<Filter>(serde_json::json!({
            "method": "greater", "arg": [1, 9], "column": "age"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("single value"));

        let err = serde_json::from_value::<FilterNode>(serde_json::json!({
            "operation": "and",
            "compositeFilters": [{"method": "in the range of", "arg": [1], "column": "age"}]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("two entries"), "{err}");

        assert!(serde_json::from_value::<Filter>(serde_json::json!({
            "method": "random", "arg": [1], "column": "age"
        }))
        .is_err());
    }
}
