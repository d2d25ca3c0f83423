use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CohortError, Result};

/// Row position, exposed as a numeric column.
pub const INDEX_COLUMN: &str = "Index";
/// Alias for the designated true-label column.
pub const TRUE_Y_COLUMN: &str = "True Y";
/// Alias for the designated predicted-label column.
pub const PREDICTED_Y_COLUMN: &str = "Predicted Y";
/// Derived per-row outcome for binary classification.
pub const CLASSIFICATION_OUTCOME_COLUMN: &str = "Classification Outcome";
/// Derived `|predicted - true|` for regression.
pub const REGRESSION_ERROR_COLUMN: &str = "Regression Error";

pub const TRUE_POSITIVE: &str = "True positive";
pub const TRUE_NEGATIVE: &str = "True negative";
pub const FALSE_POSITIVE: &str = "False positive";
pub const FALSE_NEGATIVE: &str = "False negative";
/// Every value the `Classification Outcome` column can take.
pub const CLASSIFICATION_OUTCOMES: [&str; 4] = [TRUE_POSITIVE, TRUE_NEGATIVE, FALSE_POSITIVE, FALSE_NEGATIVE];

/// Column names the dataset answers for itself rather than storing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialColumn {
    Index,
    TrueY,
    PredictedY,
    ClassificationOutcome,
    RegressionError,
}

impl SpecialColumn {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            INDEX_COLUMN => Some(SpecialColumn::Index),
            TRUE_Y_COLUMN => Some(SpecialColumn::TrueY),
            PREDICTED_Y_COLUMN => Some(SpecialColumn::PredictedY),
            CLASSIFICATION_OUTCOME_COLUMN => Some(SpecialColumn::ClassificationOutcome),
            REGRESSION_ERROR_COLUMN => Some(SpecialColumn::RegressionError),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Value – a single cell
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value.
///
/// Serialises as a bare JSON scalar. Variant order matters for the untagged
/// representation: `1` must land in `Integer`, not `Float`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Value {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Equality with numbers compared by value, so `1` matches `1.0`.
    ///
    /// `==` keeps the two apart; this is the comparison used for filter
    /// operands and label agreement.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
        }
    }
}

// -- Manual Eq/Ord so Value can key BTreeMap / BTreeSet --
//
// Integers and floats sort together numerically; on a numeric tie the
// integer sorts first, so `Integer(1)` and `Float(1.0)` stay distinct keys.

fn rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Integer(_) | Value::Float(_) => 2,
        Value::String(_) => 3,
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        let (ra, rb) = (rank(self), rank(other));
        if ra != rb {
            return ra.cmp(&rb);
        }
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Integer(a), Float(b)) => (*a as f64).total_cmp(b).then(Ordering::Less),
            (Float(a), Integer(b)) => a.total_cmp(&(*b as f64)).then(Ordering::Greater),
            (String(a), String(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::String(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "<null>"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Column
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Boolean,
}

impl ColumnKind {
    /// Whether a non-null value belongs in a column of this kind.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ColumnKind::Numeric => value.is_numeric(),
            ColumnKind::Categorical => matches!(value, Value::String(_)),
            ColumnKind::Boolean => matches!(value, Value::Bool(_)),
        }
    }

    fn of(value: &Value) -> Option<ColumnKind> {
        match value {
            Value::Integer(_) | Value::Float(_) => Some(ColumnKind::Numeric),
            Value::String(_) => Some(ColumnKind::Categorical),
            Value::Bool(_) => Some(ColumnKind::Boolean),
            Value::Null => None,
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Categorical => "categorical",
            ColumnKind::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// One named column of uniformly-typed values (nulls allowed anywhere).
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    kind: ColumnKind,
    values: Vec<Value>,
}

impl Column {
    /// Build a column, inferring its kind from the non-null values.
    /// An all-null column is categorical.
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Result<Self> {
        let name = name.into();
        let kind = values
            .iter()
            .find_map(ColumnKind::of)
            .unwrap_or(ColumnKind::Categorical);
        Self::with_kind(name, kind, values)
    }

    pub fn with_kind(name: impl Into<String>, kind: ColumnKind, values: Vec<Value>) -> Result<Self> {
        let name = name.into();
        if let Some((row, bad)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_null() && !kind.accepts(v))
        {
            return Err(CohortError::InvalidDataset(format!(
                "column '{name}' is {kind} but row {row} holds a {} value",
                bad.type_name()
            )));
        }
        Ok(Column { name, kind, values })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cell at `row`; out-of-range rows read as null.
    pub fn get(&self, row: usize) -> &Value {
        self.values.get(row).unwrap_or(&Value::Null)
    }

    /// Sorted set of distinct non-null values.
    pub fn unique_values(&self) -> BTreeSet<Value> {
        self.values
            .iter()
            .filter(|v| !v.is_null())
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Dataset – the immutable table every cohort reads from
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    #[default]
    Classification,
    Regression,
}

/// Column-oriented table of model inputs, predictions and true labels.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Stored columns in insertion order.
    columns: Vec<Column>,
    /// column name → position in `columns`.
    positions: BTreeMap<String, usize>,
    /// Index / Classification Outcome / Regression Error, when applicable.
    derived: BTreeMap<&'static str, Column>,
    true_y: Option<String>,
    predicted_y: Option<String>,
    task: TaskKind,
    n_rows: usize,
}

impl Dataset {
    pub fn builder() -> DatasetBuilder {
        DatasetBuilder::default()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.n_rows
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    /// Row indices `0..N`.
    pub fn rows(&self) -> std::ops::Range<usize> {
        0..self.n_rows
    }

    pub fn task(&self) -> TaskKind {
        self.task
    }

    /// Names of the stored columns, in insertion order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name()).collect()
    }

    /// Resolve a column by name.
    ///
    /// Stored columns win; after that the label aliases and the derived
    /// columns are consulted.
    pub fn column(&self, name: &str) -> Option<&Column> {
        if let Some(&pos) = self.positions.get(name) {
            return Some(&self.columns[pos]);
        }
        match name {
            TRUE_Y_COLUMN => self.true_labels(),
            PREDICTED_Y_COLUMN => self.predicted_labels(),
            other => self.derived.get(other),
        }
    }

    /// The special column `name` refers to, unless a stored column shadows it.
    pub fn special_column(&self, name: &str) -> Option<SpecialColumn> {
        if self.positions.contains_key(name) {
            return None;
        }
        SpecialColumn::from_name(name)
    }

    /// Whether `name` resolves to the row index rather than a stored column.
    pub fn is_index_column(&self, name: &str) -> bool {
        self.special_column(name) == Some(SpecialColumn::Index)
    }

    /// Whether both label columns are designated.
    pub fn has_labels(&self) -> bool {
        self.true_labels().is_some() && self.predicted_labels().is_some()
    }

    pub fn true_labels(&self) -> Option<&Column> {
        self.true_y
            .as_deref()
            .and_then(|n| self.positions.get(n))
            .map(|&pos| &self.columns[pos])
    }

    pub fn predicted_labels(&self) -> Option<&Column> {
        self.predicted_y
            .as_deref()
            .and_then(|n| self.positions.get(n))
            .map(|&pos| &self.columns[pos])
    }

    pub fn unique_values(&self, column: &str) -> Option<BTreeSet<Value>> {
        self.column(column).map(Column::unique_values)
    }
}

/// Incremental constructor for [`Dataset`]; all checks run in [`build`](Self::build).
#[derive(Debug, Default)]
pub struct DatasetBuilder {
    columns: Vec<(String, Option<ColumnKind>, Vec<Value>)>,
    true_y: Option<String>,
    predicted_y: Option<String>,
    task: TaskKind,
}

impl DatasetBuilder {
    /// Add a column whose kind is inferred from its values.
    pub fn column<V: Into<Value>>(mut self, name: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.columns.push((name.into(), None, values));
        self
    }

    /// Add a column with an explicit kind.
    pub fn typed_column<V: Into<Value>>(
        mut self,
        name: impl Into<String>,
        kind: ColumnKind,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.columns.push((name.into(), Some(kind), values));
        self
    }

    /// Designate an added column as the true label.
    pub fn true_y(mut self, column: impl Into<String>) -> Self {
        self.true_y = Some(column.into());
        self
    }

    /// Designate an added column as the model prediction.
    pub fn predicted_y(mut self, column: impl Into<String>) -> Self {
        self.predicted_y = Some(column.into());
        self
    }

    pub fn task(mut self, task: TaskKind) -> Self {
        self.task = task;
        self
    }

    pub fn build(self) -> Result<Dataset> {
        let n_rows = self.columns.first().map(|(_, _, v)| v.len()).unwrap_or(0);

        let mut columns = Vec::with_capacity(self.columns.len());
        let mut positions = BTreeMap::new();
        for (name, kind, values) in self.columns {
            if values.len() != n_rows {
                return Err(CohortError::InvalidDataset(format!(
                    "column '{name}' has {} rows, expected {n_rows}",
                    values.len()
                )));
            }
            if positions.contains_key(&name) {
                return Err(CohortError::InvalidDataset(format!("duplicate column '{name}'")));
            }
            let column = match kind {
                Some(kind) => Column::with_kind(name.clone(), kind, values)?,
                None => Column::new(name.clone(), values)?,
            };
            positions.insert(name, columns.len());
            columns.push(column);
        }

        for label in [&self.true_y, &self.predicted_y].into_iter().flatten() {
            if !positions.contains_key(label) {
                return Err(CohortError::InvalidDataset(format!(
                    "label column '{label}' was not added to the dataset"
                )));
            }
        }

        let mut dataset = Dataset {
            columns,
            positions,
            derived: BTreeMap::new(),
            true_y: self.true_y,
            predicted_y: self.predicted_y,
            task: self.task,
            n_rows,
        };
        dataset.derived = derive_columns(&dataset)?;
        log::debug!(
            "Built dataset with {} rows and columns {:?}",
            dataset.n_rows,
            dataset.column_names()
        );
        Ok(dataset)
    }
}

// ---------------------------------------------------------------------------
// Derived columns
// ---------------------------------------------------------------------------

fn derive_columns(ds: &Dataset) -> Result<BTreeMap<&'static str, Column>> {
    let mut derived = BTreeMap::new();

    let index = (0..ds.n_rows).map(|i| Value::Integer(i as i64)).collect();
    derived.insert(
        INDEX_COLUMN,
        Column::with_kind(INDEX_COLUMN, ColumnKind::Numeric, index)?,
    );

    let (Some(truth), Some(pred)) = (ds.true_labels(), ds.predicted_labels()) else {
        return Ok(derived);
    };

    match ds.task {
        TaskKind::Classification => {
            let mut classes: Vec<Value> = truth.unique_values().union(&pred.unique_values()).cloned().collect();
            // Numerically equal labels sit next to each other in the order.
            classes.dedup_by(|a, b| a.same_as(b));
            // Outcomes only make sense with a single positive class.
            if let (1..=2, Some(positive)) = (classes.len(), classes.last()) {
                let outcomes = truth
                    .values()
                    .iter()
                    .zip(pred.values())
                    .map(|(t, p)| classification_outcome(t, p, positive))
                    .collect();
                derived.insert(
                    CLASSIFICATION_OUTCOME_COLUMN,
                    Column::with_kind(CLASSIFICATION_OUTCOME_COLUMN, ColumnKind::Categorical, outcomes)?,
                );
            }
        }
        TaskKind::Regression => {
            if truth.kind() == ColumnKind::Numeric && pred.kind() == ColumnKind::Numeric {
                let errors = truth
                    .values()
                    .iter()
                    .zip(pred.values())
                    .map(|(t, p)| match (t.as_f64(), p.as_f64()) {
                        (Some(t), Some(p)) => Value::Float((p - t).abs()),
                        _ => Value::Null,
                    })
                    .collect();
                derived.insert(
                    REGRESSION_ERROR_COLUMN,
                    Column::with_kind(REGRESSION_ERROR_COLUMN, ColumnKind::Numeric, errors)?,
                );
            }
        }
    }

    Ok(derived)
}

fn classification_outcome(truth: &Value, pred: &Value, positive: &Value) -> Value {
    if truth.is_null() || pred.is_null() {
        return Value::Null;
    }
    let outcome = match (truth.same_as(positive), pred.same_as(positive)) {
        (true, true) => TRUE_POSITIVE,
        (false, false) => TRUE_NEGATIVE,
        (false, true) => FALSE_POSITIVE,
        (true, false) => FALSE_NEGATIVE,
    };
    Value::from(outcome)
}
