use super::model::{Dataset, TaskKind, Value};
use crate::error::Result;

/// Minimal deterministic PRNG (xoshiro256**)
pub(crate) struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    pub(crate) fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    /// Uniform in `[0, 1)`.
    pub(crate) fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform integer in `[lo, hi]`; `lo` when `hi <= lo`.
    pub(crate) fn range(&mut self, lo: i64, hi: i64) -> i64 {
        if hi <= lo {
            return lo;
        }
        let span = hi.abs_diff(lo).saturating_add(1);
        lo.wrapping_add((self.next_u64() % span) as i64)
    }

    /// `None` for an empty slice.
    pub(crate) fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        items.get((self.next_u64() % items.len() as u64) as usize)
    }
}

pub const INCOME_LABEL: &str = "income";
pub const INCOME_PREDICTION: &str = "predicted_income";

const EDUCATION: [&str; 4] = ["HS-grad", "Some-college", "Bachelors", "Masters"];
const OCCUPATION: [&str; 5] = ["Sales", "Tech-support", "Craft-repair", "Exec-managerial", "Other-service"];

/// Generate an adult-census style binary classification dataset.
///
/// Columns: `age`, `hours_per_week` (about 5% missing), `education`,
/// `occupation`, `married`, plus the `income` label and a noisy
/// `predicted_income`. The same seed always yields the same table.
pub fn generate(rows: usize, seed: u64) -> Result<Dataset> {
    let mut rng = SimpleRng::new(seed);

    let mut age = Vec::with_capacity(rows);
    let mut hours = Vec::with_capacity(rows);
    let mut education = Vec::with_capacity(rows);
    let mut occupation = Vec::with_capacity(rows);
    let mut married = Vec::with_capacity(rows);
    let mut income = Vec::with_capacity(rows);
    let mut predicted = Vec::with_capacity(rows);

    for _ in 0..rows {
        let a = rng.range(18, 80);
        let h = 20.0 + (rng.next_f64() * 45.0).round();
        let edu_idx = rng.range(0, EDUCATION.len() as i64 - 1) as usize;
        let m = rng.next_f64() < 0.5;

        // Income odds rise with education, hours, marriage and mid-career age.
        let mut score = edu_idx as f64 * 0.15 + (h - 20.0) / 150.0;
        if m {
            score += 0.15;
        }
        if (35..=60).contains(&a) {
            score += 0.1;
        }
        let high = rng.next_f64() < score;
        // The model sees a blurred score, so it errs near the boundary.
        let predicted_high = score + (rng.next_f64() - 0.5) * 0.3 > 0.5;

        age.push(Value::Integer(a));
        hours.push(if rng.next_f64() < 0.05 {
            Value::Null
        } else {
            Value::Float(h)
        });
        education.push(Value::from(EDUCATION[edu_idx]));
        occupation.push(rng.choose(&OCCUPATION).map_or(Value::Null, |o| Value::from(*o)));
        married.push(Value::Bool(m));
        income.push(Value::from(if high { ">50K" } else { "<=50K" }));
        predicted.push(Value::from(if predicted_high { ">50K" } else { "<=50K" }));
    }

    log::debug!("Generated {rows} synthetic rows with seed {seed}");

    Dataset::builder()
        .column("age", age)
        .column("hours_per_week", hours)
        .column("education", education)
        .column("occupation", occupation)
        .column("married", married)
        .column(INCOME_LABEL, income)
        .column(INCOME_PREDICTION, predicted)
        .true_y(INCOME_LABEL)
        .predicted_y(INCOME_PREDICTION)
        .task(TaskKind::Classification)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{ColumnKind, CLASSIFICATION_OUTCOME_COLUMN};

    #[test]
    fn same_seed_same_table() {
        let a = generate(50, 7).unwrap();
        let b = generate(50, 7).unwrap();
        assert_eq!(a.column("age"), b.column("age"));
        assert_eq!(a.column("income"), b.column("income"));
    }

    #[test]
    fn schema_and_derived_columns() {
        let ds = generate(200, 42).unwrap();
        assert_eq!(ds.len(), 200);
        assert_eq!(ds.column("hours_per_week").unwrap().kind(), ColumnKind::Numeric);
        assert_eq!(ds.column("married").unwrap().kind(), ColumnKind::Boolean);
        assert!(ds.column(CLASSIFICATION_OUTCOME_COLUMN).is_some());
    }

    #[test]
    fn range_stays_in_bounds() {
        let mut rng = SimpleRng::new(1);
        for _ in 0..1000 {
            let v = rng.range(18, 80);
            assert!((18..=80).contains(&v));
        }
    }

    #[test]
    fn degenerate_inputs_do_not_panic() {
        let mut rng = SimpleRng::new(3);
        assert_eq!(rng.range(5, 5), 5);
        assert_eq!(rng.range(5, 3), 5);
        rng.range(i64::MIN, i64::MAX);
        assert_eq!(rng.choose::<&str>(&[]), None);
        assert_eq!(rng.choose(&["only"]), Some(&"only"));
    }
}
