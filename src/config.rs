use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cohort::CohortDefinition;

/// Settings for the `cohort-explorer` binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// Seed for the synthetic dataset.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Number of synthetic rows.
    #[serde(default = "default_rows")]
    pub rows: usize,
    /// Cohorts to build in addition to "All data".
    #[serde(default)]
    pub cohorts: Vec<CohortDefinition>,
}

fn default_seed() -> u64 {
    42
}

fn default_rows() -> usize {
    1000
}

impl ExplorerConfig {
    /// A config with a few cohorts over the synthetic census columns.
    pub fn sample() -> Result<Self> {
        let value = serde_json::json!({
            "seed": default_seed(),
            "rows": default_rows(),
            "cohorts": [
                {
                    "name": "Cohort Continuous",
                    "cohort_filter_list": [
                        {"method": "less", "arg": [65], "column": "age"},
                        {"method": "greater", "arg": [40], "column": "hours_per_week"}
                    ]
                },
                {
                    "name": "Cohort Categorical",
                    "cohort_filter_list": [
                        {"method": "includes", "arg": ["Bachelors", "Masters"], "column": "education"}
                    ]
                },
                {
                    "name": "Cohort Index",
                    "cohort_filter_list": [
                        {"method": "less", "arg": [20], "column": "Index"}
                    ]
                },
                {
                    "name": "Cohort Errors",
                    "cohort_filter_list": [
                        {
                            "operation": "or",
                            "compositeFilters": [
                                {"method": "includes", "arg": ["False positive"], "column": "Classification Outcome"},
                                {"method": "includes", "arg": ["False negative"], "column": "Classification Outcome"}
                            ]
                        }
                    ]
                }
            ]
        });
        serde_json::from_value(value).context("building sample config")
    }
}

/// Load a JSON configuration from disk, creating it with the provided initializer if missing.
pub fn load_or_init<F>(path: &Path, initializer: F) -> Result<ExplorerConfig>
where
    F: FnOnce() -> Result<ExplorerConfig>,
{
    if path.exists() {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let value = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;
        Ok(value)
    } else {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        let value = initializer()?;
        let serialized = serde_json::to_string_pretty(&value)?;
        fs::write(path, serialized)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        log::info!("Wrote default config to {}", path.display());
        Ok(value)
    }
}
