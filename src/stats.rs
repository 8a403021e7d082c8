//! Aggregate statistics over a job's cases.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::model::{Outcome, TestCase};

/// Label used when a case never received a module.
pub const UNASSIGNED_MODULE: &str = "Unassigned";

const TOP_FAILED_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModuleFailures {
    pub module: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct JobStats {
    pub total_cases: usize,
    /// Case counts per canonical outcome.
    pub results: BTreeMap<String, usize>,
    /// Percent of Pass cases, rounded to two decimals.
    pub pass_rate: f64,
    pub modules: BTreeMap<String, usize>,
    pub top_failed_modules: Vec<ModuleFailures>,
}

pub fn compute_stats(cases: &[TestCase]) -> JobStats {
    let total = cases.len();
    if total == 0 {
        return JobStats::default();
    }

    let mut results: BTreeMap<String, usize> = BTreeMap::new();
    let mut modules: BTreeMap<String, usize> = BTreeMap::new();
    let mut failed_modules: BTreeMap<String, usize> = BTreeMap::new();
    for case in cases {
        *results
            .entry(case.normalized_result.as_str().to_string())
            .or_insert(0) += 1;
        let module = case
            .module
            .clone()
            .unwrap_or_else(|| UNASSIGNED_MODULE.to_string());
        *modules.entry(module.clone()).or_insert(0) += 1;
        if case.normalized_result.is_defective() {
            *failed_modules.entry(module).or_insert(0) += 1;
        }
    }

    let pass_count = results.get(Outcome::Pass.as_str()).copied().unwrap_or(0);
    let pass_rate = ((pass_count as f64 / total as f64) * 10_000.0).round() / 100.0;

    let mut top_failed: Vec<ModuleFailures> = failed_modules
        .into_iter()
        .map(|(module, count)| ModuleFailures { module, count })
        .collect();
    // Count descending, then name, for stable output.
    top_failed.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.module.cmp(&b.module)));
    top_failed.truncate(TOP_FAILED_LIMIT);

    JobStats {
        total_cases: total,
        results,
        pass_rate,
        modules,
        top_failed_modules: top_failed,
    }
}
