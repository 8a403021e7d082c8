//! Core entities threaded through the pipeline: test cases, defect analyses,
//! clusters, and job state.
//!
//! Identity is per-job and in-memory: cases and defects are numbered in the
//! order they are created, and links between entities are plain indices into
//! the job's vectors. Nothing here survives the process; the job store (see
//! `jobs.rs`) owns retention.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a [`TestCase`] within its job, assigned at ingest.
pub type CaseId = usize;

/// Index of a [`DefectAnalysis`] within its job, assigned at extraction.
pub type DefectId = usize;

/// Canonical execution outcome after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Outcome {
    Pass,
    Fail,
    Blocked,
    Skipped,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Pass => "Pass",
            Outcome::Fail => "Fail",
            Outcome::Blocked => "Blocked",
            Outcome::Skipped => "Skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Outcome> {
        match value {
            "Pass" => Some(Outcome::Pass),
            "Fail" => Some(Outcome::Fail),
            "Blocked" => Some(Outcome::Blocked),
            "Skipped" => Some(Outcome::Skipped),
            _ => None,
        }
    }

    /// Fail and Blocked cases feed the defect-extraction stage.
    pub fn is_defective(self) -> bool {
        matches!(self, Outcome::Fail | Outcome::Blocked)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict of the false-positive audit over Pass cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuditStatus {
    #[default]
    Unchecked,
    Pass,
    Flagged,
}

impl AuditStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditStatus::Unchecked => "Unchecked",
            AuditStatus::Pass => "Pass",
            AuditStatus::Flagged => "Flagged",
        }
    }
}

/// Severity estimate attached to an extracted defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

impl Severity {
    pub fn parse(value: &str) -> Option<Severity> {
        match value {
            "Critical" => Some(Severity::Critical),
            "Major" => Some(Severity::Major),
            "Minor" => Some(Severity::Minor),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::Major => "Major",
            Severity::Minor => "Minor",
        }
    }
}

/// Where a row came from. `row` is 1-based and accounts for the header row,
/// so row 2 is the first data row of the sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub file: String,
    pub sheet: String,
    pub row: usize,
}

/// One row of the source table after ingest.
///
/// Created by the ingest stage and then enriched in place by tagging, audit,
/// and extraction; never deleted within a job's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: CaseId,
    pub case_name: String,
    pub precondition: Option<String>,
    pub steps: Option<String>,
    pub expected: Option<String>,
    pub actual: Option<String>,
    /// Raw result string as found in the source column.
    pub test_result: String,
    pub normalized_result: Outcome,
    pub priority: Option<String>,
    pub executor: Option<String>,
    pub remark: Option<String>,
    pub provenance: Provenance,
    /// Non-fatal data-quality findings recorded during ingest.
    pub parse_warnings: Vec<String>,
    pub module: Option<String>,
    pub module_confidence: Option<f64>,
    #[serde(default)]
    pub audit_status: AuditStatus,
    pub audit_reason: Option<String>,
    /// Set after the extraction stage completes; at most one per case.
    pub defect: Option<DefectId>,
}

/// Structured defect summary derived from exactly one failed/blocked case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefectAnalysis {
    pub id: DefectId,
    pub case_id: CaseId,
    pub phenomenon: Option<String>,
    pub observed_fact: Option<String>,
    pub hypothesis: Option<String>,
    #[serde(default)]
    pub evidence: Vec<String>,
    pub repro_steps: Option<String>,
    pub severity_guess: Option<Severity>,
}

/// A named group of defects sharing a semantic cause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefectCluster {
    pub name: String,
    pub summary: String,
    pub risk_assessment: String,
    pub members: Vec<DefectId>,
}

/// Job lifecycle as exposed on the polling surface. `Unknown` only ever
/// appears for identities the store has never seen (or has evicted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Unknown,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Unknown => "unknown",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_round_trips_through_strings() {
        for outcome in [Outcome::Pass, Outcome::Fail, Outcome::Blocked, Outcome::Skipped] {
            assert_eq!(Outcome::parse(outcome.as_str()), Some(outcome));
        }
        assert_eq!(Outcome::parse("passed"), None);
    }

    #[test]
    fn only_fail_and_blocked_are_defective() {
        assert!(Outcome::Fail.is_defective());
        assert!(Outcome::Blocked.is_defective());
        assert!(!Outcome::Pass.is_defective());
        assert!(!Outcome::Skipped.is_defective());
    }

    #[test]
    fn audit_status_defaults_to_unchecked() {
        assert_eq!(AuditStatus::default(), AuditStatus::Unchecked);
    }

    #[test]
    fn job_status_serializes_lowercase() {
        let text = serde_json::to_string(&JobStatus::Running).unwrap();
        assert_eq!(text, "\"running\"");
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
    }
}
