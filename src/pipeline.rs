//! Pipeline stage sequencer: the per-job state machine.
//!
//! pending -> running -> {completed, failed}, terminal either way. Stage
//! internals carry their own resilience (retries in the invocation layer,
//! per-batch and per-item fallbacks in the stages); there is no retry at
//! this level. Any error that escapes a stage fails the job with its message
//! on the polling surface, and no partial artifacts are published — the
//! report is written only after every stage has succeeded.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::audit::audit_cases;
use crate::clustering::cluster_defects;
use crate::config::Settings;
use crate::defects::extract_defects;
use crate::ingest::ingest_workbook;
use crate::jobs::JobStore;
use crate::link::{attach_defects, verify_cluster_coverage};
use crate::llm::LlmClient;
use crate::model::{AuditStatus, DefectAnalysis, DefectCluster, TestCase};
use crate::report::{generate_summary, render_report, report_file_name, write_report};
use crate::stats::{compute_stats, JobStats};
use crate::tabular::Workbook;
use crate::tagging::tag_cases;

/// Everything a completed job produced, assembled only after the final
/// stage succeeded.
#[derive(Debug)]
pub struct PipelineOutput {
    pub cases: Vec<TestCase>,
    pub defects: Vec<DefectAnalysis>,
    pub clusters: Vec<DefectCluster>,
    pub stats: JobStats,
    pub report_path: PathBuf,
    pub report_url: String,
}

pub struct Pipeline {
    llm: Arc<LlmClient>,
    jobs: Arc<JobStore>,
    batch_size: usize,
    report_dir: PathBuf,
}

impl Pipeline {
    pub fn new(llm: Arc<LlmClient>, jobs: Arc<JobStore>, settings: &Settings) -> Pipeline {
        Pipeline {
            llm,
            jobs,
            batch_size: settings.batch_size,
            report_dir: settings.report_dir.clone(),
        }
    }

    /// Drive a job over an uploaded file to a terminal status.
    pub async fn run_file(&self, job_id: &str, path: &Path) {
        self.jobs.mark_running(job_id);
        let result = match Workbook::load_csv(path) {
            Ok(workbook) => self.run_stages(job_id, workbook).await,
            Err(err) => Err(err.context("parse uploaded table")),
        };
        self.finish(job_id, result);
    }

    /// Drive a job over an already-loaded workbook to a terminal status.
    pub async fn run_workbook(&self, job_id: &str, workbook: Workbook) {
        self.jobs.mark_running(job_id);
        let result = self.run_stages(job_id, workbook).await;
        self.finish(job_id, result);
    }

    fn finish(&self, job_id: &str, result: Result<PipelineOutput>) {
        match result {
            Ok(output) => {
                self.jobs
                    .append_log(job_id, format!("Report ready: {}", output.report_url));
                self.jobs.append_log(job_id, "Pipeline completed.");
                self.jobs.mark_completed(job_id, output.report_url);
                tracing::info!(%job_id, cases = output.cases.len(), "job completed");
            }
            Err(err) => {
                let message = error_chain_message(&err);
                self.jobs
                    .append_log(job_id, format!("Pipeline failed: {message}"));
                self.jobs.mark_failed(job_id, message);
                tracing::error!(%job_id, error = %err, "job failed");
            }
        }
    }

    async fn run_stages(&self, job_id: &str, workbook: Workbook) -> Result<PipelineOutput> {
        let log = |line: String| self.jobs.append_log(job_id, line);

        log("Step 1/6: parsing and normalizing the table.".to_string());
        let mut cases = ingest_workbook(&self.llm, &workbook).await;
        log(format!("Parsed {} cases.", cases.len()));

        log("Step 2/6: module tagging (concurrent).".to_string());
        cases = tag_cases(&self.llm, cases, self.batch_size).await;

        log("Step 3/6: result audit (checking for false positives).".to_string());
        cases = audit_cases(&self.llm, cases, self.batch_size).await;
        let flagged = cases
            .iter()
            .filter(|case| case.audit_status == AuditStatus::Flagged)
            .count();
        log(format!("Found {flagged} suspicious cases."));

        log("Step 4/6: computing statistics.".to_string());
        let stats = compute_stats(&cases);

        log("Step 5/6: extracting defect facts (concurrent).".to_string());
        let defects = extract_defects(&self.llm, &cases).await;
        attach_defects(&mut cases, &defects);
        log(format!("Extracted {} defect analyses.", defects.len()));

        log("Step 6/6: clustering defects and generating the report.".to_string());
        let clusters = cluster_defects(&self.llm, &defects).await;
        verify_cluster_coverage(&defects, &clusters).context("cluster coverage invariant")?;

        let summary = generate_summary(&self.llm, &stats, &clusters, flagged).await;
        let generated_at = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
        let html = render_report(
            job_id,
            &generated_at,
            &summary,
            &stats,
            &cases,
            &defects,
            &clusters,
        );
        let report_path = write_report(&self.report_dir, job_id, &html).await?;
        let report_url = format!("/reports/{}", report_file_name(job_id));

        Ok(PipelineOutput {
            cases,
            defects,
            clusters,
            stats,
            report_path,
            report_url,
        })
    }
}

fn error_chain_message(err: &anyhow::Error) -> String {
    err.chain()
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}
