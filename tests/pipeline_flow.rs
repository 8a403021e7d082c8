//! End-to-end pipeline runs against a scripted transport.

mod common;

use std::path::Path;
use std::sync::Arc;

use case_triage::clustering::{FAILURE_CLUSTER_NAME, FALLBACK_CLUSTER_NAME};
use case_triage::error::LlmError;
use case_triage::model::{AuditStatus, JobStatus, Outcome};
use case_triage::stats::UNASSIGNED_MODULE;

use common::{
    build_pipeline, standard_routes, two_sheet_workbook, RoutedTransport, MARKER_CLUSTERING,
    MARKER_TAGGING,
};

#[tokio::test]
async fn two_sheet_run_completes_with_warning_and_report() {
    let (jobs, pipeline, temp) = build_pipeline(Arc::new(standard_routes()));
    let job_id = jobs.create();
    pipeline
        .run_workbook(&job_id, two_sheet_workbook())
        .await;

    let snapshot = jobs.snapshot(&job_id);
    assert_eq!(snapshot.status, JobStatus::Completed, "logs: {:?}", snapshot.logs);
    assert!(snapshot.error.is_none());
    let report_url = snapshot.report_url.expect("completed jobs expose a report");
    assert!(report_url.starts_with("/reports/report_"));

    // Every step left a transcript line.
    for step in 1..=6 {
        assert!(
            snapshot.logs.iter().any(|line| line.contains(&format!("Step {step}/6"))),
            "missing step {step} in {:?}",
            snapshot.logs
        );
    }
    // Two rows survived ingest, one of them nameless but carrying a result.
    assert!(snapshot.logs.iter().any(|line| line.contains("Parsed 2 cases")));

    let report_path = temp
        .path()
        .join("reports")
        .join(report_url.trim_start_matches("/reports/"));
    let html = std::fs::read_to_string(&report_path).expect("report written");
    assert!(html.contains("Broken flows"));
    assert!(html.contains("Overall quality is acceptable."));
}

#[tokio::test]
async fn clustering_failure_collapses_into_one_fallback_cluster() {
    // Matching is first-wins, so the failing route shadows the standard one.
    let transport = RoutedTransport::new()
        .on(MARKER_CLUSTERING, |_| {
            Err(LlmError::Communication("service down".into()))
        })
        .merge_standard();
    let (jobs, pipeline, temp) = build_pipeline(Arc::new(transport));
    let job_id = jobs.create();
    pipeline
        .run_workbook(&job_id, two_sheet_workbook())
        .await;

    let snapshot = jobs.snapshot(&job_id);
    assert_eq!(snapshot.status, JobStatus::Completed, "logs: {:?}", snapshot.logs);
    let report_url = snapshot.report_url.expect("report still produced");
    let html = std::fs::read_to_string(
        temp.path()
            .join("reports")
            .join(report_url.trim_start_matches("/reports/")),
    )
    .expect("read report");
    assert!(html.contains(FAILURE_CLUSTER_NAME));
    assert!(!html.contains(FALLBACK_CLUSTER_NAME));
}

#[tokio::test]
async fn malformed_tagging_reply_keeps_cases_untagged() {
    let transport = RoutedTransport::new()
        .reply(MARKER_TAGGING, "I would rather chat about the weather.")
        .merge_standard();
    let (jobs, pipeline, temp) = build_pipeline(Arc::new(transport));
    let job_id = jobs.create();
    pipeline
        .run_workbook(&job_id, two_sheet_workbook())
        .await;

    let snapshot = jobs.snapshot(&job_id);
    assert_eq!(snapshot.status, JobStatus::Completed, "logs: {:?}", snapshot.logs);
    let report_url = snapshot.report_url.expect("report produced");
    let html = std::fs::read_to_string(
        temp.path()
            .join("reports")
            .join(report_url.trim_start_matches("/reports/")),
    )
    .expect("read report");
    // No case got a module, so stats fall back to the unassigned label.
    assert!(html.contains(UNASSIGNED_MODULE));
}

#[tokio::test]
async fn unreadable_input_fails_the_job_without_artifacts() {
    let (jobs, pipeline, _temp) = build_pipeline(Arc::new(standard_routes()));
    let job_id = jobs.create();
    pipeline
        .run_file(&job_id, Path::new("does/not/exist.csv"))
        .await;

    let snapshot = jobs.snapshot(&job_id);
    assert_eq!(snapshot.status, JobStatus::Failed);
    assert!(snapshot.report_url.is_none());
    let error = snapshot.error.expect("failure message recorded");
    assert!(error.contains("parse uploaded table"), "error: {error}");
    assert!(snapshot
        .logs
        .iter()
        .any(|line| line.contains("Pipeline failed")));
}

#[tokio::test]
async fn nameless_row_survives_ingest_with_a_warning() {
    use case_triage::config::Settings;
    use case_triage::ingest::{ingest_workbook, WARN_MISSING_NAME};
    use case_triage::llm::LlmClient;
    use std::time::Duration;

    let settings = Settings::default();
    let llm = LlmClient::new(Arc::new(standard_routes()), &settings)
        .with_backoff(Duration::from_millis(1), Duration::from_millis(4));
    let cases = ingest_workbook(&llm, &two_sheet_workbook()).await;

    assert_eq!(cases.len(), 2);
    let nameless = &cases[1];
    assert!(nameless.case_name.is_empty());
    assert_eq!(nameless.parse_warnings, vec![WARN_MISSING_NAME.to_string()]);
    assert_eq!(nameless.normalized_result, Outcome::Fail);
    assert_eq!(nameless.provenance.sheet, "regression");
    assert_eq!(nameless.provenance.row, 2);
}

#[tokio::test]
async fn audit_statuses_stay_within_the_allowed_set() {
    use case_triage::audit::audit_cases;
    use case_triage::config::Settings;
    use case_triage::ingest::ingest_workbook;
    use case_triage::llm::LlmClient;
    use std::time::Duration;

    let settings = Settings::default();
    let llm = LlmClient::new(Arc::new(standard_routes()), &settings)
        .with_backoff(Duration::from_millis(1), Duration::from_millis(4));
    let cases = ingest_workbook(&llm, &two_sheet_workbook()).await;
    let audited = audit_cases(&llm, cases, settings.batch_size).await;
    for case in &audited {
        if case.normalized_result == Outcome::Pass {
            assert!(matches!(
                case.audit_status,
                AuditStatus::Pass | AuditStatus::Flagged | AuditStatus::Unchecked
            ));
        } else {
            assert_eq!(case.audit_status, AuditStatus::Unchecked);
        }
    }
    // The scripted auditor flags the first Pass case it sees.
    assert!(audited
        .iter()
        .any(|case| case.audit_status == AuditStatus::Flagged));
}
