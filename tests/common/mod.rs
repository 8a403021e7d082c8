//! Shared test infrastructure: a routed mock transport and workbook
//! fixtures for driving the full pipeline without a real service.

// Each integration test binary compiles this module separately and uses a
// different subset of it.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use case_triage::config::Settings;
use case_triage::error::LlmError;
use case_triage::jobs::JobStore;
use case_triage::llm::{ChatReply, ChatTransport, LlmClient};
use case_triage::pipeline::Pipeline;
use case_triage::tabular::{Sheet, Workbook};

/// Marker substrings that identify each stage's prompt template.
pub const MARKER_COLUMN_MAPPING: &str = "data-parsing engine";
pub const MARKER_NORMALIZATION: &str = "raw test-result value";
pub const MARKER_TAGGING: &str = "classification engine";
pub const MARKER_AUDIT: &str = "strict QA auditor";
pub const MARKER_EXTRACTION: &str = "extract the defect facts";
pub const MARKER_CLUSTERING: &str = "Group the defects below";
pub const MARKER_SUMMARY: &str = "executive summary";

type Responder = Box<dyn Fn(&str) -> Result<String, LlmError> + Send + Sync>;

/// Transport that answers each prompt with the first route whose marker the
/// prompt contains. Unrouted prompts fail as communication errors.
#[derive(Default)]
pub struct RoutedTransport {
    routes: Vec<(&'static str, Responder)>,
}

impl RoutedTransport {
    pub fn new() -> RoutedTransport {
        RoutedTransport { routes: Vec::new() }
    }

    pub fn on(
        mut self,
        marker: &'static str,
        responder: impl Fn(&str) -> Result<String, LlmError> + Send + Sync + 'static,
    ) -> RoutedTransport {
        self.routes.push((marker, Box::new(responder)));
        self
    }

    pub fn reply(self, marker: &'static str, text: &str) -> RoutedTransport {
        let canned = text.to_string();
        self.on(marker, move |_| Ok(canned.clone()))
    }

    /// Append the standard routes after whatever overrides are already
    /// registered; matching is first-wins.
    pub fn merge_standard(mut self) -> RoutedTransport {
        let standard = standard_routes();
        self.routes.extend(standard.routes);
        self
    }
}

#[async_trait]
impl ChatTransport for RoutedTransport {
    async fn complete(&self, prompt: &str, _temperature: f64) -> Result<ChatReply, LlmError> {
        for (marker, responder) in &self.routes {
            if prompt.contains(marker) {
                return responder(prompt).map(|text| ChatReply {
                    text,
                    total_tokens: 5,
                });
            }
        }
        Err(LlmError::Communication(format!(
            "no route for prompt starting: {}",
            prompt.chars().take(60).collect::<String>()
        )))
    }
}

/// Routes that answer every stage sensibly for the standard fixtures.
pub fn standard_routes() -> RoutedTransport {
    RoutedTransport::new()
        .reply(
            MARKER_COLUMN_MAPPING,
            r#"{"Title": "case_name", "Status": "test_result", "Expected": "expected", "Actual": "actual", "Remark": "remark"}"#,
        )
        .reply(
            MARKER_NORMALIZATION,
            r#"{"passed": "Pass", "failed": "Fail", "blocked": "Blocked"}"#,
        )
        .on(MARKER_TAGGING, |_| {
            let entries: Vec<String> = (0..10)
                .map(|index| format!(r#"{{"id": {index}, "module": "Login"}}"#))
                .collect();
            Ok(format!("[{}]", entries.join(",")))
        })
        .on(MARKER_AUDIT, |prompt| {
            // Flag the first audited case, pass the rest.
            let ids = audit_ids(prompt);
            let results: Vec<String> = ids
                .iter()
                .enumerate()
                .map(|(position, id)| {
                    if position == 0 {
                        format!(
                            r#"{{"id": "{id}", "status": "Flagged", "reason": "actual result contradicts the verdict"}}"#
                        )
                    } else {
                        format!(r#"{{"id": "{id}", "status": "Pass", "reason": ""}}"#)
                    }
                })
                .collect();
            Ok(format!(r#"{{"results": [{}]}}"#, results.join(",")))
        })
        .reply(
            MARKER_EXTRACTION,
            r#"```json
{"phenomenon": "action has no effect", "observed_fact": "no request issued", "hypothesis": "handler unbound", "evidence": ["log is empty"], "repro_steps": "run the case again", "severity_guess": "Major"}
```"#,
        )
        .on(MARKER_CLUSTERING, |prompt| {
            let ids = clustering_ids(prompt);
            let quoted: Vec<String> = ids.iter().map(|id| format!("\"{id}\"")).collect();
            Ok(format!(
                r#"{{"clusters": [{{"cluster_name": "Broken flows", "summary": "actions without effect", "risk_assessment": "medium", "defect_ids": [{}]}}]}}"#,
                quoted.join(",")
            ))
        })
        .reply(MARKER_SUMMARY, "<p>Overall quality is acceptable.</p>")
}

/// Pull the case ids out of an audit prompt (entries look like "id": "3").
pub fn audit_ids(prompt: &str) -> Vec<String> {
    let mut ids = Vec::new();
    for chunk in prompt.split("\"id\":\"").skip(1) {
        if let Some(end) = chunk.find('"') {
            ids.push(chunk[..end].to_string());
        }
    }
    ids
}

/// Pull the defect indices out of a clustering prompt ("ID: 0 | ...").
pub fn clustering_ids(prompt: &str) -> Vec<usize> {
    let mut ids = Vec::new();
    for chunk in prompt.split("ID: ").skip(1) {
        let digits: String = chunk.chars().take_while(|ch| ch.is_ascii_digit()).collect();
        if let Ok(id) = digits.parse() {
            ids.push(id);
        }
    }
    ids
}

/// Two sheets, one row each; the second row is missing its case name but
/// carries a result, so it must survive ingest with a warning.
pub fn two_sheet_workbook() -> Workbook {
    Workbook {
        file_name: "nightly.csv".to_string(),
        sheets: vec![
            Sheet {
                name: "smoke".to_string(),
                headers: headers(),
                rows: vec![row(&[
                    "login works",
                    "passed",
                    "dashboard shown",
                    "error 500 shown",
                    "",
                ])],
            },
            Sheet {
                name: "regression".to_string(),
                headers: headers(),
                rows: vec![row(&["", "failed", "export succeeds", "export crashes", ""])],
            },
        ],
    }
}

fn headers() -> Vec<String> {
    ["Title", "Status", "Expected", "Actual", "Remark"]
        .iter()
        .map(|header| header.to_string())
        .collect()
}

fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|cell| cell.to_string()).collect()
}

/// Pipeline wired to the given transport; report dir lives in the returned
/// tempdir.
pub fn build_pipeline(
    transport: Arc<dyn ChatTransport>,
) -> (Arc<JobStore>, Pipeline, tempfile::TempDir) {
    let temp = tempfile::tempdir().expect("create temp dir");
    let settings = Settings {
        report_dir: temp.path().join("reports"),
        upload_dir: temp.path().join("uploads"),
        ..Settings::default()
    };
    let llm = Arc::new(
        LlmClient::new(transport, &settings)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(4)),
    );
    let jobs = Arc::new(JobStore::new(settings.job_capacity));
    let pipeline = Pipeline::new(llm, Arc::clone(&jobs), &settings);
    (jobs, pipeline, temp)
}
