//! Report rendering: the final HTML artifact for a completed job.
//!
//! The document skeleton is a compile-time template with `{placeholder}`
//! slots; sections are assembled by string pushing and all user-supplied
//! text is HTML-escaped. The executive summary is the one generative call in
//! this module and it degrades to a fixed paragraph on any failure — a
//! report is still produced.

use anyhow::{Context, Result};
use serde_json::json;
use std::path::{Path, PathBuf};

use crate::llm::extract::strip_code_fences;
use crate::llm::LlmClient;
use crate::model::{AuditStatus, DefectAnalysis, DefectCluster, TestCase};
use crate::stats::JobStats;

const REPORT_TEMPLATE: &str = include_str!("../templates/report.html");
const SUMMARY_PROMPT: &str = include_str!("../prompts/report_summary.md");

pub const SUMMARY_FALLBACK: &str = "<p>Summary generation failed.</p>";

pub fn report_file_name(job_id: &str) -> String {
    format!("report_{job_id}.html")
}

/// Ask the service for an executive summary. Never fails; the fallback
/// paragraph stands in when the call or its output is unusable.
pub async fn generate_summary(
    llm: &LlmClient,
    stats: &JobStats,
    clusters: &[DefectCluster],
    flagged_count: usize,
) -> String {
    let cluster_names: Vec<&str> = clusters.iter().map(|cluster| cluster.name.as_str()).collect();
    let flagged_note = if flagged_count > 0 {
        format!(
            "Note: the result audit flagged {flagged_count} cases as suspected false positives; address what that means for data credibility."
        )
    } else {
        String::new()
    };
    let prompt = SUMMARY_PROMPT
        .replace("{stats}", &json!(stats).to_string())
        .replace("{clusters}", &json!(cluster_names).to_string())
        .replace("{flagged_note}", &flagged_note);

    match llm.invoke_text(&prompt, llm.default_temperature).await {
        Ok(text) => {
            let cleaned = strip_code_fences(&text).replace("```html", "").replace("```", "");
            let cleaned = cleaned.trim().to_string();
            if cleaned.is_empty() {
                SUMMARY_FALLBACK.to_string()
            } else {
                cleaned
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "summary generation failed; using fallback paragraph");
            SUMMARY_FALLBACK.to_string()
        }
    }
}

/// Render the full report document.
#[allow(clippy::too_many_arguments)]
pub fn render_report(
    job_id: &str,
    generated_at: &str,
    summary_html: &str,
    stats: &JobStats,
    cases: &[TestCase],
    defects: &[DefectAnalysis],
    clusters: &[DefectCluster],
) -> String {
    REPORT_TEMPLATE
        .replace("{job_id}", &escape_html(job_id))
        .replace("{generated_at}", &escape_html(generated_at))
        // Summary is already HTML by contract; everything else is escaped.
        .replace("{summary}", summary_html)
        .replace("{stats_section}", &stats_section(stats))
        .replace("{clusters_section}", &clusters_section(clusters, defects, cases))
        .replace("{flagged_section}", &flagged_section(cases))
        .replace("{defects_section}", &defects_section(defects, cases))
        .replace("{cases_section}", &cases_section(cases))
}

/// Render and write the report under `report_dir`, returning its path.
pub async fn write_report(
    report_dir: &Path,
    job_id: &str,
    contents: &str,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(report_dir)
        .await
        .with_context(|| format!("create {}", report_dir.display()))?;
    let path = report_dir.join(report_file_name(job_id));
    tokio::fs::write(&path, contents.as_bytes())
        .await
        .with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

fn stats_section(stats: &JobStats) -> String {
    let mut out = String::new();
    out.push_str("<table><tr><th>Metric</th><th>Value</th></tr>\n");
    push_row(&mut out, "Total cases", &stats.total_cases.to_string());
    push_row(&mut out, "Pass rate", &format!("{:.2}%", stats.pass_rate));
    for (outcome, count) in &stats.results {
        push_row(&mut out, outcome, &count.to_string());
    }
    out.push_str("</table>\n");

    if !stats.top_failed_modules.is_empty() {
        out.push_str("<p>Top failed modules:</p>\n<ul>\n");
        for entry in &stats.top_failed_modules {
            out.push_str(&format!(
                "<li>{} ({})</li>\n",
                escape_html(&entry.module),
                entry.count
            ));
        }
        out.push_str("</ul>\n");
    }
    out
}

fn clusters_section(
    clusters: &[DefectCluster],
    defects: &[DefectAnalysis],
    cases: &[TestCase],
) -> String {
    if clusters.is_empty() {
        return "<p>No defect clusters.</p>\n".to_string();
    }
    let mut out = String::new();
    for cluster in clusters {
        out.push_str("<div class=\"cluster\">\n");
        out.push_str(&format!(
            "<h3>{} ({} defects)</h3>\n",
            escape_html(&cluster.name),
            cluster.members.len()
        ));
        if !cluster.summary.is_empty() {
            out.push_str(&format!("<p>{}</p>\n", escape_html(&cluster.summary)));
        }
        if !cluster.risk_assessment.is_empty() {
            out.push_str(&format!(
                "<p><strong>Risk:</strong> {}</p>\n",
                escape_html(&cluster.risk_assessment)
            ));
        }
        out.push_str("<ul>\n");
        for &member in &cluster.members {
            let Some(defect) = defects.get(member) else {
                continue;
            };
            let case_name = cases
                .get(defect.case_id)
                .map(|case| case.case_name.as_str())
                .unwrap_or("unknown case");
            let phenomenon = defect.phenomenon.as_deref().unwrap_or("no description");
            out.push_str(&format!(
                "<li>{}: {}</li>\n",
                escape_html(case_name),
                escape_html(phenomenon)
            ));
        }
        out.push_str("</ul>\n</div>\n");
    }
    out
}

fn flagged_section(cases: &[TestCase]) -> String {
    let flagged: Vec<&TestCase> = cases
        .iter()
        .filter(|case| case.audit_status == AuditStatus::Flagged)
        .collect();
    if flagged.is_empty() {
        return "<p>No suspected false positives.</p>\n".to_string();
    }
    let mut out = String::new();
    out.push_str("<table><tr><th>Case</th><th>Reason</th><th>Source</th></tr>\n");
    for case in flagged {
        out.push_str(&format!(
            "<tr class=\"flagged\"><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape_html(&case.case_name),
            escape_html(case.audit_reason.as_deref().unwrap_or("")),
            escape_html(&source_label(case)),
        ));
    }
    out.push_str("</table>\n");
    out
}

fn defects_section(defects: &[DefectAnalysis], cases: &[TestCase]) -> String {
    if defects.is_empty() {
        return "<p>No defects extracted.</p>\n".to_string();
    }
    let mut out = String::new();
    out.push_str(
        "<table><tr><th>Case</th><th>Severity</th><th>Phenomenon</th><th>Hypothesis</th></tr>\n",
    );
    for defect in defects {
        let case_name = cases
            .get(defect.case_id)
            .map(|case| case.case_name.as_str())
            .unwrap_or("unknown case");
        out.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape_html(case_name),
            defect
                .severity_guess
                .map(|severity| severity.as_str())
                .unwrap_or("-"),
            escape_html(defect.phenomenon.as_deref().unwrap_or("")),
            escape_html(defect.hypothesis.as_deref().unwrap_or("")),
        ));
    }
    out.push_str("</table>\n");
    out
}

fn cases_section(cases: &[TestCase]) -> String {
    let mut out = String::new();
    out.push_str(
        "<table><tr><th>#</th><th>Case</th><th>Module</th><th>Result</th><th>Audit</th><th>Source</th></tr>\n",
    );
    for case in cases {
        out.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            case.id,
            escape_html(&case.case_name),
            escape_html(case.module.as_deref().unwrap_or("-")),
            case.normalized_result.as_str(),
            case.audit_status.as_str(),
            escape_html(&source_label(case)),
        ));
    }
    out.push_str("</table>\n");
    out
}

fn push_row(out: &mut String, label: &str, value: &str) {
    out.push_str(&format!(
        "<tr><td>{}</td><td>{}</td></tr>\n",
        escape_html(label),
        escape_html(value)
    ));
}

fn source_label(case: &TestCase) -> String {
    format!(
        "{} / {} row {}",
        case.provenance.file, case.provenance.sheet, case.provenance.row
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
