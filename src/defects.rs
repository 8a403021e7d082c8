//! Defect extraction: one structured summary per failed or blocked case.
//!
//! Concurrency here is per item, not per batch — every candidate case gets
//! its own call. A failing call simply yields no analysis for that case.
//! Ids are assigned only after the stage barrier, over the analyses that
//! survived, so the result vector is densely numbered and ready for linking.

use serde_json::Value;

use crate::batch::run_each;
use crate::llm::{ExpectedShape, LlmClient};
use crate::model::{CaseId, DefectAnalysis, Severity, TestCase};

const EXTRACTION_PROMPT: &str = include_str!("../prompts/defect_extraction.md");

pub async fn extract_defects(llm: &LlmClient, cases: &[TestCase]) -> Vec<DefectAnalysis> {
    let candidates: Vec<&TestCase> = cases
        .iter()
        .filter(|case| case.normalized_result.is_defective())
        .collect();
    let total = candidates.len();

    let results = run_each(candidates, |_, case| async move {
        let prompt = build_extraction_prompt(case);
        let reply = llm
            .invoke(&prompt, ExpectedShape::Object, llm.default_temperature)
            .await?;
        Ok(analysis_from_reply(case.id, &reply))
    })
    .await;

    let analyses: Vec<DefectAnalysis> = results
        .into_iter()
        .flatten()
        .enumerate()
        .map(|(id, mut analysis)| {
            analysis.id = id;
            analysis
        })
        .collect();
    tracing::info!(candidates = total, extracted = analyses.len(), "defect extraction complete");
    analyses
}

fn build_extraction_prompt(case: &TestCase) -> String {
    EXTRACTION_PROMPT
        .replace("{case_name}", &case.case_name)
        .replace("{steps}", case.steps.as_deref().unwrap_or("N/A"))
        .replace("{expected}", case.expected.as_deref().unwrap_or("N/A"))
        .replace("{actual}", case.actual.as_deref().unwrap_or("N/A"))
        .replace("{remark}", case.remark.as_deref().unwrap_or("N/A"))
}

fn analysis_from_reply(case_id: CaseId, reply: &Value) -> DefectAnalysis {
    let text = |field: &str| -> Option<String> {
        reply
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    let evidence = reply
        .get("evidence")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    DefectAnalysis {
        id: 0,
        case_id,
        phenomenon: text("phenomenon"),
        observed_fact: text("observed_fact"),
        hypothesis: text("hypothesis"),
        evidence,
        repro_steps: text("repro_steps"),
        severity_guess: reply
            .get("severity_guess")
            .and_then(Value::as_str)
            .and_then(Severity::parse),
    }
}
