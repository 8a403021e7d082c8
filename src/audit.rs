//! Result audit: batched false-positive detection over Pass cases.
//!
//! Only cases whose normalized result is Pass are sent out; everything else
//! passes through untouched. Matching between reply entries and cases goes
//! through the string form of the case id, since ids here are in-memory
//! indices rather than persistent numbers. The defaults are fail-safe: an
//! unmatched case, an unparseable verdict, or a failed batch all leave the
//! case Unchecked — a parse failure can never silently confirm a Pass.

use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::batch::run_batched;
use crate::llm::{ExpectedShape, LlmClient};
use crate::model::{AuditStatus, Outcome, TestCase};

/// Audit verdicts want determinism over creativity.
const AUDIT_TEMPERATURE: f64 = 0.1;

const AUDIT_PROMPT: &str = include_str!("../prompts/result_audit.md");

pub async fn audit_cases(
    llm: &LlmClient,
    mut cases: Vec<TestCase>,
    batch_size: usize,
) -> Vec<TestCase> {
    let pass_positions: Vec<usize> = cases
        .iter()
        .enumerate()
        .filter(|(_, case)| case.normalized_result == Outcome::Pass)
        .map(|(position, _)| position)
        .collect();
    if pass_positions.is_empty() {
        return cases;
    }

    let pass_cases: Vec<TestCase> = pass_positions
        .iter()
        .map(|&position| cases[position].clone())
        .collect();
    let audited = run_batched(pass_cases, batch_size, |_, batch| async move {
        let prompt = build_audit_prompt(&batch);
        let reply = llm
            .invoke(&prompt, ExpectedShape::Object, AUDIT_TEMPERATURE)
            .await?;
        Ok(apply_verdicts(batch, &reply))
    })
    .await;

    for (position, case) in pass_positions.into_iter().zip(audited) {
        cases[position] = case;
    }
    let flagged = cases
        .iter()
        .filter(|case| case.audit_status == AuditStatus::Flagged)
        .count();
    tracing::info!(flagged, "result audit complete");
    cases
}

fn build_audit_prompt(batch: &[TestCase]) -> String {
    let entries: Vec<Value> = batch
        .iter()
        .map(|case| {
            json!({
                "id": case.id.to_string(),
                "case_name": case.case_name,
                "expected": case.expected.as_deref().unwrap_or("N/A"),
                "actual": case.actual.as_deref().unwrap_or("N/A"),
                "remark": case.remark.as_deref().unwrap_or("N/A"),
            })
        })
        .collect();
    AUDIT_PROMPT.replace("{cases}", &json!(entries).to_string())
}

fn apply_verdicts(mut batch: Vec<TestCase>, reply: &Value) -> Vec<TestCase> {
    let mut verdicts: BTreeMap<String, &Value> = BTreeMap::new();
    if let Some(results) = reply.get("results").and_then(Value::as_array) {
        for entry in results {
            if let Some(id) = entry.get("id") {
                // Ids may come back as strings or bare numbers.
                let key = match id {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                verdicts.insert(key, entry);
            }
        }
    }

    for case in &mut batch {
        let Some(entry) = verdicts.get(&case.id.to_string()) else {
            continue;
        };
        match entry.get("status").and_then(Value::as_str) {
            Some("Pass") => case.audit_status = AuditStatus::Pass,
            Some("Flagged") => case.audit_status = AuditStatus::Flagged,
            _ => continue,
        }
        case.audit_reason = entry
            .get("reason")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
            .map(str::to_string);
    }
    batch
}
