//! Module tagging: batched classification of cases into product modules.
//!
//! Each batch prompt carries a locally-scoped index and truncated text
//! fields to bound prompt size. Replies are applied entry by entry; an
//! out-of-range index or a malformed entry is skipped, and a case no entry
//! resolves keeps whatever module it already had.

use serde_json::{json, Value};

use crate::batch::run_batched;
use crate::llm::{ExpectedShape, LlmClient};
use crate::model::TestCase;
use crate::util::truncate_string;

/// Confidence recorded for service-assigned modules.
pub const MODULE_CONFIDENCE: f64 = 0.9;

const PRECONDITION_LIMIT: usize = 50;
const STEPS_LIMIT: usize = 100;
const EXPECTED_LIMIT: usize = 50;

const TAGGING_PROMPT: &str = include_str!("../prompts/module_tagging.md");

pub async fn tag_cases(llm: &LlmClient, cases: Vec<TestCase>, batch_size: usize) -> Vec<TestCase> {
    let total = cases.len();
    let cases = run_batched(cases, batch_size, |_, batch| async move {
        let prompt = build_tagging_prompt(&batch);
        let reply = llm
            .invoke(&prompt, ExpectedShape::List, llm.default_temperature)
            .await?;
        Ok(apply_assignments(batch, &reply))
    })
    .await;
    let tagged = cases.iter().filter(|case| case.module.is_some()).count();
    tracing::info!(total, tagged, "module tagging complete");
    cases
}

fn build_tagging_prompt(batch: &[TestCase]) -> String {
    let entries: Vec<Value> = batch
        .iter()
        .enumerate()
        .map(|(index, case)| {
            json!({
                "id": index,
                "name": case.case_name,
                "pre": truncate_string(case.precondition.as_deref().unwrap_or(""), PRECONDITION_LIMIT),
                "steps": truncate_string(case.steps.as_deref().unwrap_or(""), STEPS_LIMIT),
                "expect": truncate_string(case.expected.as_deref().unwrap_or(""), EXPECTED_LIMIT),
            })
        })
        .collect();
    TAGGING_PROMPT.replace("{cases}", &json!(entries).to_string())
}

fn apply_assignments(mut batch: Vec<TestCase>, reply: &Value) -> Vec<TestCase> {
    let Some(entries) = reply.as_array() else {
        return batch;
    };
    for entry in entries {
        let Some(index) = entry.get("id").and_then(Value::as_u64) else {
            continue;
        };
        let Some(module) = entry.get("module").and_then(Value::as_str) else {
            continue;
        };
        let module = module.trim();
        if module.is_empty() {
            continue;
        }
        if let Some(case) = batch.get_mut(index as usize) {
            case.module = Some(module.to_string());
            case.module_confidence = Some(MODULE_CONFIDENCE);
        }
    }
    batch
}
