//! Ingest & normalize: turn workbook sheets into [`TestCase`]s.
//!
//! The generative service does the two schema-level jobs — mapping original
//! column headers onto the canonical field set and mapping raw result values
//! onto the four canonical outcomes. Both calls degrade instead of failing:
//! a bad mapping reply leaves columns unmapped, a bad outcome reply defaults
//! every value to Skipped, and ingest never hard-fails a file because the
//! service misbehaved.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::llm::{ExpectedShape, LlmClient};
use crate::model::{AuditStatus, Outcome, Provenance, TestCase};
use crate::tabular::{Sheet, Workbook};

pub const CANONICAL_FIELDS: [&str; 9] = [
    "case_name",
    "precondition",
    "steps",
    "expected",
    "actual",
    "test_result",
    "priority",
    "executor",
    "remark",
];

pub const WARN_MISSING_NAME: &str = "Missing Case Name";
pub const WARN_MISSING_RESULT: &str = "Missing Result";

const COLUMN_MAPPING_PROMPT: &str = include_str!("../prompts/column_mapping.md");
const RESULT_NORMALIZATION_PROMPT: &str = include_str!("../prompts/result_normalization.md");

/// Canonical field name → column index within a sheet.
pub type ColumnMapping = BTreeMap<String, usize>;

/// Ingest every sheet of the workbook. Case ids are assigned in ingest
/// order across sheets, starting at 0.
pub async fn ingest_workbook(llm: &LlmClient, workbook: &Workbook) -> Vec<TestCase> {
    let mut cases = Vec::new();
    for sheet in &workbook.sheets {
        let mapping = map_columns(llm, sheet).await;
        let outcomes = normalize_results(llm, sheet, &mapping).await;
        let next_id = cases.len();
        cases.extend(build_cases(
            sheet,
            &workbook.file_name,
            &mapping,
            &outcomes,
            next_id,
        ));
    }
    tracing::info!(cases = cases.len(), file = %workbook.file_name, "ingest complete");
    cases
}

/// Ask the service to map this sheet's headers onto the canonical fields.
/// Any failure yields an empty mapping.
async fn map_columns(llm: &LlmClient, sheet: &Sheet) -> ColumnMapping {
    if sheet.headers.is_empty() {
        return ColumnMapping::new();
    }
    let sample: Map<String, Value> = match sheet.sample_row() {
        Some(row) => sheet
            .headers
            .iter()
            .zip(row.iter())
            .map(|(header, cell)| (header.clone(), Value::String(cell.clone())))
            .collect(),
        None => Map::new(),
    };
    let prompt = COLUMN_MAPPING_PROMPT
        .replace("{headers}", &json!(sheet.headers).to_string())
        .replace("{sample}", &Value::Object(sample).to_string());

    match llm
        .invoke(&prompt, ExpectedShape::Object, llm.default_temperature)
        .await
    {
        Ok(reply) => mapping_from_reply(&sheet.headers, &reply),
        Err(err) => {
            tracing::warn!(sheet = %sheet.name, error = %err, "column mapping failed; leaving columns unmapped");
            ColumnMapping::new()
        }
    }
}

/// Deduplicate a mapping reply: keys must be real headers, and at most one
/// original column may map to each canonical field (first seen wins).
fn mapping_from_reply(headers: &[String], reply: &Value) -> ColumnMapping {
    let mut mapping = ColumnMapping::new();
    let Some(entries) = reply.as_object() else {
        return mapping;
    };
    for (original, canonical) in entries {
        let Some(canonical) = canonical.as_str() else {
            continue;
        };
        if !CANONICAL_FIELDS.contains(&canonical) {
            continue;
        }
        let Some(column) = headers.iter().position(|header| header == original) else {
            continue;
        };
        if let Some(existing) = mapping.get(canonical) {
            tracing::warn!(
                field = canonical,
                kept = %headers[*existing],
                dropped = %original,
                "duplicate column mapping; keeping first-seen column"
            );
            continue;
        }
        mapping.insert(canonical.to_string(), column);
    }
    mapping
}

/// Ask the service to normalize the distinct raw result values of a sheet.
/// Any failure yields an empty map, which defaults every row to Skipped.
async fn normalize_results(
    llm: &LlmClient,
    sheet: &Sheet,
    mapping: &ColumnMapping,
) -> BTreeMap<String, Outcome> {
    let values = distinct_result_values(sheet, mapping);
    if values.is_empty() {
        return BTreeMap::new();
    }
    let prompt = RESULT_NORMALIZATION_PROMPT.replace("{values}", &json!(values).to_string());
    match llm
        .invoke(&prompt, ExpectedShape::Object, llm.default_temperature)
        .await
    {
        Ok(reply) => outcomes_from_reply(&reply),
        Err(err) => {
            tracing::warn!(sheet = %sheet.name, error = %err, "result normalization failed; defaulting to Skipped");
            BTreeMap::new()
        }
    }
}

fn distinct_result_values(sheet: &Sheet, mapping: &ColumnMapping) -> Vec<String> {
    let Some(&column) = mapping.get("test_result") else {
        return Vec::new();
    };
    let mut values = Vec::new();
    for row in &sheet.rows {
        let cell = row.get(column).map(|cell| cell.trim()).unwrap_or("");
        if !cell.is_empty() && !values.iter().any(|seen| seen == cell) {
            values.push(cell.to_string());
        }
    }
    values
}

fn outcomes_from_reply(reply: &Value) -> BTreeMap<String, Outcome> {
    let mut outcomes = BTreeMap::new();
    let Some(entries) = reply.as_object() else {
        return outcomes;
    };
    for (raw, outcome) in entries {
        if let Some(outcome) = outcome.as_str().and_then(Outcome::parse) {
            outcomes.insert(raw.clone(), outcome);
        }
    }
    outcomes
}

/// Convert surviving rows into cases. Rows with neither a case name nor a
/// result are discarded; everything else is kept with parse warnings.
fn build_cases(
    sheet: &Sheet,
    file_name: &str,
    mapping: &ColumnMapping,
    outcomes: &BTreeMap<String, Outcome>,
    next_id: usize,
) -> Vec<TestCase> {
    let mut cases = Vec::new();
    for (index, row) in sheet.rows.iter().enumerate() {
        let field = |name: &str| -> Option<String> {
            let column = *mapping.get(name)?;
            let cell = row.get(column)?.trim();
            if cell.is_empty() {
                None
            } else {
                Some(cell.to_string())
            }
        };

        let case_name = field("case_name").unwrap_or_default();
        let test_result = field("test_result").unwrap_or_default();
        if case_name.is_empty() && test_result.is_empty() {
            continue;
        }

        let mut parse_warnings = Vec::new();
        if case_name.is_empty() {
            parse_warnings.push(WARN_MISSING_NAME.to_string());
        }
        if test_result.is_empty() {
            parse_warnings.push(WARN_MISSING_RESULT.to_string());
        }

        let normalized_result = outcomes
            .get(&test_result)
            .copied()
            .unwrap_or(Outcome::Skipped);

        cases.push(TestCase {
            id: next_id + cases.len(),
            case_name,
            precondition: field("precondition"),
            steps: field("steps"),
            expected: field("expected"),
            actual: field("actual"),
            test_result,
            normalized_result,
            priority: field("priority"),
            executor: field("executor"),
            remark: field("remark"),
            provenance: Provenance {
                file: file_name.to_string(),
                sheet: sheet.name.clone(),
                // 1-based, plus one more for the header row.
                row: index + 2,
            },
            parse_warnings,
            module: None,
            module_confidence: None,
            audit_status: AuditStatus::Unchecked,
            audit_reason: None,
            defect: None,
        });
    }
    cases
}
