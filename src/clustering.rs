//! Defect clustering: one call groups all of a job's defects by semantic
//! similarity.
//!
//! The no-orphan invariant is enforced here, not trusted to the service:
//! indices the reply never references land in a designated catch-all
//! cluster, a defect referenced twice stays with the first group that
//! claimed it, and a failed call collapses the whole job into a single
//! fallback cluster rather than leaving anything unclustered.

use serde_json::Value;

use crate::llm::{ExpectedShape, LlmClient};
use crate::model::{DefectAnalysis, DefectCluster};

/// Group absorbing defects the reply did not assign.
pub const FALLBACK_CLUSTER_NAME: &str = "Unclassified defects";
/// Single group used when the clustering call itself fails.
pub const FAILURE_CLUSTER_NAME: &str = "All defects (clustering unavailable)";

const CLUSTERING_PROMPT: &str = include_str!("../prompts/defect_clustering.md");

pub async fn cluster_defects(llm: &LlmClient, defects: &[DefectAnalysis]) -> Vec<DefectCluster> {
    if defects.is_empty() {
        return Vec::new();
    }
    let prompt = build_clustering_prompt(defects);
    let clusters = match llm
        .invoke(&prompt, ExpectedShape::Object, llm.default_temperature)
        .await
    {
        Ok(reply) => clusters_from_reply(defects, &reply),
        Err(err) => {
            tracing::warn!(error = %err, "clustering call failed; using a single fallback cluster");
            vec![failure_cluster(defects)]
        }
    };
    tracing::info!(defects = defects.len(), clusters = clusters.len(), "clustering complete");
    clusters
}

fn build_clustering_prompt(defects: &[DefectAnalysis]) -> String {
    let mut listing = String::new();
    for (index, defect) in defects.iter().enumerate() {
        let phenomenon = defect.phenomenon.as_deref().unwrap_or("no description");
        listing.push_str(&format!("ID: {index} | Phenomenon: {phenomenon}\n"));
    }
    CLUSTERING_PROMPT.replace("{defects}", listing.trim_end())
}

fn clusters_from_reply(defects: &[DefectAnalysis], reply: &Value) -> Vec<DefectCluster> {
    let Some(groups) = reply.get("clusters").and_then(Value::as_array) else {
        tracing::warn!("clustering reply missing 'clusters'; using a single fallback cluster");
        return vec![failure_cluster(defects)];
    };

    let mut assigned = vec![false; defects.len()];
    let mut clusters = Vec::new();
    for group in groups {
        let mut members = Vec::new();
        if let Some(ids) = group.get("defect_ids").and_then(Value::as_array) {
            for id in ids {
                let Some(index) = parse_index(id) else {
                    continue;
                };
                // First group to claim a defect keeps it.
                if index < defects.len() && !assigned[index] {
                    assigned[index] = true;
                    members.push(index);
                }
            }
        }
        if members.is_empty() {
            continue;
        }
        let field = |name: &str, default: &str| -> String {
            group
                .get(name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or(default)
                .to_string()
        };
        clusters.push(DefectCluster {
            name: field("cluster_name", "Unnamed cluster"),
            summary: field("summary", ""),
            risk_assessment: field("risk_assessment", ""),
            members,
        });
    }

    let unassigned: Vec<usize> = assigned
        .iter()
        .enumerate()
        .filter(|(_, taken)| !**taken)
        .map(|(index, _)| index)
        .collect();
    if !unassigned.is_empty() {
        tracing::warn!(count = unassigned.len(), "defects left unassigned by reply; adding catch-all cluster");
        clusters.push(DefectCluster {
            name: FALLBACK_CLUSTER_NAME.to_string(),
            summary: "Defects the grouping reply did not reference.".to_string(),
            risk_assessment: "Needs manual review".to_string(),
            members: unassigned,
        });
    }
    clusters
}

fn failure_cluster(defects: &[DefectAnalysis]) -> DefectCluster {
    DefectCluster {
        name: FAILURE_CLUSTER_NAME.to_string(),
        summary: "The clustering call failed, so every defect is grouped together pending manual triage.".to_string(),
        risk_assessment: "Needs manual assessment".to_string(),
        members: (0..defects.len()).collect(),
    }
}

fn parse_index(value: &Value) -> Option<usize> {
    match value {
        Value::Number(number) => number.as_u64().map(|n| n as usize),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
