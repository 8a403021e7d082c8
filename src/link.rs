//! Linking between cases, defects, and clusters.
//!
//! Stages produce immutable result vectors; the links between them are laid
//! down here only after the producing stage has fully succeeded, so a
//! mid-stage failure can never leave a half-linked graph. The cluster
//! coverage check is the job-level no-orphan invariant: every defect in
//! exactly one cluster.

use anyhow::{anyhow, Result};

use crate::model::{DefectAnalysis, DefectCluster, TestCase};

/// Point each case at its extracted defect. Cases are indexed by id, which
/// matches their position throughout the pipeline.
pub fn attach_defects(cases: &mut [TestCase], defects: &[DefectAnalysis]) {
    for defect in defects {
        match cases.get_mut(defect.case_id) {
            Some(case) if case.id == defect.case_id => case.defect = Some(defect.id),
            _ => tracing::warn!(
                case_id = defect.case_id,
                defect_id = defect.id,
                "defect references a case that is not in this job"
            ),
        }
    }
}

/// Check that cluster membership covers every defect exactly once.
pub fn verify_cluster_coverage(
    defects: &[DefectAnalysis],
    clusters: &[DefectCluster],
) -> Result<()> {
    let mut counts = vec![0usize; defects.len()];
    for cluster in clusters {
        for &member in &cluster.members {
            let slot = counts
                .get_mut(member)
                .ok_or_else(|| anyhow!("cluster '{}' references unknown defect {member}", cluster.name))?;
            *slot += 1;
        }
    }
    for (defect, count) in counts.iter().enumerate() {
        match count {
            1 => {}
            0 => return Err(anyhow!("defect {defect} belongs to no cluster")),
            _ => return Err(anyhow!("defect {defect} belongs to {count} clusters")),
        }
    }
    Ok(())
}
