//! In-memory job state store.
//!
//! Injected as a dependency rather than living in process-wide state, and
//! bounded: once `capacity` jobs are retained, creating a new one evicts the
//! oldest. Eviction happens on insert, so no background task is needed. The
//! sequencer is the only writer for a given job; the mutex here just
//! serializes map access across jobs.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

use crate::model::JobStatus;

/// Payload returned to the polling surface.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub status: JobStatus,
    pub logs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct JobRecord {
    status: JobStatus,
    logs: Vec<String>,
    report_url: Option<String>,
    error: Option<String>,
}

#[derive(Debug)]
struct StoreInner {
    jobs: HashMap<String, JobRecord>,
    /// Insertion order; front is oldest.
    order: VecDeque<String>,
}

#[derive(Debug)]
pub struct JobStore {
    capacity: usize,
    inner: Mutex<StoreInner>,
}

impl JobStore {
    pub fn new(capacity: usize) -> JobStore {
        JobStore {
            capacity: capacity.max(1),
            inner: Mutex::new(StoreInner {
                jobs: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Register a new pending job, evicting the oldest if at capacity.
    pub fn create(&self) -> String {
        let job_id = Uuid::new_v4().to_string();
        let mut inner = self.inner.lock().expect("job store poisoned");
        while inner.order.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.jobs.remove(&oldest);
                tracing::info!(job_id = %oldest, "evicted oldest job record");
            }
        }
        inner.order.push_back(job_id.clone());
        inner.jobs.insert(job_id.clone(), JobRecord::default());
        job_id
    }

    pub fn append_log(&self, job_id: &str, line: impl Into<String>) {
        let mut inner = self.inner.lock().expect("job store poisoned");
        match inner.jobs.get_mut(job_id) {
            Some(record) => record.logs.push(line.into()),
            None => tracing::warn!(%job_id, "log line for unknown job dropped"),
        }
    }

    pub fn mark_running(&self, job_id: &str) {
        self.update(job_id, |record| record.status = JobStatus::Running);
    }

    pub fn mark_completed(&self, job_id: &str, report_url: String) {
        self.update(job_id, |record| {
            record.status = JobStatus::Completed;
            record.report_url = Some(report_url);
        });
    }

    pub fn mark_failed(&self, job_id: &str, error: String) {
        self.update(job_id, |record| {
            record.status = JobStatus::Failed;
            record.error = Some(error);
        });
    }

    /// Current view of a job; absent ids read as Unknown with empty logs.
    pub fn snapshot(&self, job_id: &str) -> JobSnapshot {
        let inner = self.inner.lock().expect("job store poisoned");
        match inner.jobs.get(job_id) {
            Some(record) => JobSnapshot {
                job_id: job_id.to_string(),
                status: record.status,
                logs: record.logs.clone(),
                report_url: record.report_url.clone(),
                error: record.error.clone(),
            },
            None => JobSnapshot {
                job_id: job_id.to_string(),
                status: JobStatus::Unknown,
                logs: Vec::new(),
                report_url: None,
                error: None,
            },
        }
    }

    fn update(&self, job_id: &str, apply: impl FnOnce(&mut JobRecord)) {
        let mut inner = self.inner.lock().expect("job store poisoned");
        match inner.jobs.get_mut(job_id) {
            Some(record) => apply(record),
            None => tracing::warn!(%job_id, "status update for unknown job dropped"),
        }
    }
}
