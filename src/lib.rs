//! LLM-orchestrated triage of test-execution records.
//!
//! A submitted table runs through six ordered stages — ingest, module
//! tagging, result audit, statistics, defect extraction, clustering plus
//! report — with every piece of "intelligence" delegated to an external
//! generative-text service through a retrying, concurrency-bounded
//! invocation layer. Per-item and per-batch failures degrade to safe
//! defaults; only a stage-escaping error fails a job.

pub mod audit;
pub mod batch;
pub mod cli;
pub mod clustering;
pub mod config;
pub mod defects;
pub mod error;
pub mod ingest;
pub mod jobs;
pub mod link;
pub mod llm;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod server;
pub mod stats;
pub mod tabular;
pub mod tagging;
pub mod util;
