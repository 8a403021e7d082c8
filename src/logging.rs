//! Tracing subscriber setup.
//!
//! Honors `RUST_LOG`; defaults to info-level output for this crate. Safe to
//! call more than once (subsequent calls are no-ops), which keeps tests that
//! each initialize logging from panicking.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("case_triage=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
