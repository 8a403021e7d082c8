//! HTTP surface: submission, polling, and report artifacts.
//!
//! Submission returns immediately with a job identity; the pipeline runs on
//! a spawned task and the status endpoint is the only progress mechanism.
//! Reports are static files served from the report directory; file names are
//! validated so the handler cannot be walked out of it.

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Settings;
use crate::jobs::{JobSnapshot, JobStore};
use crate::pipeline::Pipeline;
use crate::util::sanitize_file_name;

const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobStore>,
    pub pipeline: Arc<Pipeline>,
    pub upload_dir: PathBuf,
    pub report_dir: PathBuf,
}

impl AppState {
    pub fn new(jobs: Arc<JobStore>, pipeline: Arc<Pipeline>, settings: &Settings) -> AppState {
        AppState {
            jobs,
            pipeline,
            upload_dir: settings.upload_dir.clone(),
            report_dir: settings.report_dir.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    job_id: String,
    message: &'static str,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/upload", post(upload))
        .route("/api/v1/status/{job_id}", get(status))
        .route("/reports/{file_name}", get(report))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(state: AppState, bind_addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("serve http")
}

async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, (StatusCode, String)> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = sanitize_file_name(field.file_name().unwrap_or("upload"));
        let bytes = field
            .bytes()
            .await
            .map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()))?;
        upload = Some((file_name, bytes.to_vec()));
        break;
    }
    let Some((file_name, bytes)) = upload else {
        return Err((
            StatusCode::BAD_REQUEST,
            "multipart field 'file' is required".to_string(),
        ));
    };

    let job_id = state.jobs.create();
    let path = state.upload_dir.join(format!("{job_id}_{file_name}"));
    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(|err| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("create upload dir: {err}"),
            )
        })?;
    tokio::fs::write(&path, &bytes).await.map_err(|err| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("persist upload: {err}"),
        )
    })?;

    state
        .jobs
        .append_log(&job_id, "File received; queued for processing.");
    tracing::info!(%job_id, file = %file_name, bytes = bytes.len(), "upload accepted");

    let pipeline = Arc::clone(&state.pipeline);
    let spawned_job_id = job_id.clone();
    tokio::spawn(async move {
        pipeline.run_file(&spawned_job_id, &path).await;
    });

    Ok(Json(UploadResponse {
        job_id,
        message: "Pipeline started.",
    }))
}

async fn status(State(state): State<AppState>, Path(job_id): Path<String>) -> Json<JobSnapshot> {
    Json(state.jobs.snapshot(&job_id))
}

async fn report(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> Result<Html<String>, StatusCode> {
    // Reject anything that is not a plain file name we could have written.
    if sanitize_file_name(&file_name) != file_name {
        return Err(StatusCode::NOT_FOUND);
    }
    let path = state.report_dir.join(&file_name);
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => Ok(Html(contents)),
        Err(_) => Err(StatusCode::NOT_FOUND),
    }
}
