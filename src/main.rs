use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::Arc;

use case_triage::cli::{Command, RootArgs, RunArgs, ServeArgs};
use case_triage::config::Settings;
use case_triage::jobs::JobStore;
use case_triage::llm::LlmClient;
use case_triage::logging;
use case_triage::model::JobStatus;
use case_triage::pipeline::Pipeline;
use case_triage::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let args = RootArgs::parse();
    match args.command {
        Command::Serve(serve_args) => run_serve(serve_args).await,
        Command::Run(run_args) => run_once(run_args).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut settings = Settings::from_env()?;
    if let Some(bind) = args.bind {
        settings.bind_addr = bind;
    }
    settings.validate()?;

    let llm = Arc::new(LlmClient::over_http(&settings));
    let jobs = Arc::new(JobStore::new(settings.job_capacity));
    let pipeline = Arc::new(Pipeline::new(llm, Arc::clone(&jobs), &settings));
    let state = AppState::new(jobs, pipeline, &settings);
    server::serve(state, &settings.bind_addr).await
}

async fn run_once(args: RunArgs) -> Result<()> {
    let mut settings = Settings::from_env()?;
    if let Some(out_dir) = args.out_dir {
        settings.report_dir = out_dir;
    }
    settings.validate()?;

    let llm = Arc::new(LlmClient::over_http(&settings));
    let jobs = Arc::new(JobStore::new(settings.job_capacity));
    let pipeline = Pipeline::new(Arc::clone(&llm), Arc::clone(&jobs), &settings);

    let job_id = jobs.create();
    pipeline.run_file(&job_id, &args.input).await;

    let snapshot = jobs.snapshot(&job_id);
    for line in &snapshot.logs {
        println!("{line}");
    }
    let usage = llm.usage();
    eprintln!(
        "generative service usage: {} calls, {} tokens",
        usage.calls, usage.total_tokens
    );
    match snapshot.status {
        JobStatus::Completed => {
            if let Some(report_url) = snapshot.report_url {
                println!(
                    "report: {}",
                    settings
                        .report_dir
                        .join(report_url.trim_start_matches("/reports/"))
                        .display()
                );
            }
            Ok(())
        }
        _ => Err(anyhow!(
            "job {job_id} did not complete: {}",
            snapshot.error.unwrap_or_else(|| "unknown error".to_string())
        )),
    }
}
