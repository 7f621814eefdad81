mod arg_parser;
mod viewer;

use arg_parser::ArgParser;
use clap::Parser;
use jobslot::{JobCoordinator, JobStatus};
use std::{error, process};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn error::Error>> {
    // job output owns stdout, diagnostics go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = ArgParser::parse();
    let coordinator = JobCoordinator::spawn(args.runner_config());

    let job_id = match coordinator.submit(args.mode.as_str(), &args.value).await {
        Ok(job_id) => job_id,
        Err(err) => {
            eprintln!("{}: {}", err.code(), err);
            process::exit(2);
        }
    };
    tracing::info!(%job_id, "job submitted");

    let status = viewer::follow(&coordinator, job_id).await?;
    process::exit(exit_code(status));
}

fn exit_code(status: JobStatus) -> i32 {
    match status {
        JobStatus::Finished => 0,
        JobStatus::Stopped => 130,
        JobStatus::Failed | JobStatus::Running => 1,
    }
}
