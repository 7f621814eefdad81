use jobslot::types::JobId;
use jobslot::{JobCoordinator, JobError, JobStatus};
use tokio::io::{self, AsyncWriteExt};
use tokio::select;
use tracing::{info, warn};

/// Print a job's output until it ends, turning the first Ctrl-C into a stop
/// request. Returns the job's final status.
pub async fn follow(coordinator: &JobCoordinator, job_id: JobId) -> Result<JobStatus, JobError> {
    let mut stream = match coordinator.attach(job_id).await? {
        Some(stream) => stream,
        None => return Ok(JobStatus::Failed),
    };
    let mut stdout = io::stdout();
    let mut stopping = false;

    loop {
        select! {
            maybe_chunk = stream.next() => {
                match maybe_chunk {
                    Some(chunk) => {
                        if let Err(err) = write_chunk(&mut stdout, &chunk).await {
                            warn!("stdout closed, detaching: {}", err);
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c(), if !stopping => {
                info!(%job_id, "interrupt received, stopping job");
                coordinator.stop(job_id).await?;
                // a job that has not spawned yet ignores the stop; allow another try
                stopping = stream.job().status().is_terminal();
            }
        }
    }

    Ok(stream.job().status())
}

async fn write_chunk(stdout: &mut io::Stdout, chunk: &[u8]) -> std::io::Result<()> {
    stdout.write_all(chunk).await?;
    stdout.flush().await
}
