use super::coordinator::JobCoordinatorHandle;
use crate::events::JobStatus;
use crate::job::Job;
use crate::process;
use crate::types::Args;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Longest piece of a line appended as one chunk. Longer lines are split.
pub(crate) const MAX_LINE_BYTES: usize = 64 * 1024;

/// Run an admitted job in the background: spawn the child, drain both of its
/// output streams into the job, wait for it, and settle the final status.
pub(crate) fn spawn(job: Arc<Job>, args: Args, coordinator: JobCoordinatorHandle) -> JoinHandle<()> {
    tokio::spawn(async move { supervise(job, args, coordinator).await })
}

async fn supervise(job: Arc<Job>, args: Args, coordinator: JobCoordinatorHandle) {
    let mut child = match process::spawn_session(&args) {
        Ok(child) => child,
        Err(err) => {
            warn!(job_id = %job.id(), program = ?args.first(), "failed to start job: {}", err);
            let message = format!("[system] Failed to start job: {}\n", err);
            settle(&job, &coordinator, JobStatus::Failed, move |_| message.clone()).await;
            job.seal();
            return;
        }
    };

    if let Some(pgid) = process::process_group_of(&child) {
        job.set_process_group(pgid);
    }
    info!(job_id = %job.id(), pid = ?child.id(), "job started");
    job.append_output(format!(
        "[job {}] Started {}: {}\n",
        job.id(),
        job.mode(),
        job.value()
    ));

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    tokio::join!(drain(&job, stdout, "stdout"), drain(&job, stderr, "stderr"));

    let exit = child.wait().await.map_err(|err| err.to_string());
    // the leader is reaped, its group id is free for reuse
    job.clear_process_group();
    let requested = match &exit {
        Ok(status) if status.success() => JobStatus::Finished,
        _ => JobStatus::Failed,
    };
    let closing = {
        let exit = exit.clone();
        move |resolved| final_message(resolved, &exit)
    };
    let resolved = settle(&job, &coordinator, requested, closing).await;
    info!(job_id = %job.id(), status = %resolved, exit = ?exit, "job ended");
    job.seal();
}

/// Hand the outcome to the coordinator, which will not overwrite a stop that
/// got there first. The closing chunk is appended together with the status.
async fn settle<F>(
    job: &Arc<Job>,
    coordinator: &JobCoordinatorHandle,
    status: JobStatus,
    closing: F,
) -> JobStatus
where
    F: Fn(JobStatus) -> String + Clone + Send + 'static,
{
    match coordinator.finish(Arc::clone(job), status, closing.clone()).await {
        Ok(resolved) => resolved,
        Err(err) => {
            debug!(job_id = %job.id(), "settling without coordinator: {}", err);
            job.conclude(status, closing)
        }
    }
}

/// Append each line of `stream`, terminator included, until the child closes
/// it. Lines longer than [`MAX_LINE_BYTES`] arrive in several chunks.
async fn drain<R>(job: &Job, stream: Option<R>, label: &str)
where
    R: AsyncRead + Unpin,
{
    let stream = match stream {
        Some(stream) => stream,
        None => return,
    };
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    loop {
        line.clear();
        let mut capped = (&mut reader).take(MAX_LINE_BYTES as u64);
        match capped.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => job.append_output(format!("[{}] {}", label, String::from_utf8_lossy(&line))),
            Err(err) => {
                warn!(job_id = %job.id(), stream = label, "read failed: {}", err);
                break;
            }
        }
    }
}

fn final_message(status: JobStatus, exit: &Result<ExitStatus, String>) -> String {
    if status == JobStatus::Stopped {
        return "[system] Job stopped by user\n".to_string();
    }
    match exit {
        Ok(exit) if exit.success() => "[system] Job finished successfully\n".to_string(),
        Ok(exit) => match (exit.code(), exit.signal()) {
            (Some(code), _) => format!("[system] Job failed with code {}\n", code),
            (None, Some(signal)) => format!("[system] Job terminated by signal {}\n", signal),
            (None, None) => "[system] Job failed\n".to_string(),
        },
        Err(err) => format!("[system] Failed to wait for job: {}\n", err),
    }
}
