use super::messages::{Closing, CoordinatorMessage};
use crate::config::RunnerConfig;
use crate::errors::{self, JobError};
use crate::events::{JobStatus, Mode};
use crate::job::Job;
use crate::process::signal_group;
use crate::types::JobId;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Owns the single job slot. Every message is handled to completion before
/// the next one is read, which is what serializes admission, finishing and
/// stopping.
pub struct JobCoordinator {
    inbox: mpsc::Receiver<CoordinatorMessage>,
    current: Option<Arc<Job>>,
    config: Arc<RunnerConfig>,
}

impl JobCoordinator {
    pub fn spawn(inbox: mpsc::Receiver<CoordinatorMessage>, config: Arc<RunnerConfig>) {
        let actor = Self {
            inbox,
            current: None,
            config,
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        use self::CoordinatorMessage::*;
        while let Some(msg) = self.inbox.recv().await {
            match msg {
                CreateJob {
                    mode,
                    value,
                    response,
                } => {
                    self.create_job(mode, value, response);
                }
                GetJob { job_id, response } => {
                    let _ = response.send(self.current_matching(job_id));
                }
                FinishJob {
                    job,
                    status,
                    closing,
                    response,
                } => {
                    self.finish_job(job, status, closing, response);
                }
                StopJob { job_id, response } => {
                    self.stop_job(job_id);
                    let _ = response.send(());
                }
            }
        }
        debug!("job coordinator exiting");
    }

    fn current_matching(&self, job_id: JobId) -> Option<Arc<Job>> {
        self.current
            .as_ref()
            .filter(|job| job.id() == job_id)
            .cloned()
    }

    fn create_job(
        &mut self,
        mode: Mode,
        value: String,
        response: oneshot::Sender<errors::Result<Arc<Job>>>,
    ) {
        if let Some(job) = &self.current {
            if job.status() == JobStatus::Running {
                debug!(running = %job.id(), "rejecting job, slot is busy");
                let _ = response.send(Err(JobError::Busy));
                return;
            }
        }
        let job = Arc::new(Job::new(mode, value, &self.config));
        info!(job_id = %job.id(), %mode, value = job.value(), "job admitted");
        // the previous record goes away with its last viewer
        self.current = Some(Arc::clone(&job));
        let _ = response.send(Ok(job));
    }

    fn finish_job(
        &mut self,
        job: Arc<Job>,
        status: JobStatus,
        closing: Closing,
        response: oneshot::Sender<JobStatus>,
    ) {
        let resolved = job.conclude(status, closing);
        if resolved != status {
            debug!(job_id = %job.id(), requested = %status, %resolved, "status already settled");
        }
        let _ = response.send(resolved);
    }

    fn stop_job(&mut self, job_id: JobId) {
        let job = match self.current_matching(job_id) {
            Some(job) => job,
            None => return,
        };
        if job.status() != JobStatus::Running {
            return;
        }
        let pgid = match job.process_group() {
            Some(pgid) => pgid,
            None => return,
        };
        signal_group(pgid, Signal::SIGTERM);
        job.transition(JobStatus::Stopped);
        info!(job_id = %job_id, pgid = pgid.as_raw(), "job stopped by user");

        if let Some(grace) = self.config.kill_after {
            escalate(job, pgid, grace);
        }
    }
}

/// SIGKILL the group if the supervisor is still not done with the child
/// after `grace`.
fn escalate(job: Arc<Job>, pgid: Pid, grace: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        if !job.is_sealed() {
            warn!(job_id = %job.id(), pgid = pgid.as_raw(), "job ignored SIGTERM, killing process group");
            signal_group(pgid, Signal::SIGKILL);
        }
    });
}
