mod actor;
mod messages;

use self::{
    actor::JobCoordinator,
    messages::CoordinatorMessage::{self, CreateJob, FinishJob, GetJob, StopJob},
};
use super::worker;
use crate::config::RunnerConfig;
use crate::errors::{self, JobError};
use crate::events::{JobStatus, Mode};
use crate::job::{Job, LiveStream};
use crate::types::JobId;
use crate::validator;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// A `JobCoordinator` which admits, looks up and stops jobs, one at a time.
///
/// This struct is actually an actor handle. The real work is done in the actor
/// spawned by `JobCoordinator::spawn`, which owns the single job slot and
/// handles one request at a time. The handle can be cloned freely across
/// tasks without any further synchronization.
#[derive(Clone)]
pub struct JobCoordinatorHandle {
    sender: mpsc::Sender<CoordinatorMessage>,
    config: Arc<RunnerConfig>,
}

impl JobCoordinatorHandle {
    /// Spawn a new coordinator. Must be called from within a tokio runtime.
    pub fn spawn(config: RunnerConfig) -> Self {
        let config = Arc::new(config);
        let (sender, receiver) = mpsc::channel(config.message_capacity.max(1));
        JobCoordinator::spawn(receiver, Arc::clone(&config));
        Self { sender, config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Validate and admit a job, then start running it in the background.
    ///
    /// Fails only when the request is rejected or another job is still
    /// running. Anything that goes wrong after admission is reported through
    /// the job's status and output instead.
    pub async fn submit(&self, mode: &str, value: &str) -> errors::Result<JobId> {
        let (mode, args) = validator::validate(mode, value, &self.config)?;
        let job = self.create_job(mode, value.to_string()).await?;
        let job_id = job.id();
        worker::spawn(job, args, self.clone());
        Ok(job_id)
    }

    /// The current job, if it has this id. Earlier jobs are not retained.
    pub async fn job(&self, job_id: JobId) -> errors::Result<Option<Arc<Job>>> {
        self.request(|response| GetJob { job_id, response }).await
    }

    pub async fn status(&self, job_id: JobId) -> errors::Result<Option<JobStatus>> {
        Ok(self.job(job_id).await?.map(|job| job.status()))
    }

    /// Attach a viewer: the buffered history followed by live output.
    pub async fn attach(&self, job_id: JobId) -> errors::Result<Option<LiveStream>> {
        Ok(self.job(job_id).await?.map(|job| job.attach()))
    }

    /// Ask the job's process group to terminate. Unknown or finished jobs are
    /// left alone and still count as success.
    pub async fn stop(&self, job_id: JobId) -> errors::Result<()> {
        self.request(|response| StopJob { job_id, response }).await
    }

    pub(crate) async fn create_job(&self, mode: Mode, value: String) -> errors::Result<Arc<Job>> {
        self.request(|response| CreateJob {
            mode,
            value,
            response,
        })
        .await?
    }

    /// Settle a running job's status and append its closing chunk, built from
    /// whatever status is in force afterwards. Returns that status.
    pub(crate) async fn finish<F>(
        &self,
        job: Arc<Job>,
        status: JobStatus,
        closing: F,
    ) -> errors::Result<JobStatus>
    where
        F: FnOnce(JobStatus) -> String + Send + 'static,
    {
        self.request(|response| FinishJob {
            job,
            status,
            closing: Box::new(closing),
            response,
        })
        .await
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> CoordinatorMessage,
    ) -> errors::Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(message(tx))
            .await
            .map_err(|_| JobError::CoordinatorExited)?;
        rx.await.map_err(|_| JobError::CoordinatorExited)
    }
}
