use crate::errors;
use crate::events::{JobStatus, Mode};
use crate::job::Job;
use crate::types::JobId;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Builds the closing chunk once the final status is known.
pub type Closing = Box<dyn FnOnce(JobStatus) -> String + Send>;

pub enum CoordinatorMessage {
    CreateJob {
        mode: Mode,
        value: String,
        response: oneshot::Sender<errors::Result<Arc<Job>>>,
    },
    GetJob {
        job_id: JobId,
        response: oneshot::Sender<Option<Arc<Job>>>,
    },
    FinishJob {
        job: Arc<Job>,
        status: JobStatus,
        closing: Closing,
        response: oneshot::Sender<JobStatus>,
    },
    StopJob {
        job_id: JobId,
        response: oneshot::Sender<()>,
    },
}
