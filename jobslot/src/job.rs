use crate::broadcaster::{Broadcaster, SubscriberId};
use crate::config::RunnerConfig;
use crate::events::{JobStatus, Mode};
use crate::types::{Chunk, JobId};
use futures::Stream;
use nix::unistd::Pid;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// One admitted execution attempt.
///
/// Identity fields are fixed at creation. Everything that changes lives
/// behind a single lock: the status, the process group of the running child,
/// and the output log with its live subscribers. Status is only ever moved
/// out of `Running` by the coordinator.
pub struct Job {
    id: JobId,
    mode: Mode,
    value: String,
    start_time: SystemTime,
    liveness_timeout: Duration,
    state: Mutex<JobState>,
}

struct JobState {
    status: JobStatus,
    process_group: Option<Pid>,
    output: Broadcaster,
}

impl Job {
    pub(crate) fn new(mode: Mode, value: String, config: &RunnerConfig) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            mode,
            value,
            start_time: SystemTime::now(),
            liveness_timeout: config.liveness_timeout,
            state: Mutex::new(JobState {
                status: JobStatus::Running,
                process_group: None,
                output: Broadcaster::new(config.max_buffer_bytes, config.subscriber_capacity),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, JobState> {
        // the state stays consistent across a panicking holder, so keep going
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The path or command line as the user submitted it.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    pub fn status(&self) -> JobStatus {
        self.state().status
    }

    pub fn buffered_bytes(&self) -> usize {
        self.state().output.buffered_bytes()
    }

    /// Buffered output still inside the retention window, oldest first.
    pub fn history(&self) -> Vec<Chunk> {
        self.state().output.snapshot()
    }

    /// Register a live channel. History is not replayed on it; see
    /// [`Job::attach`] for a gap free replay followed by live output.
    pub fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<Chunk>) {
        self.state().output.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.state().output.unsubscribe(id);
    }

    /// Snapshot the history and subscribe under one lock acquisition, so every
    /// chunk shows up exactly once across the two.
    pub fn attach(self: &Arc<Self>) -> LiveStream {
        let (history, subscriber, live) = {
            let mut state = self.state();
            let history = state.output.snapshot();
            let (subscriber, live) = state.output.subscribe();
            (history, subscriber, live)
        };
        LiveStream {
            job: Arc::clone(self),
            history: history.into(),
            subscriber,
            live,
        }
    }

    /// Number of live channels currently registered.
    pub fn viewer_count(&self) -> usize {
        self.state().output.subscriber_count()
    }

    pub fn is_sealed(&self) -> bool {
        self.state().output.is_sealed()
    }

    pub(crate) fn append_output(&self, chunk: impl Into<Chunk>) {
        self.state().output.append(chunk.into());
    }

    /// Release live viewers once the final chunk has been appended.
    pub(crate) fn seal(&self) {
        self.state().output.seal();
    }

    pub(crate) fn set_process_group(&self, pgid: Pid) {
        let mut state = self.state();
        if state.status == JobStatus::Running {
            state.process_group = Some(pgid);
        }
    }

    /// Forget the process group once its leader has been reaped, so a late
    /// stop cannot signal a recycled group id.
    pub(crate) fn clear_process_group(&self) {
        self.state().process_group = None;
    }

    pub(crate) fn process_group(&self) -> Option<Pid> {
        self.state().process_group
    }

    /// Move out of `Running`. A terminal status is never overwritten; the
    /// status in force afterwards is returned either way.
    pub(crate) fn transition(&self, to: JobStatus) -> JobStatus {
        let mut state = self.state();
        if state.status == JobStatus::Running && to.is_terminal() {
            state.status = to;
            state.process_group = None;
        }
        state.status
    }

    /// Like [`Job::transition`], but also appends the closing chunk for the
    /// resolved status under the same lock. A viewer that sees a terminal
    /// status therefore always has the closing chunk queued.
    pub(crate) fn conclude<F, C>(&self, to: JobStatus, closing: F) -> JobStatus
    where
        F: FnOnce(JobStatus) -> C,
        C: Into<Chunk>,
    {
        let mut state = self.state();
        if state.status == JobStatus::Running && to.is_terminal() {
            state.status = to;
            state.process_group = None;
        }
        let resolved = state.status;
        state.output.append(closing(resolved).into());
        resolved
    }
}

/// A viewer attached to a job: buffered history first, then live chunks.
///
/// Ends once the job is sealed and the queue is drained, or when a wait for
/// the next chunk times out and the job is no longer running. Dropping the
/// stream unsubscribes it.
pub struct LiveStream {
    job: Arc<Job>,
    history: VecDeque<Chunk>,
    subscriber: SubscriberId,
    live: mpsc::Receiver<Chunk>,
}

impl LiveStream {
    pub async fn next(&mut self) -> Option<Chunk> {
        if let Some(chunk) = self.history.pop_front() {
            return Some(chunk);
        }
        loop {
            match timeout(self.job.liveness_timeout, self.live.recv()).await {
                Ok(chunk) => return chunk,
                // whatever was queued before the status turned terminal
                Err(_) if self.job.status().is_terminal() => return self.live.try_recv().ok(),
                Err(_) => continue,
            }
        }
    }

    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }

    pub fn into_stream(self) -> impl Stream<Item = Chunk> {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|chunk| (chunk, stream))
        })
    }
}

impl Drop for LiveStream {
    fn drop(&mut self) {
        self.job.unsubscribe(self.subscriber);
    }
}
