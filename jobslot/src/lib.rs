//! Single-slot job runner.
//!
//! At most one script or command runs at a time. Its output is kept in a byte
//! bounded log and fanned out to any number of live viewers, and the job can
//! be stopped by signalling its whole process group.

mod actors;
mod broadcaster;
pub mod config;
pub mod errors;
pub mod events;
mod job;
mod process;
pub mod types;
pub mod validator;

// re-export the job coord handle as if it is the job coordinator itself.
pub use actors::coordinator::JobCoordinatorHandle as JobCoordinator;
pub use broadcaster::SubscriberId;
pub use config::RunnerConfig;
pub use errors::{JobError, Rejection};
pub use events::{JobStatus, Mode};
pub use job::{Job, LiveStream};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, JobId};
    use std::time::Duration;

    fn arbitrary() -> RunnerConfig {
        RunnerConfig {
            allow_arbitrary_command: true,
            ..RunnerConfig::default()
        }
    }

    /// Read a job's output until the stream ends.
    async fn collect(coordinator: &JobCoordinator, job_id: JobId) -> Vec<String> {
        let mut viewer = coordinator
            .attach(job_id)
            .await
            .expect("coordinator gone")
            .expect("job vanished");
        let mut chunks = vec![];
        let read_all = async {
            while let Some(chunk) = viewer.next().await {
                chunks.push(text(&chunk));
            }
        };
        tokio::time::timeout(Duration::from_secs(20), read_all)
            .await
            .expect("job output never ended");
        chunks
    }

    fn text(chunk: &Chunk) -> String {
        String::from_utf8_lossy(chunk).into_owned()
    }

    /// Wait for the start announcement, after which the job can be signalled.
    async fn wait_started(coordinator: &JobCoordinator, job_id: JobId) -> LiveStream {
        let mut viewer = coordinator.attach(job_id).await.unwrap().unwrap();
        let first = tokio::time::timeout(Duration::from_secs(10), viewer.next())
            .await
            .expect("job never started")
            .expect("no output");
        assert!(text(&first).starts_with(&format!("[job {}] Started", job_id)));
        viewer
    }

    #[tokio::test]
    async fn basic() {
        let coordinator = JobCoordinator::spawn(RunnerConfig::default());
        let job_id = coordinator
            .submit("command", "echo hello world!")
            .await
            .expect("job start err");

        let output = collect(&coordinator, job_id).await;
        assert_eq!(
            output,
            vec![
                format!("[job {}] Started command: echo hello world!\n", job_id),
                "[stdout] hello world!\n".to_string(),
                "[system] Job finished successfully\n".to_string(),
            ]
        );
        assert_eq!(coordinator.status(job_id).await.unwrap(), Some(JobStatus::Finished));
    }

    #[tokio::test]
    async fn stderr_is_labelled() {
        let coordinator = JobCoordinator::spawn(arbitrary());
        let job_id = coordinator
            .submit("command", "sh -c 'echo out; echo err >&2; printf tail'")
            .await
            .unwrap();

        let output = collect(&coordinator, job_id).await;
        assert!(output.contains(&"[stdout] out\n".to_string()));
        assert!(output.contains(&"[stderr] err\n".to_string()));
        // an unterminated last line still comes through
        assert!(output.contains(&"[stdout] tail".to_string()));
    }

    #[tokio::test]
    async fn non_zero_exit_fails() {
        let coordinator = JobCoordinator::spawn(arbitrary());
        let job_id = coordinator.submit("command", "sh -c 'exit 3'").await.unwrap();

        let output = collect(&coordinator, job_id).await;
        assert_eq!(output.last().unwrap(), "[system] Job failed with code 3\n");
        assert_eq!(coordinator.status(job_id).await.unwrap(), Some(JobStatus::Failed));
    }

    #[tokio::test]
    async fn spawn_failure_is_recorded() {
        let coordinator = JobCoordinator::spawn(arbitrary());
        let job_id = coordinator
            .submit("command", "/nonexistent/jobslot-test-binary")
            .await
            .expect("spawn failures are not submission errors");

        let output = collect(&coordinator, job_id).await;
        assert_eq!(output.len(), 1);
        assert!(output[0].starts_with("[system] Failed to start job:"));
        assert_eq!(coordinator.status(job_id).await.unwrap(), Some(JobStatus::Failed));
    }

    #[tokio::test]
    async fn rejected_submissions_start_nothing() {
        let coordinator = JobCoordinator::spawn(RunnerConfig::default());
        let err = coordinator.submit("command", "rm -rf /").await.unwrap_err();
        assert_eq!(err.code(), "command_not_allowed");
        let err = coordinator.submit("shell", "ls").await.unwrap_err();
        assert_eq!(err.code(), "invalid_mode");
        let err = coordinator.submit("script", "/etc/passwd").await.unwrap_err();
        assert_eq!(err.code(), "path_not_allowed");

        // the slot is still free
        coordinator.submit("command", "echo free").await.unwrap();
    }

    #[tokio::test]
    async fn one_job_at_a_time() {
        let coordinator = JobCoordinator::spawn(arbitrary());
        let first = coordinator.submit("command", "sleep 30").await.unwrap();
        let _viewer = wait_started(&coordinator, first).await;

        let err = coordinator.submit("command", "echo second").await.unwrap_err();
        assert!(matches!(err, JobError::Busy));
        assert_eq!(err.code(), "busy");

        coordinator.stop(first).await.unwrap();
        collect(&coordinator, first).await;

        let second = coordinator.submit("command", "echo second").await.unwrap();
        assert_ne!(first, second);
        // only the latest job is retained
        assert!(coordinator.job(first).await.unwrap().is_none());
        collect(&coordinator, second).await;
    }

    #[tokio::test]
    async fn stop_reports_stopped_not_failed() {
        let coordinator = JobCoordinator::spawn(arbitrary());
        let job_id = coordinator.submit("command", "sleep 30").await.unwrap();
        let mut viewer = wait_started(&coordinator, job_id).await;

        coordinator.stop(job_id).await.unwrap();
        assert_eq!(coordinator.status(job_id).await.unwrap(), Some(JobStatus::Stopped));

        let mut rest = vec![];
        while let Some(chunk) = viewer.next().await {
            rest.push(text(&chunk));
        }
        assert_eq!(rest, vec!["[system] Job stopped by user\n".to_string()]);
        assert_eq!(coordinator.status(job_id).await.unwrap(), Some(JobStatus::Stopped));
    }

    #[tokio::test]
    async fn stop_reaches_the_whole_process_group() {
        let coordinator = JobCoordinator::spawn(arbitrary());
        // the background sleep holds stdout open; output only ends if it dies too
        let job_id = coordinator
            .submit("command", "sh -c 'sleep 30 & wait'")
            .await
            .unwrap();
        let _viewer = wait_started(&coordinator, job_id).await;

        coordinator.stop(job_id).await.unwrap();
        let output = collect(&coordinator, job_id).await;
        assert_eq!(output.last().unwrap(), "[system] Job stopped by user\n");
    }

    #[tokio::test]
    async fn stop_escalates_when_configured() {
        let config = RunnerConfig {
            kill_after: Some(Duration::from_millis(200)),
            // long enough that viewers outlive the grace period
            liveness_timeout: Duration::from_secs(5),
            ..arbitrary()
        };
        let coordinator = JobCoordinator::spawn(config);
        let job_id = coordinator
            .submit("command", "sh -c 'trap \"\" TERM; echo ready; sleep 30'")
            .await
            .unwrap();
        let mut viewer = wait_started(&coordinator, job_id).await;
        // the trap is installed once the shell prints
        let ready = viewer.next().await.unwrap();
        assert_eq!(text(&ready), "[stdout] ready\n");

        coordinator.stop(job_id).await.unwrap();
        let output = collect(&coordinator, job_id).await;
        assert_eq!(output.last().unwrap(), "[system] Job stopped by user\n");
        assert_eq!(coordinator.status(job_id).await.unwrap(), Some(JobStatus::Stopped));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let coordinator = JobCoordinator::spawn(RunnerConfig::default());
        coordinator.stop(uuid::Uuid::new_v4()).await.unwrap();

        let job_id = coordinator.submit("command", "echo done").await.unwrap();
        collect(&coordinator, job_id).await;
        let before = coordinator.job(job_id).await.unwrap().unwrap();
        let history = before.history();

        coordinator.stop(job_id).await.unwrap();
        coordinator.stop(uuid::Uuid::new_v4()).await.unwrap();
        assert_eq!(before.status(), JobStatus::Finished);
        assert_eq!(before.history(), history);
    }

    #[tokio::test]
    async fn late_viewers_get_history() {
        let coordinator = JobCoordinator::spawn(RunnerConfig::default());
        let job_id = coordinator.submit("command", "echo one").await.unwrap();
        let first = collect(&coordinator, job_id).await;
        let second = collect(&coordinator, job_id).await;
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[tokio::test]
    async fn every_viewer_sees_everything() {
        let config = RunnerConfig {
            subscriber_capacity: 100_000,
            ..arbitrary()
        };
        let coordinator = JobCoordinator::spawn(config);
        let job_id = coordinator
            .submit("command", "sh -c 'i=0; while [ $i -lt 500 ]; do echo $i; i=$((i+1)); done'")
            .await
            .unwrap();

        let (a, b) = tokio::join!(collect(&coordinator, job_id), collect(&coordinator, job_id));
        assert_eq!(a, b);
        let lines: Vec<String> = (0..500).map(|i| format!("[stdout] {}\n", i)).collect();
        assert_eq!(&a[1..501], &lines[..]);
    }

    #[tokio::test]
    async fn long_lines_are_split_into_bounded_chunks() {
        let config = RunnerConfig {
            max_buffer_bytes: 1024,
            ..arbitrary()
        };
        let coordinator = JobCoordinator::spawn(config);
        // 8 MiB without a single newline
        let job_id = coordinator
            .submit("command", "sh -c 'sleep 0.2; head -c 8388608 /dev/zero | tr \"\\0\" a'")
            .await
            .unwrap();
        let mut viewer = wait_started(&coordinator, job_id).await;

        let mut output = vec![];
        let read_all = async {
            while let Some(chunk) = viewer.next().await {
                output.push(text(&chunk));
            }
        };
        tokio::time::timeout(Duration::from_secs(20), read_all)
            .await
            .expect("job output never ended");

        let label = "[stdout] ";
        let cap = actors::worker::MAX_LINE_BYTES + label.len();
        let sizes: Vec<usize> = output.iter().map(String::len).collect();
        assert!(sizes.iter().all(|&len| len <= cap), "oversized chunk in {:?}", sizes);
        assert!(sizes.contains(&cap), "no full-size piece in {:?}", sizes);
        let payload: usize = output
            .iter()
            .filter(|chunk| chunk.starts_with(label))
            .map(|chunk| chunk.len() - label.len())
            .sum();
        assert_eq!(payload, 8 * 1024 * 1024);
        assert_eq!(output.last().unwrap(), "[system] Job finished successfully\n");

        let job = coordinator.job(job_id).await.unwrap().unwrap();
        assert!(job.buffered_bytes() <= 1024);
    }

    #[tokio::test]
    async fn stop_after_reap_does_not_signal() {
        let coordinator = JobCoordinator::spawn(RunnerConfig::default());
        let job = coordinator
            .create_job(Mode::Command, "echo reaped".into())
            .await
            .unwrap();
        job.set_process_group(nix::unistd::Pid::from_raw(i32::MAX));
        job.clear_process_group();

        coordinator.stop(job.id()).await.unwrap();
        assert_eq!(job.status(), JobStatus::Running);
    }

    #[tokio::test]
    async fn output_log_stays_bounded() {
        let config = RunnerConfig {
            max_buffer_bytes: 256,
            ..arbitrary()
        };
        let coordinator = JobCoordinator::spawn(config);
        let job_id = coordinator
            .submit("command", "sh -c 'i=0; while [ $i -lt 200 ]; do echo line$i; i=$((i+1)); done'")
            .await
            .unwrap();
        collect(&coordinator, job_id).await;

        let job = coordinator.job(job_id).await.unwrap().unwrap();
        let history = job.history();
        let retained: usize = history.iter().map(|c| c.len()).sum();
        assert!(retained <= 256);
        assert_eq!(job.buffered_bytes(), retained);
        // the oldest output is gone, the newest is kept
        assert!(!history.iter().any(|c| text(c).starts_with("[job ")));
        assert_eq!(text(history.last().unwrap()), "[system] Job finished successfully\n");
    }
}
