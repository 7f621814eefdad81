use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SCRIPT_ROOT: &str = "/home/fix";
pub const DEFAULT_WHITELIST: &str = "echo,ls,cat,tail,grep,systemctl status,journalctl -u";
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1024;
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_MESSAGE_CAPACITY: usize = 32;

/// Settings the engine consumes. Loading them is the caller's business.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// scripts must resolve to a path under this directory
    pub allowed_script_root: PathBuf,
    /// prefixes a command must start with unless arbitrary commands are allowed
    pub command_whitelist: Vec<String>,
    pub allow_arbitrary_command: bool,
    /// upper bound on the bytes retained in a job's output log
    pub max_buffer_bytes: usize,
    /// per-viewer queue depth; chunks beyond it are dropped for that viewer
    pub subscriber_capacity: usize,
    /// how long a viewer waits for a chunk before re-checking the job status
    pub liveness_timeout: Duration,
    /// send SIGKILL to the process group this long after a stop, if still alive
    pub kill_after: Option<Duration>,
    /// depth of the coordinator's inbox
    pub message_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            allowed_script_root: PathBuf::from(DEFAULT_SCRIPT_ROOT),
            command_whitelist: Self::parse_whitelist(DEFAULT_WHITELIST),
            allow_arbitrary_command: false,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
            kill_after: None,
            message_capacity: DEFAULT_MESSAGE_CAPACITY,
        }
    }
}

impl RunnerConfig {
    /// Split a comma separated whitelist, dropping blank entries.
    pub fn parse_whitelist(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    }
}
