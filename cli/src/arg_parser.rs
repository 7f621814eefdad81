use clap::{ArgEnum, Parser};
use jobslot::config::{
    RunnerConfig, DEFAULT_MAX_BUFFER_BYTES, DEFAULT_SCRIPT_ROOT, DEFAULT_SUBSCRIBER_CAPACITY,
    DEFAULT_WHITELIST,
};
use std::path::PathBuf;
use std::time::Duration;

/// Run one script or command and follow its output. Ctrl-C stops the job.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct ArgParser {
    /// how VALUE is interpreted
    #[clap(arg_enum)]
    pub mode: ModeArg,

    /// path of the script, or the command line to run
    pub value: String,

    /// scripts must live under this directory
    #[clap(long, env = "ALLOWED_SCRIPT_ROOT", default_value = DEFAULT_SCRIPT_ROOT)]
    pub allowed_script_root: PathBuf,

    /// comma separated prefixes a command must start with
    #[clap(long, env = "COMMAND_WHITELIST", default_value = DEFAULT_WHITELIST)]
    pub command_whitelist: String,

    /// accept any command, not just whitelisted ones
    #[clap(long, env = "ALLOW_ARBITRARY_COMMAND")]
    pub allow_arbitrary_command: bool,

    /// bytes of output retained for replay
    #[clap(long, env = "MAX_BUFFER_BYTES", default_value_t = DEFAULT_MAX_BUFFER_BYTES)]
    pub max_buffer_bytes: usize,

    /// idle time before a viewer checks whether the job is still running
    #[clap(long, env = "LIVENESS_TIMEOUT_MS", default_value_t = 1000)]
    pub liveness_timeout_ms: u64,

    /// SIGKILL the job this many seconds after a stop if it is still alive
    #[clap(long, env = "KILL_AFTER_SECS")]
    pub kill_after_secs: Option<u64>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ArgEnum)]
pub enum ModeArg {
    /// run an executable file under the allowed root
    Script,
    /// run a command line without a shell
    Command,
}

impl ModeArg {
    pub fn as_str(self) -> &'static str {
        match self {
            ModeArg::Script => "script",
            ModeArg::Command => "command",
        }
    }
}

impl ArgParser {
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            allowed_script_root: self.allowed_script_root.clone(),
            command_whitelist: RunnerConfig::parse_whitelist(&self.command_whitelist),
            allow_arbitrary_command: self.allow_arbitrary_command,
            max_buffer_bytes: self.max_buffer_bytes,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            liveness_timeout: Duration::from_millis(self.liveness_timeout_ms),
            kill_after: self.kill_after_secs.map(Duration::from_secs),
            ..RunnerConfig::default()
        }
    }
}
