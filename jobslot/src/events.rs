use crate::errors::Rejection;
use std::{fmt, str::FromStr};

/// Lifecycle of a job. `Running` is the only non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Stopped,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Stopped => "stopped",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the submitted value is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// path to an executable file under the allowed root
    Script,
    /// a command line, split into words and run without a shell
    Command,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Script => "script",
            Mode::Command => "command",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Rejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "script" => Ok(Mode::Script),
            "command" => Ok(Mode::Command),
            _ => Err(Rejection::InvalidMode),
        }
    }
}
