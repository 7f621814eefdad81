use std::result;
use thiserror::Error;

/// Why a submission was refused before any job existed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("Script path outside allowed root")]
    PathNotAllowed,
    #[error("Script path is not a file")]
    NotAFile,
    #[error("Script is not executable")]
    NotExecutable,
    #[error("Command is empty")]
    EmptyCommand,
    #[error("Command not permitted in controlled mode")]
    CommandNotAllowed,
    #[error("Command could not be split into words: {0}")]
    MalformedCommand(String),
    #[error("Unsupported execution mode")]
    InvalidMode,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::PathNotAllowed => "path_not_allowed",
            Rejection::NotAFile => "not_a_file",
            Rejection::NotExecutable => "not_executable",
            Rejection::EmptyCommand => "empty_command",
            Rejection::CommandNotAllowed => "command_not_allowed",
            Rejection::MalformedCommand(_) => "malformed_command",
            Rejection::InvalidMode => "invalid_mode",
        }
    }
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error("Another job is currently running")]
    Busy,
    #[error("Job coordinator exited")]
    CoordinatorExited,
}

impl JobError {
    pub fn code(&self) -> &'static str {
        match self {
            JobError::Rejected(rejection) => rejection.code(),
            JobError::Busy => "busy",
            JobError::CoordinatorExited => "unavailable",
        }
    }
}

pub type Result<T> = result::Result<T, JobError>;
