use crate::types::Args;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::{setsid, Pid};
use std::{io, process::Stdio};
use tokio::process::{Child, Command};
use tracing::warn;

/// Spawn `args` as a new session leader with piped stdout and stderr.
///
/// The child's pid doubles as its process group id, so the whole tree it
/// forks can be signalled through [`signal_group`].
pub fn spawn_session(args: &Args) -> io::Result<Child> {
    let (program, rest) = args
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty argument vector"))?;
    let mut command = Command::new(program);
    command
        .args(rest)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    // SAFETY: setsid is async-signal-safe and touches no state of the parent.
    unsafe {
        command.pre_exec(|| setsid().map(|_| ()).map_err(io::Error::from));
    }
    command.spawn()
}

pub fn process_group_of(child: &Child) -> Option<Pid> {
    child.id().map(|pid| Pid::from_raw(pid as i32))
}

/// Signal every process in the group. A group that is already gone is not an
/// error.
pub fn signal_group(pgid: Pid, signal: Signal) {
    match killpg(pgid, signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => warn!(pgid = pgid.as_raw(), signal = ?signal, "failed to signal process group: {}", err),
    }
}
