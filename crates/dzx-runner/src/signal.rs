//! Signal delivery to a process group.

use nix::errno::Errno;
use nix::sys::signal::killpg;
use nix::unistd::Pid;
use tracing::debug;

pub use nix::sys::signal::Signal;

/// Conventional name (`SIGKILL`) of a raw signal number.
#[must_use]
pub fn signal_name(signal: i32) -> Option<&'static str> {
    Signal::try_from(signal).ok().map(Signal::as_str)
}

/// Send `signal` to the process group led by `pid`.
///
/// Every spawned shell leads its own group, so this reaches the commands the
/// shell forked as well. A group that has already exited is not an error.
pub(crate) fn signal_group(pid: u32, signal: Signal) -> std::io::Result<()> {
    if pid == 0 {
        debug!(%signal, "No process group to signal");
        return Ok(());
    }
    let Ok(raw) = i32::try_from(pid) else {
        return Err(std::io::Error::other(format!("pid {pid} out of range")));
    };
    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => {
            debug!(pid, %signal, "Process group already exited");
            Ok(())
        }
        Err(errno) => Err(std::io::Error::from(errno)),
    }
}
