use std::io;
use tokio::process::Child;

/// Ask the worker to exit (SIGTERM on unix).
///
/// A child that has already been reaped is left alone: its pid may belong to
/// someone else by now.
#[cfg(unix)]
pub(crate) fn request_exit(child: &mut Child) -> io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) takes plain integers and touches no memory we own.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub(crate) fn request_exit(child: &mut Child) -> io::Result<()> {
    force_exit(child)
}

pub(crate) fn force_exit(child: &mut Child) -> io::Result<()> {
    if child.id().is_none() {
        return Ok(());
    }
    child.start_kill()
}

/// Exit code as reported to callers: the process code, or the negated
/// signal number when the worker was killed by a signal.
pub(crate) fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return -sig;
        }
    }
    -1
}
