use std::io;
use std::os::fd::RawFd;

/// Returns the soft limit on open descriptors for this process.
pub(crate) fn sys_fd_limit() -> io::Result<libc::rlim_t> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };

    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(limit.rlim_cur)
}

/// Forks the process using `fork(2)`.
///
/// Returns the child pid in the parent and `0` in the child.
pub(crate) fn sys_fork() -> io::Result<libc::pid_t> {
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(pid)
}

/// Closes a file descriptor.
pub(crate) fn sys_close(fd: RawFd) {
    unsafe { libc::close(fd) };
}
