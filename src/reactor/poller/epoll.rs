//! Linux `epoll`-based pollset.
//!
//! Registrations are kernel objects addressed by descriptor, so every
//! operation is O(1) and wait calls return only ready descriptors. The
//! event payload carries the raw descriptor; the poller core resolves
//! it against its wait table.
//!
//! The readiness primitive is used level-triggered. Error and hangup
//! conditions (`EPOLLERR`, `EPOLLHUP`) surface as the event's error
//! bit.

use crate::reactor::event::{Event, Interest};
use crate::reactor::poller::unix::sys_close;
use crate::reactor::poller::Pollset;

use libc::{
    epoll_create1, epoll_ctl, epoll_event, epoll_wait, EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLOUT,
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD,
};
use log::debug;
use std::io;
use std::os::fd::RawFd;

/// Indexed kernel pollset over Linux `epoll`.
pub struct EpollPoller {
    /// Epoll file descriptor.
    epoll: RawFd,

    /// Reusable buffer handed to `epoll_wait`; its capacity bounds how
    /// many events a single wait call consumes.
    raw: Vec<epoll_event>,
}

impl EpollPoller {
    /// Creates the epoll instance.
    ///
    /// `event_capacity` bounds the per-call event buffer.
    pub fn new(event_capacity: usize) -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        debug!("created epoll pollset (fd {epoll})");

        Ok(Self {
            epoll,
            raw: Vec::with_capacity(event_capacity),
        })
    }

    fn flags(interest: Interest) -> u32 {
        let mut flags = 0;

        if interest.read {
            flags |= EPOLLIN;
        }
        if interest.write {
            flags |= EPOLLOUT;
        }

        flags as u32
    }

    fn ctl(&mut self, op: libc::c_int, fd: RawFd, interest: Interest) -> io::Result<()> {
        let mut event = epoll_event {
            events: Self::flags(interest),
            u64: fd as u64,
        };

        let rc = unsafe { epoll_ctl(self.epoll, op, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }
}

impl Pollset for EpollPoller {
    const SIZED_TO_FD_LIMIT: bool = true;

    fn install(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_ADD, fd, interest)
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_MOD, fd, interest)
    }

    fn remove(&mut self, fd: RawFd) -> io::Result<()> {
        let rc = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    fn wait(&mut self, events: &mut Vec<Event>, timeout_ms: i32) -> io::Result<()> {
        let n = loop {
            let n = unsafe {
                epoll_wait(
                    self.epoll,
                    self.raw.as_mut_ptr(),
                    self.raw.capacity() as i32,
                    timeout_ms,
                )
            };

            if n >= 0 {
                break n as usize;
            }

            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        };

        unsafe {
            self.raw.set_len(n);
        }

        for ev in &self.raw {
            events.push(Event {
                fd: ev.u64 as RawFd,
                readable: ev.events & EPOLLIN as u32 != 0,
                writable: ev.events & EPOLLOUT as u32 != 0,
                error: ev.events & (EPOLLERR | EPOLLHUP) as u32 != 0,
            });
        }

        Ok(())
    }

    fn rebuild(&mut self, live: &[(RawFd, Interest)]) -> io::Result<()> {
        // The inherited handle still belongs to the parent's pollset;
        // close our copy and start from a fresh kernel object.
        sys_close(self.epoll);

        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }
        self.epoll = epoll;

        for &(fd, interest) in live {
            self.install(fd, interest)?;
        }

        debug!("rebuilt epoll pollset after fork ({} descriptors)", live.len());

        Ok(())
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        sys_close(self.epoll);
    }
}
