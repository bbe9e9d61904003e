//! `poll(2)`-based pollset.
//!
//! The descriptor set is a compact `pollfd` array handed to the kernel
//! on every wait call, so there is no kernel-side registration state:
//! install appends, modify edits in place, remove swaps the last
//! element in. Lookups scan the array.
//!
//! `POLLNVAL` joins `POLLERR` and `POLLHUP` in the event's error bit; a
//! descriptor closed behind the poller's back is reported to its
//! waiters rather than silently dropped.

use crate::reactor::event::{Event, Interest};
use crate::reactor::poller::Pollset;

use libc::{pollfd, POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT};
use std::io;
use std::os::fd::RawFd;

/// Initial capacity of the descriptor array; growth doubles from here.
const INITIAL_CAPACITY: usize = 64;

/// Scanned kernel pollset over `poll(2)`.
pub struct ScanPoller {
    pollfds: Vec<pollfd>,
}

impl ScanPoller {
    /// Creates an empty pollset.
    ///
    /// `poll(2)` fills in revents for the whole array on each call, so
    /// no separate event buffer is needed; the argument mirrors the
    /// epoll constructor's signature.
    pub fn new(_event_capacity: usize) -> io::Result<Self> {
        Ok(Self {
            pollfds: Vec::with_capacity(INITIAL_CAPACITY),
        })
    }

    fn position(&self, fd: RawFd) -> Option<usize> {
        self.pollfds.iter().position(|p| p.fd == fd)
    }

    fn events(interest: Interest) -> i16 {
        let mut events = 0;

        if interest.read {
            events |= POLLIN;
        }
        if interest.write {
            events |= POLLOUT;
        }

        events
    }
}

impl Pollset for ScanPoller {
    const SIZED_TO_FD_LIMIT: bool = false;

    fn install(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        debug_assert!(self.position(fd).is_none());

        self.pollfds.push(pollfd {
            fd,
            events: Self::events(interest),
            revents: 0,
        });

        Ok(())
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        match self.position(fd) {
            Some(i) => {
                self.pollfds[i].events = Self::events(interest);
                Ok(())
            }
            None => Err(io::Error::from_raw_os_error(libc::ENOENT)),
        }
    }

    fn remove(&mut self, fd: RawFd) -> io::Result<()> {
        match self.position(fd) {
            Some(i) => {
                self.pollfds.swap_remove(i);
                Ok(())
            }
            None => Err(io::Error::from_raw_os_error(libc::ENOENT)),
        }
    }

    fn wait(&mut self, events: &mut Vec<Event>, timeout_ms: i32) -> io::Result<()> {
        let n = loop {
            let rc = unsafe {
                libc::poll(
                    self.pollfds.as_mut_ptr(),
                    self.pollfds.len() as libc::nfds_t,
                    timeout_ms,
                )
            };

            if rc >= 0 {
                break rc;
            }

            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        };

        if n == 0 {
            return Ok(());
        }

        for p in &mut self.pollfds {
            let revents = p.revents;
            p.revents = 0;

            if revents == 0 {
                continue;
            }

            events.push(Event {
                fd: p.fd,
                readable: revents & POLLIN != 0,
                writable: revents & POLLOUT != 0,
                error: revents & (POLLERR | POLLHUP | POLLNVAL) != 0,
            });
        }

        Ok(())
    }
}
