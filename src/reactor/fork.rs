//! Fork adapter.
//!
//! An epoll-class pollset handle is shared with the parent across
//! `fork(2)`: registrations made in either process show up in the
//! other. A child that keeps polling therefore needs its own kernel
//! object, rebuilt from the in-memory wait table.

use crate::reactor::core::Reactor;
use crate::reactor::poller::unix::sys_fork;
use crate::reactor::poller::Pollset;

use std::io;

impl<P: Pollset> Reactor<P> {
    /// Forks the process, isolating the child's kernel pollset.
    ///
    /// Returns the child pid in the parent and `0` in the child, like
    /// `fork(2)`. In the child, the kernel pollset is re-created and
    /// every installed subscription re-registered with its current
    /// mask, so the two processes stop sharing kernel state. Pending
    /// change-list entries are not replayed; they reconcile on each
    /// process's next [`wait`](Self::wait).
    ///
    /// # Panics
    ///
    /// In the child, if the pollset cannot be rebuilt. A child that
    /// cannot poll has no way to run its coroutines.
    pub fn fork(&mut self) -> io::Result<libc::pid_t> {
        let pid = sys_fork()?;

        if pid == 0 {
            let live = self.installed_slots();
            if let Err(err) = self.pollset_mut().rebuild(&live) {
                panic!("failed to rebuild kernel pollset after fork: {err}");
            }
        }

        Ok(pid)
    }
}
