use crate::error::Error;
use crate::reactor::poller::unix::sys_fd_limit;
use crate::reactor::poller::{Poller, Pollset};
use crate::reactor::Reactor;

use log::warn;

/// Default bound on the kernel event buffer per wait call.
const DEFAULT_EVENT_CAPACITY: usize = 128;

/// Wait-table size used when the descriptor limit is unlimited.
const UNLIMITED_FALLBACK: usize = 65536;

/// Builder for configuring and creating a [`Reactor`].
///
/// # Examples
///
/// ```rust,ignore
/// let reactor = Builder::new()
///     .event_capacity(256)
///     .build()?;
/// ```
pub struct Builder {
    /// Bound on kernel events consumed per wait call.
    event_capacity: usize,

    /// Wait-table size override for indexed back-ends.
    max_descriptors: Option<usize>,
}

impl Builder {
    /// Creates a new `Builder` with default configuration.
    pub fn new() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_descriptors: None,
        }
    }

    /// Bounds how many kernel events a single wait call consumes.
    ///
    /// The readiness primitive is level-triggered, so events beyond
    /// the bound resurface on the next call; a small buffer trades
    /// memory for extra wait calls under load.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn event_capacity(mut self, n: usize) -> Self {
        assert!(n > 0, "event_capacity must be > 0");

        self.event_capacity = n;
        self
    }

    /// Overrides the wait-table size for back-ends indexed by
    /// descriptor. Defaults to the `RLIMIT_NOFILE` soft limit.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn max_descriptors(mut self, n: usize) -> Self {
        assert!(n > 0, "max_descriptors must be > 0");

        self.max_descriptors = Some(n);
        self
    }

    /// Builds the poller with the configured options.
    ///
    /// Acquires the kernel pollset handle and, for indexed back-ends,
    /// sizes the wait table to the process descriptor limit.
    pub fn build(self) -> Result<Reactor, Error> {
        let pollset = Poller::new(self.event_capacity).map_err(Error::PollsetCreate)?;

        let max_descriptors = match self.max_descriptors {
            Some(n) => n,
            None if Poller::SIZED_TO_FD_LIMIT => descriptor_limit()?,
            None => 0,
        };

        Ok(Reactor::with_pollset(pollset, max_descriptors))
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

fn descriptor_limit() -> Result<usize, Error> {
    let limit = sys_fd_limit().map_err(Error::DescriptorLimit)?;

    if limit == libc::RLIM_INFINITY {
        warn!("descriptor limit is unlimited; sizing wait table to {UNLIMITED_FALLBACK}");
        return Ok(UNLIMITED_FALLBACK);
    }

    Ok(limit as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "event_capacity must be > 0")]
    fn zero_event_capacity_is_rejected() {
        let _ = Builder::new().event_capacity(0);
    }

    #[test]
    #[should_panic(expected = "max_descriptors must be > 0")]
    fn zero_descriptor_limit_is_rejected() {
        let _ = Builder::new().max_descriptors(0);
    }

    #[test]
    fn builds_with_defaults() {
        let reactor = Builder::new().build().expect("failed to build poller");
        drop(reactor);
    }
}
