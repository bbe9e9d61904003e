//! Kernel pollset back-ends.
//!
//! A pollset is the thin seam between the poller core and the OS
//! readiness primitive. Two back-ends ship with the crate:
//!
//! - [`EpollPoller`]: indexed by descriptor, backed by Linux `epoll`.
//!   Registrations are explicit kernel objects; the core mirrors them
//!   through its installed masks and reconciles differences lazily.
//! - [`ScanPoller`]: backed by `poll(2)`. The descriptor set is a
//!   compact array handed to the kernel on every wait call.
//!
//! The concrete default is selected at compile time; the core works
//! against the [`Pollset`] trait, so a caller can also supply its own
//! implementation through [`Reactor::with_pollset`](crate::Reactor::with_pollset).

pub(crate) mod unix;

#[cfg(target_os = "linux")]
mod epoll;
mod poll;

#[cfg(target_os = "linux")]
pub use epoll::EpollPoller;
pub use poll::ScanPoller;

use std::io;
use std::os::fd::RawFd;

use crate::reactor::event::{Event, Interest};

/// The default kernel pollset for this target.
#[cfg(all(target_os = "linux", not(feature = "poll-backend")))]
pub type Poller = EpollPoller;

/// The default kernel pollset for this target.
#[cfg(any(not(target_os = "linux"), feature = "poll-backend"))]
pub type Poller = ScanPoller;

/// Capability set exposed by a kernel pollset.
///
/// The poller core drives a pollset exclusively through these five
/// operations; it issues `install`/`modify`/`remove` only when its
/// mirrored subscription mask actually changes.
pub trait Pollset {
    /// Whether slot storage should be sized to the process descriptor
    /// limit up front. Back-ends that look slots up by descriptor on
    /// every event want this; scanned back-ends let the table grow on
    /// demand instead.
    const SIZED_TO_FD_LIMIT: bool;

    /// Registers a descriptor the kernel set does not contain yet.
    fn install(&mut self, fd: RawFd, interest: Interest) -> io::Result<()>;

    /// Replaces the subscription mask of an already registered
    /// descriptor.
    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()>;

    /// Drops a descriptor from the kernel set.
    fn remove(&mut self, fd: RawFd) -> io::Result<()>;

    /// Blocks until readiness is reported or the timeout expires,
    /// appending one [`Event`] per ready descriptor.
    ///
    /// `timeout_ms` follows `poll(2)` conventions: `-1` blocks
    /// indefinitely and `0` probes without blocking. Interrupted calls
    /// are retried internally; the primitive is level-triggered, so
    /// events that do not fit the back-end's buffer resurface on the
    /// next call.
    fn wait(&mut self, events: &mut Vec<Event>, timeout_ms: i32) -> io::Result<()>;

    /// Recreates kernel-side state in the child after a fork.
    ///
    /// `live` holds every descriptor whose subscription was installed
    /// at fork time, with its mask. Back-ends without kernel-side
    /// pollset state keep the default no-op.
    fn rebuild(&mut self, live: &[(RawFd, Interest)]) -> io::Result<()> {
        let _ = live;
        Ok(())
    }
}
