//! # Vigil
//!
//! **Vigil** is a file-descriptor readiness poller for single-threaded
//! cooperative runtimes. It bridges a level-triggered OS readiness
//! primitive (`epoll` on Linux, `poll(2)` elsewhere) to a scheduler
//! that suspends and resumes coroutines: a coroutine registers the
//! directions it wants to wait for and suspends; when the kernel
//! reports readiness, exactly the coroutines waiting on that
//! descriptor are handed back to the scheduler with flags saying which
//! directions are ready or have errored.
//!
//! Vigil deliberately covers only the poller. Coroutine stacks,
//! context switching, ready queues, timers, and channels belong to the
//! surrounding runtime, which reaches the poller through a handful of
//! calls:
//!
//! - **Subscription batching**: [`Reactor::add`] and
//!   [`Reactor::remove`] never issue a syscall; pending changes are
//!   reconciled into the minimal set of kernel operations when the
//!   scheduler next calls [`Reactor::wait`]
//! - **Two waiters per descriptor**: one reader and one writer, fanned
//!   out independently from a single kernel event; a coroutine waiting
//!   on both directions is resumed once with the union of its flags
//! - **Error fan-out**: kernel error and hangup conditions reach both
//!   waiters as [`Readiness::ERR`]
//! - **Fork isolation**: [`Reactor::fork`] rebuilds the kernel pollset
//!   in the child so parent and child stop sharing registrations
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vigil::{Builder, CoroId, Interest, Reactor};
//!
//! let mut reactor = Builder::new().build()?;
//!
//! // A coroutine about to suspend on a readable socket:
//! reactor.add(fd, Interest::READ, CoroId::new(current));
//!
//! // The scheduler, out of runnable coroutines:
//! let resumed = reactor.wait(None, &mut scheduler);
//! ```
//!
//! The scheduler receives resumptions through the [`Resume`] trait,
//! the only upward call the poller makes.
//!
//! ## Back-ends
//!
//! The kernel primitive hides behind the [`Pollset`] trait with two
//! shipped implementations, selected at compile time: indexed `epoll`
//! ([`EpollPoller`], the Linux default) and scanned `poll(2)`
//! ([`ScanPoller`], the portable fallback, also selectable with the
//! `poll-backend` feature).

mod builder;
mod coro;
mod error;
mod reactor;

pub use builder::Builder;
pub use coro::{CoroId, Resume};
pub use error::Error;
pub use reactor::event::{Event, Interest, Readiness};
#[cfg(target_os = "linux")]
pub use reactor::poller::EpollPoller;
pub use reactor::poller::{Poller, Pollset, ScanPoller};
pub use reactor::Reactor;
