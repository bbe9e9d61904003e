use crate::reactor::event::Readiness;

/// Identifier of a suspended coroutine.
///
/// Identifiers are assigned and resolved by the scheduler; the poller
/// stores them by value in its wait table and hands them back through
/// [`Resume::resume`] when the kernel reports readiness. The poller
/// never owns coroutine state and never deallocates it.
///
/// A coroutine waiting on both directions of one descriptor is detected
/// by identifier equality and resumed exactly once with the union of
/// its readiness flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CoroId(u64);

impl CoroId {
    /// Wraps a scheduler-assigned identifier.
    pub const fn new(raw: u64) -> Self {
        CoroId(raw)
    }

    /// Returns the raw identifier.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Upward callback from the poller into the scheduler.
///
/// This is the only call the poller makes back into the surrounding
/// runtime. The implementation is expected to move the coroutine onto
/// the ready queue; it must not re-enter the poller from inside
/// `resume`.
pub trait Resume {
    /// Hands a coroutine back to the scheduler together with the flags
    /// describing which directions came ready or errored.
    fn resume(&mut self, co: CoroId, readiness: Readiness);
}
