//! Poller core: the wait table, the change list, reconciliation against
//! the kernel pollset, and event dispatch.
//!
//! Registrations never reach the kernel directly. [`Reactor::add`],
//! [`Reactor::remove`], and [`Reactor::clean`] only edit the wait table
//! and enqueue the descriptor on an intrusive change list;
//! [`Reactor::wait`] drains that list into the minimal set of kernel
//! operations before blocking. A coroutine that writes and then reads a
//! socket between two waits therefore costs one kernel modification,
//! not two.

use crate::coro::{CoroId, Resume};
use crate::reactor::event::{Event, Interest, Readiness};
use crate::reactor::poller::{Poller, Pollset};

use log::{trace, warn};
use std::mem;
use std::os::fd::RawFd;
use std::time::Duration;

/// `next_change` of a slot that is not on the change list.
const NIL: u32 = u32::MAX;

/// `next_change` of the last slot on the change list.
const END: u32 = u32::MAX - 1;

/// Per-descriptor record: the coroutine waiting on each direction plus
/// the subscription mask currently installed in the kernel.
struct WaitSlot {
    /// The unique coroutine waiting for readability.
    in_waiter: Option<CoroId>,

    /// The unique coroutine waiting for writability.
    out_waiter: Option<CoroId>,

    /// Mirror of the kernel-side subscription for this descriptor.
    installed: Interest,

    /// Intrusive change-list link; `NIL` when the slot is not enqueued.
    next_change: u32,
}

impl WaitSlot {
    /// The subscription mask this slot wants installed.
    fn desired(&self) -> Interest {
        Interest {
            read: self.in_waiter.is_some(),
            write: self.out_waiter.is_some(),
        }
    }
}

impl Default for WaitSlot {
    fn default() -> Self {
        WaitSlot {
            in_waiter: None,
            out_waiter: None,
            installed: Interest::NONE,
            next_change: NIL,
        }
    }
}

/// File-descriptor readiness poller.
///
/// One `Reactor` serves one scheduler thread. The scheduler owns it and
/// threads it through the runtime; coroutines reach it through runtime
/// wrappers around [`add`](Self::add), [`remove`](Self::remove), and
/// [`clean`](Self::clean), and the scheduler calls
/// [`wait`](Self::wait) whenever its ready queue runs dry. Nothing here
/// is synchronized; cross-thread use is not supported.
pub struct Reactor<P: Pollset = Poller> {
    pollset: P,

    /// Wait table, indexed by descriptor.
    slots: Vec<WaitSlot>,

    /// Head of the intrusive change list (a descriptor), or `NIL`.
    change_head: u32,

    /// Reusable buffer of translated kernel events.
    events: Vec<Event>,
}

impl Reactor<Poller> {
    /// Creates a poller with default configuration.
    ///
    /// Equivalent to `Builder::new().build()`.
    pub fn new() -> Result<Self, crate::Error> {
        crate::Builder::new().build()
    }
}

impl<P: Pollset> Reactor<P> {
    /// Wraps a caller-supplied pollset.
    ///
    /// `max_descriptors` sizes the wait table up front when the
    /// back-end is indexed by descriptor (`P::SIZED_TO_FD_LIMIT`); it
    /// is ignored for back-ends whose table grows on demand.
    pub fn with_pollset(pollset: P, max_descriptors: usize) -> Self {
        let mut slots = Vec::new();
        if P::SIZED_TO_FD_LIMIT {
            slots.resize_with(max_descriptors, WaitSlot::default);
        }

        Reactor {
            pollset,
            slots,
            change_head: NIL,
            events: Vec::new(),
        }
    }

    /// Records `co` as the waiter for each direction in `interest`.
    ///
    /// Called by the runtime immediately before suspending the
    /// coroutine. No kernel call happens here; the subscription is
    /// reconciled on the next [`wait`](Self::wait).
    ///
    /// # Panics
    ///
    /// Panics if `interest` is empty, or if another coroutine already
    /// waits on one of the requested directions. The latter is a
    /// programmer error in the surrounding runtime, not a recoverable
    /// condition.
    pub fn add(&mut self, fd: RawFd, interest: Interest, co: CoroId) {
        assert!(!interest.is_empty(), "empty interest for descriptor {fd}");

        let slot = self.slot_mut(fd);

        if interest.read {
            assert!(
                slot.in_waiter.is_none(),
                "multiple coroutines waiting for a single file descriptor"
            );
            slot.in_waiter = Some(co);
        }
        if interest.write {
            assert!(
                slot.out_waiter.is_none(),
                "multiple coroutines waiting for a single file descriptor"
            );
            slot.out_waiter = Some(co);
        }

        self.enqueue_change(fd);
    }

    /// Clears the named directions of the descriptor's waiter fields.
    ///
    /// Both cancellation (timeout, explicit cancel) and post-readiness
    /// cleanup land here. No kernel call happens; a now-redundant
    /// kernel subscription is dropped on the next reconciliation.
    pub fn remove(&mut self, fd: RawFd, interest: Interest) {
        let slot = self.slot_mut(fd);

        if interest.read {
            slot.in_waiter = None;
        }
        if interest.write {
            slot.out_waiter = None;
        }

        self.enqueue_change(fd);
    }

    /// Forgets a descriptor that is about to be closed.
    ///
    /// Any kernel-side subscription is removed immediately rather than
    /// lazily, so a reused descriptor number cannot inherit stale
    /// state. A kernel report that the descriptor is already gone is
    /// tolerated; it may have been closed elsewhere.
    ///
    /// # Panics
    ///
    /// Panics if a coroutine still waits on the descriptor; the
    /// runtime must cancel waits before closing.
    pub fn clean(&mut self, fd: RawFd) {
        let slot = self.slot_mut(fd);

        assert!(
            slot.in_waiter.is_none() && slot.out_waiter.is_none(),
            "cleaning file descriptor {fd} while a coroutine still waits on it"
        );

        let installed = mem::take(&mut slot.installed);
        if !installed.is_empty() {
            remove_tolerant(&mut self.pollset, fd);
        }

        self.enqueue_change(fd);
    }

    /// Reconciles pending subscriptions, blocks for kernel readiness,
    /// and resumes the coroutines whose directions came ready.
    ///
    /// `None` blocks until an event arrives; `Some(Duration::ZERO)` is
    /// a non-blocking probe. Returns `true` when at least one coroutine
    /// was resumed, `false` on timeout.
    ///
    /// Coroutines are resumed in the order the kernel reported their
    /// events. Error and hangup conditions resume both waiters of the
    /// descriptor with [`Readiness::ERR`] set. A coroutine waiting on
    /// both directions is resumed once, with the union of its flags.
    ///
    /// # Panics
    ///
    /// Panics if the kernel rejects an operation on a descriptor the
    /// wait table believes is valid; that means the table and the
    /// kernel have desynchronized and no safe recovery exists.
    pub fn wait<S: Resume>(&mut self, timeout: Option<Duration>, sched: &mut S) -> bool {
        self.reconcile();

        let timeout_ms = timeout.map_or(-1, |t| t.as_millis().min(i32::MAX as u128) as i32);

        let mut events = mem::take(&mut self.events);
        events.clear();
        if let Err(err) = self.pollset.wait(&mut events, timeout_ms) {
            panic!("kernel wait failed: {err}");
        }

        let mut resumed = false;
        for ev in &events {
            resumed |= self.dispatch(*ev, sched);
        }
        self.events = events;

        resumed
    }

    /// Descriptors with a kernel-installed subscription, with their
    /// masks. Snapshot used by the fork adapter.
    pub(crate) fn installed_slots(&self) -> Vec<(RawFd, Interest)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.installed.is_empty())
            .map(|(fd, slot)| (fd as RawFd, slot.installed))
            .collect()
    }

    pub(crate) fn pollset_mut(&mut self) -> &mut P {
        &mut self.pollset
    }

    fn slot_mut(&mut self, fd: RawFd) -> &mut WaitSlot {
        assert!(fd >= 0, "negative file descriptor");

        let idx = fd as usize;
        if idx >= self.slots.len() {
            assert!(
                !P::SIZED_TO_FD_LIMIT,
                "file descriptor {fd} exceeds the poller descriptor table"
            );
            self.slots.resize_with(idx + 1, WaitSlot::default);
        }

        &mut self.slots[idx]
    }

    /// Puts `fd` on the change list unless it is already there.
    fn enqueue_change(&mut self, fd: RawFd) {
        let idx = fd as usize;
        if self.slots[idx].next_change != NIL {
            return;
        }

        self.slots[idx].next_change = if self.change_head == NIL {
            END
        } else {
            self.change_head
        };
        self.change_head = fd as u32;
    }

    /// Walks the change list and issues the minimal kernel operation
    /// for every slot whose desired mask differs from the installed
    /// one. Slots whose masks already agree unlink without a syscall.
    fn reconcile(&mut self) {
        let mut fd = mem::replace(&mut self.change_head, NIL);

        while fd != NIL && fd != END {
            let idx = fd as usize;
            let next = self.slots[idx].next_change;
            self.slots[idx].next_change = NIL;

            let desired = self.slots[idx].desired();
            let installed = self.slots[idx].installed;
            if desired != installed {
                self.apply(fd as RawFd, installed, desired);
                self.slots[idx].installed = desired;
            }

            fd = next;
        }
    }

    fn apply(&mut self, fd: RawFd, installed: Interest, desired: Interest) {
        trace!("reconcile fd {fd}: {installed:?} -> {desired:?}");

        if installed.is_empty() {
            if let Err(err) = self.pollset.install(fd, desired) {
                panic!("kernel pollset rejected descriptor {fd}: {err}");
            }
        } else if desired.is_empty() {
            remove_tolerant(&mut self.pollset, fd);
        } else if let Err(err) = self.pollset.modify(fd, desired) {
            panic!("kernel pollset lost track of descriptor {fd}: {err}");
        }
    }

    /// Routes one kernel event to the waiters of its descriptor.
    /// Returns whether a coroutine was resumed.
    fn dispatch<S: Resume>(&mut self, ev: Event, sched: &mut S) -> bool {
        let idx = ev.fd as usize;
        if idx >= self.slots.len() {
            return false;
        }

        let mut in_flags = Readiness::NONE;
        if ev.readable {
            in_flags |= Readiness::READ;
        }

        let mut out_flags = Readiness::NONE;
        if ev.writable {
            out_flags |= Readiness::WRITE;
        }

        if ev.error {
            // Error and hangup reach both waiters, whatever direction
            // they subscribed to.
            in_flags |= Readiness::ERR;
            out_flags |= Readiness::ERR;
        }

        let (in_waiter, out_waiter) = {
            let slot = &self.slots[idx];
            (slot.in_waiter, slot.out_waiter)
        };

        match (in_waiter, out_waiter) {
            // One coroutine awaiting both directions: a single
            // resumption carrying the union of its flags.
            (Some(co), Some(other)) if co == other => {
                let flags = in_flags | out_flags;
                if flags.is_empty() {
                    return false;
                }

                self.remove(ev.fd, Interest::BOTH);
                sched.resume(co, flags);
                true
            }
            _ => {
                let mut resumed = false;

                if let Some(co) = in_waiter {
                    if !in_flags.is_empty() {
                        self.remove(ev.fd, Interest::READ);
                        sched.resume(co, in_flags);
                        resumed = true;
                    }
                }

                if let Some(co) = out_waiter {
                    if !out_flags.is_empty() {
                        self.remove(ev.fd, Interest::WRITE);
                        sched.resume(co, out_flags);
                        resumed = true;
                    }
                }

                resumed
            }
        }
    }
}

/// Kernel removal that tolerates descriptors the kernel no longer
/// knows: the application may close a descriptor between cancelling
/// its waits and the next reconciliation.
fn remove_tolerant<P: Pollset>(pollset: &mut P, fd: RawFd) {
    if let Err(err) = pollset.remove(fd) {
        match err.raw_os_error() {
            Some(libc::ENOENT) | Some(libc::EBADF) => {
                warn!("descriptor {fd} vanished before removal: {err}");
            }
            _ => panic!("kernel pollset removal failed for descriptor {fd}: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Debug, PartialEq, Eq, Clone, Copy)]
    enum Op {
        Install(RawFd, Interest),
        Modify(RawFd, Interest),
        Remove(RawFd),
    }

    /// Records kernel operations and replays scripted readiness events.
    #[derive(Default)]
    struct MockPollset {
        ops: Vec<Op>,
        registered: HashMap<RawFd, Interest>,
        scripted: Vec<Event>,
    }

    impl Pollset for MockPollset {
        const SIZED_TO_FD_LIMIT: bool = false;

        fn install(&mut self, fd: RawFd, interest: Interest) -> std::io::Result<()> {
            assert!(
                self.registered.insert(fd, interest).is_none(),
                "double install of fd {fd}"
            );
            self.ops.push(Op::Install(fd, interest));
            Ok(())
        }

        fn modify(&mut self, fd: RawFd, interest: Interest) -> std::io::Result<()> {
            assert!(
                self.registered.insert(fd, interest).is_some(),
                "modify of unregistered fd {fd}"
            );
            self.ops.push(Op::Modify(fd, interest));
            Ok(())
        }

        fn remove(&mut self, fd: RawFd) -> std::io::Result<()> {
            if self.registered.remove(&fd).is_none() {
                return Err(std::io::Error::from_raw_os_error(libc::ENOENT));
            }
            self.ops.push(Op::Remove(fd));
            Ok(())
        }

        fn wait(&mut self, events: &mut Vec<Event>, _timeout_ms: i32) -> std::io::Result<()> {
            events.append(&mut self.scripted);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        resumed: Vec<(CoroId, Readiness)>,
    }

    impl Resume for Recorder {
        fn resume(&mut self, co: CoroId, readiness: Readiness) {
            self.resumed.push((co, readiness));
        }
    }

    fn reactor() -> Reactor<MockPollset> {
        Reactor::with_pollset(MockPollset::default(), 0)
    }

    fn probe(r: &mut Reactor<MockPollset>, sched: &mut Recorder) -> bool {
        r.wait(Some(Duration::ZERO), sched)
    }

    fn ready(fd: RawFd, readable: bool, writable: bool, error: bool) -> Event {
        Event {
            fd,
            readable,
            writable,
            error,
        }
    }

    /// Installed masks in the wait table must agree with what the mock
    /// kernel believes is registered.
    fn assert_mask_mirror(r: &Reactor<MockPollset>) {
        for (fd, slot) in r.slots.iter().enumerate() {
            let kernel = r.pollset.registered.get(&(fd as RawFd)).copied();
            match kernel {
                Some(mask) => assert_eq!(slot.installed, mask, "mask mismatch on fd {fd}"),
                None => assert!(slot.installed.is_empty(), "stale mask on fd {fd}"),
            }
        }
    }

    #[test]
    fn add_installs_on_next_wait() {
        let mut r = reactor();
        let mut sched = Recorder::default();

        r.add(5, Interest::READ, CoroId::new(1));
        assert!(r.pollset.ops.is_empty(), "add must not touch the kernel");

        assert!(!probe(&mut r, &mut sched));
        assert_eq!(r.pollset.ops, vec![Op::Install(5, Interest::READ)]);
        assert_mask_mirror(&r);
    }

    #[test]
    #[should_panic(expected = "multiple coroutines waiting for a single file descriptor")]
    fn second_waiter_on_same_direction_panics() {
        let mut r = reactor();
        r.add(3, Interest::READ, CoroId::new(1));
        r.add(3, Interest::READ, CoroId::new(2));
    }

    #[test]
    #[should_panic(expected = "still waits on it")]
    fn clean_with_waiter_panics() {
        let mut r = reactor();
        r.add(3, Interest::WRITE, CoroId::new(1));
        r.clean(3);
    }

    #[test]
    fn reconciliation_coalesces_to_one_kernel_operation() {
        let mut r = reactor();
        let mut sched = Recorder::default();

        r.add(4, Interest::READ, CoroId::new(1));
        r.remove(4, Interest::READ);
        r.add(4, Interest::WRITE, CoroId::new(2));

        assert!(!probe(&mut r, &mut sched));
        assert_eq!(r.pollset.ops, vec![Op::Install(4, Interest::WRITE)]);
        assert_mask_mirror(&r);
    }

    #[test]
    fn add_then_remove_round_trips_without_kernel_calls() {
        let mut r = reactor();
        let mut sched = Recorder::default();

        r.add(9, Interest::BOTH, CoroId::new(1));
        r.remove(9, Interest::BOTH);

        assert!(!probe(&mut r, &mut sched));
        assert!(r.pollset.ops.is_empty());
        assert_mask_mirror(&r);
    }

    #[test]
    fn change_list_holds_each_descriptor_once() {
        let mut r = reactor();

        r.add(3, Interest::READ, CoroId::new(1));
        r.remove(3, Interest::READ);
        r.add(3, Interest::WRITE, CoroId::new(2));
        r.add(6, Interest::READ, CoroId::new(3));
        r.remove(6, Interest::READ);

        let mut seen = Vec::new();
        let mut fd = r.change_head;
        while fd != NIL && fd != END {
            assert!(!seen.contains(&fd), "descriptor {fd} enqueued twice");
            seen.push(fd);
            fd = r.slots[fd as usize].next_change;
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn split_resumption_leaves_other_waiter_suspended() {
        let mut r = reactor();
        let mut sched = Recorder::default();
        let (a, b) = (CoroId::new(1), CoroId::new(2));

        r.add(7, Interest::READ, a);
        r.add(7, Interest::WRITE, b);
        r.pollset.scripted.push(ready(7, true, false, false));

        assert!(probe(&mut r, &mut sched));
        assert_eq!(sched.resumed, vec![(a, Readiness::READ)]);
        assert_eq!(r.slots[7].out_waiter, Some(b));

        // Next reconciliation narrows the kernel mask to WRITE only.
        assert!(!probe(&mut r, &mut sched));
        assert_eq!(r.pollset.registered.get(&7), Some(&Interest::WRITE));
        assert_mask_mirror(&r);
    }

    #[test]
    fn both_directions_resume_once_with_union() {
        let mut r = reactor();
        let mut sched = Recorder::default();
        let a = CoroId::new(1);

        r.add(7, Interest::BOTH, a);
        r.pollset.scripted.push(ready(7, true, true, false));

        assert!(probe(&mut r, &mut sched));
        assert_eq!(sched.resumed, vec![(a, Readiness::READ | Readiness::WRITE)]);
        assert!(r.slots[7].in_waiter.is_none());
        assert!(r.slots[7].out_waiter.is_none());
    }

    #[test]
    fn partial_readiness_still_clears_both_directions() {
        let mut r = reactor();
        let mut sched = Recorder::default();
        let a = CoroId::new(1);

        r.add(7, Interest::BOTH, a);
        r.pollset.scripted.push(ready(7, false, true, false));

        assert!(probe(&mut r, &mut sched));
        assert_eq!(sched.resumed, vec![(a, Readiness::WRITE)]);
        assert!(r.slots[7].in_waiter.is_none());
        assert!(r.slots[7].out_waiter.is_none());
    }

    #[test]
    fn error_fans_out_to_both_waiters() {
        let mut r = reactor();
        let mut sched = Recorder::default();
        let (a, b) = (CoroId::new(1), CoroId::new(2));

        r.add(8, Interest::READ, a);
        r.add(8, Interest::WRITE, b);
        r.pollset.scripted.push(ready(8, false, false, true));

        assert!(probe(&mut r, &mut sched));
        assert_eq!(
            sched.resumed,
            vec![(a, Readiness::ERR), (b, Readiness::ERR)]
        );
    }

    #[test]
    fn event_without_waiters_is_ignored() {
        let mut r = reactor();
        let mut sched = Recorder::default();

        r.add(5, Interest::READ, CoroId::new(1));
        assert!(!probe(&mut r, &mut sched));

        // Wait was cancelled; a level-triggered event may still arrive.
        r.remove(5, Interest::READ);
        r.pollset.scripted.push(ready(5, true, false, false));

        assert!(!probe(&mut r, &mut sched));
        assert!(sched.resumed.is_empty());
        assert!(r.pollset.registered.is_empty());
        assert_mask_mirror(&r);
    }

    #[test]
    fn clean_removes_kernel_subscription() {
        let mut r = reactor();
        let mut sched = Recorder::default();

        r.add(5, Interest::READ, CoroId::new(1));
        assert!(!probe(&mut r, &mut sched));

        r.remove(5, Interest::READ);
        r.clean(5);

        assert!(r.pollset.registered.is_empty());
        assert!(r.slots[5].installed.is_empty());

        // Reconciliation after clean finds nothing left to do.
        let ops = r.pollset.ops.len();
        assert!(!probe(&mut r, &mut sched));
        assert_eq!(r.pollset.ops.len(), ops);
    }

    #[test]
    fn clean_tolerates_descriptor_closed_elsewhere() {
        let mut r = reactor();
        let mut sched = Recorder::default();

        r.add(5, Interest::READ, CoroId::new(1));
        assert!(!probe(&mut r, &mut sched));

        // Kernel already dropped the registration (descriptor closed
        // behind the poller's back).
        r.pollset.registered.clear();

        r.remove(5, Interest::READ);
        r.clean(5);
        assert!(r.slots[5].installed.is_empty());
    }

    #[test]
    fn spurious_event_for_unknown_descriptor_is_ignored() {
        let mut r = reactor();
        let mut sched = Recorder::default();

        r.pollset.scripted.push(ready(42, true, false, false));
        assert!(!probe(&mut r, &mut sched));
        assert!(sched.resumed.is_empty());
    }

    #[test]
    fn resumptions_follow_kernel_event_order() {
        let mut r = reactor();
        let mut sched = Recorder::default();
        let (a, b) = (CoroId::new(1), CoroId::new(2));

        r.add(3, Interest::READ, a);
        r.add(4, Interest::READ, b);
        r.pollset.scripted.push(ready(4, true, false, false));
        r.pollset.scripted.push(ready(3, true, false, false));

        assert!(probe(&mut r, &mut sched));
        assert_eq!(
            sched.resumed,
            vec![(b, Readiness::READ), (a, Readiness::READ)]
        );
    }
}
