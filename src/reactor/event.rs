use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::os::fd::RawFd;

/// Directions a descriptor subscription covers.
///
/// An `Interest` names the readiness directions a coroutine wants to be
/// woken for, and doubles as the subscription mask mirrored against the
/// kernel pollset.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Interest {
    /// Wake when the descriptor becomes readable.
    pub read: bool,

    /// Wake when the descriptor becomes writable.
    pub write: bool,
}

impl Interest {
    /// No direction; the empty subscription mask.
    pub const NONE: Interest = Interest {
        read: false,
        write: false,
    };

    /// Readability only.
    pub const READ: Interest = Interest {
        read: true,
        write: false,
    };

    /// Writability only.
    pub const WRITE: Interest = Interest {
        read: false,
        write: true,
    };

    /// Both directions at once.
    pub const BOTH: Interest = Interest {
        read: true,
        write: true,
    };

    /// Returns `true` when no direction is selected.
    pub const fn is_empty(self) -> bool {
        !self.read && !self.write
    }
}

/// Readiness flags delivered to a resumed coroutine.
///
/// A bitmask over read readiness, write readiness, and error. The error
/// flag is reported to every waiter of the descriptor regardless of the
/// direction it subscribed to; the descriptor is typically no longer
/// usable once it is set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Readiness(u8);

impl Readiness {
    /// No readiness.
    pub const NONE: Readiness = Readiness(0);

    /// The descriptor is readable.
    pub const READ: Readiness = Readiness(0b001);

    /// The descriptor is writable.
    pub const WRITE: Readiness = Readiness(0b010);

    /// The kernel reported an error or hangup condition.
    pub const ERR: Readiness = Readiness(0b100);

    /// Returns `true` when no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` when every flag in `flags` is set in `self`.
    pub const fn contains(self, flags: Readiness) -> bool {
        self.0 & flags.0 == flags.0
    }
}

impl BitOr for Readiness {
    type Output = Readiness;

    fn bitor(self, rhs: Readiness) -> Readiness {
        Readiness(self.0 | rhs.0)
    }
}

impl BitOrAssign for Readiness {
    fn bitor_assign(&mut self, rhs: Readiness) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("NONE");
        }

        let mut first = true;
        for (flag, name) in [
            (Readiness::READ, "READ"),
            (Readiness::WRITE, "WRITE"),
            (Readiness::ERR, "ERR"),
        ] {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }

        Ok(())
    }
}

/// A readiness report produced by a kernel pollset back-end.
///
/// Events carry the raw descriptor; the poller core maps it back to the
/// wait-table slot and splits the report between the read and write
/// waiters.
#[derive(Clone, Copy, Debug)]
pub struct Event {
    /// Descriptor the kernel reported on.
    pub fd: RawFd,

    /// The descriptor is readable.
    pub readable: bool,

    /// The descriptor is writable.
    pub writable: bool,

    /// The kernel flagged an error, hangup, or invalid-descriptor
    /// condition.
    pub error: bool,
}
