use std::io;

use thiserror::Error;

/// Errors surfaced while bringing the poller up.
///
/// Everything past construction follows a stricter regime: kernel
/// desynchronization is a programmer error and panics, interrupted
/// waits are retried, and per-descriptor error conditions travel to
/// waiters as the [`ERR`](crate::Readiness::ERR) readiness flag.
#[derive(Debug, Error)]
pub enum Error {
    /// The kernel refused to create the pollset handle.
    #[error("failed to create kernel pollset: {0}")]
    PollsetCreate(#[source] io::Error),

    /// The process descriptor limit could not be determined.
    #[error("failed to query descriptor limit: {0}")]
    DescriptorLimit(#[source] io::Error),
}
