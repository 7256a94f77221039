//! Transfer error taxonomy.

use std::time::Duration;

use gridlink_core::PayloadError;

use crate::link::LinkError;

/// Everything that can end an upload attempt.
///
/// No variant is retried inside this crate; retry policy belongs to the
/// caller.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Raised before any connection attempt.
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] PayloadError),

    #[error("no device named {prefix}* found within {timeout:?}")]
    DeviceNotFound { prefix: String, timeout: Duration },

    #[error("connection error: {0}")]
    Connection(#[source] LinkError),

    /// Frame `frame` (0-based, in write order) was not confirmed.
    #[error("write of frame {frame} failed: {source}")]
    WriteFailure {
        frame: usize,
        #[source]
        source: LinkError,
    },

    #[error("status channel closed")]
    ChannelClosed,

    #[error("transfer cancelled after {sent} of {total} bytes")]
    Cancelled { sent: usize, total: usize },

    #[error("session already started")]
    SessionReused,
}
