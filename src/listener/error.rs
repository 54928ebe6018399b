//! Errors surfaced by the listener manager

use super::listenable::{ChannelKind, Listenable};
use thiserror::Error;

/// Errors returned to callers of the listener manager
///
/// Timing races (reads before the first sample, listener failures) are never
/// reported here; they are logged and absorbed. Only misuse and lifecycle
/// problems reach the caller.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// A read accessor was called with an identity from the wrong range
    #[error("Attempt to read {expected} value of control {channel}, which is not {expected}")]
    InvalidArgument {
        channel: Listenable,
        expected: ChannelKind,
        actual: ChannelKind,
    },

    /// The dispatch thread could not be created
    #[error("Failed to spawn dispatch thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// The dispatch thread panicked outside of a listener
    #[error("Dispatch loop panicked: {0}")]
    LoopPanicked(String),
}
