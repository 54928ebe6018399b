//! Polling input-event dispatcher
//!
//! [`ListenerManager`] samples an [`InputSource`](crate::source::InputSource)
//! on a fixed interval and calls the [`Listener`]s registered for every
//! channel that changed since the previous sample.

pub mod dispatcher;
pub mod error;
pub mod listenable;
pub mod listener_manager;
pub mod registry;
pub mod snapshot;

pub use dispatcher::{CycleReport, CycleStats, Dispatcher, DispatchState};
pub use error::ListenerError;
pub use listenable::{Axis, Button, ChannelKind, Listenable};
pub use listener_manager::{ListenerManager, ManagerSettings};
pub use registry::{Listener, ListenerId, ListenerRegistry};
pub use snapshot::{ChannelReader, ChannelValue, Sampler, Snapshot, SnapshotStore};
