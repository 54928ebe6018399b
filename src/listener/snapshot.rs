//! Snapshots, the sampler that produces them and the store that serves them
//!
//! A [`Snapshot`] is one complete reading of every sampled channel. It is built
//! in full by the [`Sampler`] before anyone else can see it, then published to
//! the [`SnapshotStore`] behind an `Arc`. Readers either copy a single value out
//! under the lock or take the `Arc` and read as many fields as they like from
//! the same instant.

use super::error::ListenerError;
use super::listenable::{Axis, Button, ChannelKind, Listenable};
use crate::source::{InputSource, RawIndexTable};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

/// One immutable reading of all buttons and axes
#[derive(Clone, Debug)]
pub struct Snapshot {
    buttons: [bool; Button::COUNT],
    axes: [f64; Axis::COUNT],
    taken_at: DateTime<Local>,
}

impl Snapshot {
    pub fn new(buttons: [bool; Button::COUNT], axes: [f64; Axis::COUNT]) -> Self {
        Self {
            buttons,
            axes,
            taken_at: Local::now(),
        }
    }

    pub fn button(&self, button: Button) -> bool {
        self.buttons[button.index()]
    }

    pub fn axis(&self, axis: Axis) -> f64 {
        self.axes[axis.index()]
    }

    /// Value of any identity; release identities are the negated press value
    pub fn value(&self, channel: Listenable) -> ChannelValue {
        match channel {
            Listenable::Down(button) => ChannelValue::Boolean(self.button(button)),
            Listenable::Up(button) => ChannelValue::Boolean(!self.button(button)),
            Listenable::Axis(axis) => ChannelValue::Axis(self.axis(axis)),
        }
    }

    pub fn taken_at(&self) -> DateTime<Local> {
        self.taken_at
    }
}

/// Equal when no identity would fire between the two; `taken_at` is ignored.
impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.buttons == other.buttons
            && self
                .axes
                .iter()
                .zip(other.axes.iter())
                .all(|(previous, next)| !axis_changed(*previous, *next))
    }
}

// A NaN that stays NaN is not a change
pub(crate) fn axis_changed(previous: f64, next: f64) -> bool {
    previous != next && !(previous.is_nan() && next.is_nan())
}

/// A value read from a channel
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ChannelValue {
    Boolean(bool),
    Axis(f64),
}

impl ChannelValue {
    /// Value reported while no snapshot has been installed yet
    pub fn not_ready_default(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::BooleanDown | ChannelKind::BooleanUp => ChannelValue::Boolean(false),
            ChannelKind::Axis => ChannelValue::Axis(0.0),
        }
    }
}

/// Builds snapshots by querying an input source once per sampled channel
#[derive(Clone)]
pub struct Sampler {
    source: Arc<dyn InputSource>,
    table: RawIndexTable,
}

impl Sampler {
    pub fn new(source: Arc<dyn InputSource>, table: RawIndexTable) -> Self {
        Self { source, table }
    }

    /// Reads every press identity and every axis.
    ///
    /// Release identities are not sampled, they are derived at read time.
    pub fn sample(&self) -> Snapshot {
        self.source.latch();
        let buttons = Button::ALL.map(|button| self.source.read_boolean(self.table.button(button)));
        let axes = Axis::ALL.map(|axis| self.source.read_axis(self.table.axis(axis)));
        Snapshot::new(buttons, axes)
    }
}

/// Holds the currently installed snapshot
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: Mutex<Option<Arc<Snapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The installed snapshot, `None` before the first swap
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.lock().clone()
    }

    /// Installs `snapshot` and hands back the one it replaced
    pub fn swap(&self, snapshot: Arc<Snapshot>) -> Option<Arc<Snapshot>> {
        self.current.lock().replace(snapshot)
    }

    pub fn is_ready(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Point read of any identity.
    ///
    /// Before the first swap this logs a warning and returns the not-ready
    /// default instead of failing.
    pub fn read(&self, channel: Listenable) -> ChannelValue {
        let value = self
            .current
            .lock()
            .as_ref()
            .map(|snapshot| snapshot.value(channel));

        value.unwrap_or_else(|| {
            warn!(
                "Attempt to read {} from a listener manager whose loop has not finished starting",
                channel
            );
            ChannelValue::not_ready_default(channel.kind())
        })
    }
}

/// Read-only view of the snapshot store
///
/// Cheap to clone. Listeners capture one of these instead of the manager.
#[derive(Debug, Clone)]
pub struct ChannelReader {
    store: Arc<SnapshotStore>,
}

impl ChannelReader {
    pub(crate) fn new(store: Arc<SnapshotStore>) -> Self {
        Self { store }
    }

    /// Pressed state of a press or release identity.
    ///
    /// For a release identity this is `true` while the button is *not* held.
    pub fn read_boolean(&self, channel: Listenable) -> Result<bool, ListenerError> {
        match self.store.read(check_range(channel, ChannelKind::BooleanDown)?) {
            ChannelValue::Boolean(value) => Ok(value),
            ChannelValue::Axis(_) => Err(range_error(channel, ChannelKind::BooleanDown)),
        }
    }

    pub fn read_axis(&self, channel: Listenable) -> Result<f64, ListenerError> {
        match self.store.read(check_range(channel, ChannelKind::Axis)?) {
            ChannelValue::Axis(value) => Ok(value),
            ChannelValue::Boolean(_) => Err(range_error(channel, ChannelKind::Axis)),
        }
    }

    /// The whole installed snapshot, for consistent multi-channel reads
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.store.current()
    }

    pub fn is_ready(&self) -> bool {
        self.store.is_ready()
    }
}

fn check_range(channel: Listenable, expected: ChannelKind) -> Result<Listenable, ListenerError> {
    if channel.kind().is_boolean() == expected.is_boolean() {
        Ok(channel)
    } else {
        Err(range_error(channel, expected))
    }
}

fn range_error(channel: Listenable, expected: ChannelKind) -> ListenerError {
    ListenerError::InvalidArgument {
        channel,
        expected,
        actual: channel.kind(),
    }
}
