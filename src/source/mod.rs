//! Input source adapters
//!
//! The dispatcher never talks to hardware directly. It reads raw indices through
//! an [`InputSource`], translated from channel identities by a [`RawIndexTable`].

pub mod gamepad;
pub mod virtual_source;

pub use gamepad::{GamepadSettings, GamepadSource, SourceError};
pub use virtual_source::VirtualSource;

use crate::listener::listenable::{Axis, Button};

/// A device exposing per-index boolean and analog reads
///
/// Implementations are shared between the dispatch thread and whoever built
/// them, so reads take `&self`.
pub trait InputSource: Send + Sync {
    fn read_boolean(&self, raw_index: u32) -> bool;

    fn read_axis(&self, raw_index: u32) -> f64;

    /// Called once before every full sample.
    ///
    /// Adapters that buffer device state can freeze a frame here so the
    /// following reads all come from the same instant.
    fn latch(&self) {}
}

/// Static mapping from channel identity to the adapter's raw index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawIndexTable {
    buttons: [u32; Button::COUNT],
    axes: [u32; Axis::COUNT],
}

impl RawIndexTable {
    pub fn new(buttons: [u32; Button::COUNT], axes: [u32; Axis::COUNT]) -> Self {
        Self { buttons, axes }
    }

    pub fn button(&self, button: Button) -> u32 {
        self.buttons[button.index()]
    }

    pub fn axis(&self, axis: Axis) -> u32 {
        self.axes[axis.index()]
    }
}

impl Default for RawIndexTable {
    /// Xbox layout as reported by the driver station: 1-based buttons,
    /// axis 3 (right trigger) left out because triggers are combined on 2.
    fn default() -> Self {
        Self {
            buttons: [1, 2, 3, 4, 5, 6, 7, 8, 9, 10],
            axes: [0, 1, 2, 4, 5],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_uses_xbox_layout() {
        let table = RawIndexTable::default();
        assert_eq!(table.button(Button::A), 1);
        assert_eq!(table.button(Button::RightStick), 10);
        assert_eq!(table.axis(Axis::Joy1X), 0);
        assert_eq!(table.axis(Axis::Triggers), 2);
        assert_eq!(table.axis(Axis::Joy2Y), 5);
    }
}
