//! In-memory input source whose values are set by hand.
//!
//! Useful for headless runs and for tests that need to script exact
//! transitions between two samples.

use super::InputSource;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct VirtualState {
    buttons: HashMap<u32, bool>,
    axes: HashMap<u32, f64>,
}

/// Clonable handle; all clones share the same values.
#[derive(Debug, Clone, Default)]
pub struct VirtualSource {
    state: Arc<RwLock<VirtualState>>,
    latches: Arc<AtomicU64>,
}

impl VirtualSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_button(&self, raw_index: u32, pressed: bool) {
        self.state.write().buttons.insert(raw_index, pressed);
    }

    pub fn set_axis(&self, raw_index: u32, value: f64) {
        self.state.write().axes.insert(raw_index, value);
    }

    /// Resets every index back to released / centered
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.buttons.clear();
        state.axes.clear();
    }

    /// Number of full samples taken from this source so far
    pub fn sample_count(&self) -> u64 {
        self.latches.load(Ordering::Acquire)
    }
}

impl InputSource for VirtualSource {
    fn read_boolean(&self, raw_index: u32) -> bool {
        self.state
            .read()
            .buttons
            .get(&raw_index)
            .copied()
            .unwrap_or(false)
    }

    fn read_axis(&self, raw_index: u32) -> f64 {
        self.state
            .read()
            .axes
            .get(&raw_index)
            .copied()
            .unwrap_or(0.0)
    }

    fn latch(&self) {
        self.latches.fetch_add(1, Ordering::AcqRel);
    }
}
