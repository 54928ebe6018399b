//! Gamepad-backed input source
//!
//! A dedicated collector thread owns the gilrs context, keeps track of the
//! active gamepad and mirrors its button and axis state into a shared frame.
//! The dispatcher reads that frame by raw index through [`InputSource`].
//!
//! ```text
//! gilrs ──► GamepadCollector<Collecting> ──► live frame ──latch()──► latched frame ──► read_*
//!           (collector thread)                                        (dispatch thread)
//! ```
//!
//! # Raw indices
//!
//! | index | button      | index | axis                          |
//! |-------|-------------|-------|-------------------------------|
//! | 1     | A (South)   | 0     | left stick X                  |
//! | 2     | B (East)    | 1     | left stick Y                  |
//! | 3     | X (West)    | 2     | triggers (right minus left)   |
//! | 4     | Y (North)   | 3     | right trigger                 |
//! | 5     | LB          | 4     | right stick X                 |
//! | 6     | RB          | 5     | right stick Y                 |
//! | 7     | Back        |       |                               |
//! | 8     | Start       |       |                               |
//! | 9     | L3          |       |                               |
//! | 10    | R3          |       |                               |

use super::InputSource;
use gilrs::{Axis as GilrsAxis, Button as GilrsButton, Event, EventType, GamepadId, Gilrs};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use statum::{machine, state};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const BUTTON_SLOTS: usize = 11;
const AXIS_SLOTS: usize = 6;

/// Settings for the gamepad adapter
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GamepadSettings {
    /// Analog stick deadzone as a fraction (0.0-1.0)
    pub joystick_deadzone: f32,

    /// How often the collector thread refreshes the frame
    pub refresh_interval_ms: u64,
}

impl Default for GamepadSettings {
    fn default() -> Self {
        Self {
            joystick_deadzone: 0.05,
            refresh_interval_ms: 10,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to initialize gamepad source: {0}")]
    InitializationError(String),

    #[error("Gamepad collector thread failed: {0}")]
    CollectorThread(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct GamepadFrame {
    buttons: [bool; BUTTON_SLOTS],
    axes: [f64; AXIS_SLOTS],
}

#[state]
#[derive(Debug, Clone)]
pub enum CollectorState {
    Initializing,
    Collecting,
}

#[machine]
struct GamepadCollector<S: CollectorState> {
    gilrs: Gilrs,
    active_gamepad: Option<GamepadId>,
    settings: GamepadSettings,
    live: Arc<RwLock<GamepadFrame>>,
    stop: Arc<AtomicBool>,
}

impl GamepadCollector<Initializing> {
    fn create(
        settings: GamepadSettings,
        live: Arc<RwLock<GamepadFrame>>,
        stop: Arc<AtomicBool>,
    ) -> Result<Self, SourceError> {
        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => g,
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(SourceError::InitializationError(e.to_string()));
            }
        };

        Ok(Self::new(gilrs, None, settings, live, stop))
    }

    fn initialize(mut self) -> GamepadCollector<Collecting> {
        let gamepads: Vec<_> = self
            .gilrs
            .gamepads()
            .map(|(id, gamepad)| (id, gamepad.name().to_string()))
            .collect();

        if gamepads.is_empty() {
            warn!("No gamepad connected, reads stay neutral until one appears");
        } else {
            for (idx, (id, name)) in gamepads.iter().enumerate() {
                info!("  [{}] ID: {}, Name: {}", idx, id, name);
            }
            let (id, name) = &gamepads[0];
            self.active_gamepad = Some(*id);
            info!("Selected gamepad: {} ({})", name, id);
        }

        self.transition()
    }
}

impl GamepadCollector<Collecting> {
    fn run(&mut self) {
        info!("Gamepad collector running");
        let pause = Duration::from_millis(self.settings.refresh_interval_ms.max(1));

        while !self.stop.load(Ordering::Acquire) {
            self.drain_events();
            let frame = self.read_frame();
            *self.live.write() = frame;
            std::thread::sleep(pause);
        }

        info!("Gamepad collector stopped");
    }

    // Consume pending events so gilrs updates its cached state
    fn drain_events(&mut self) {
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            match event {
                EventType::Connected => {
                    if self.active_gamepad.is_none() {
                        info!("Gamepad {} connected, selecting it", id);
                        self.active_gamepad = Some(id);
                    }
                }
                EventType::Disconnected => {
                    if self.active_gamepad == Some(id) {
                        warn!("Active gamepad {} disconnected", id);
                        self.active_gamepad = self
                            .gilrs
                            .gamepads()
                            .map(|(other, _)| other)
                            .find(|other| *other != id);
                    }
                }
                _ => {}
            }
        }
    }

    fn read_frame(&self) -> GamepadFrame {
        let mut frame = GamepadFrame::default();
        let Some(gamepad) = self
            .active_gamepad
            .and_then(|id| self.gilrs.connected_gamepad(id))
        else {
            return frame;
        };

        for (slot, button) in BUTTON_ORDER.iter().enumerate() {
            frame.buttons[slot + 1] = gamepad.is_pressed(*button);
        }

        let deadzone = self.settings.joystick_deadzone;
        let stick = |axis| apply_deadzone(gamepad.value(axis), deadzone) as f64;
        let trigger = |button| {
            gamepad
                .button_data(button)
                .map(|data| data.value() as f64)
                .unwrap_or(0.0)
        };

        let left_trigger = trigger(GilrsButton::LeftTrigger2);
        let right_trigger = trigger(GilrsButton::RightTrigger2);
        frame.axes = [
            stick(GilrsAxis::LeftStickX),
            stick(GilrsAxis::LeftStickY),
            right_trigger - left_trigger,
            right_trigger,
            stick(GilrsAxis::RightStickX),
            stick(GilrsAxis::RightStickY),
        ];
        frame
    }
}

// Raw button index n reads BUTTON_ORDER[n - 1]
const BUTTON_ORDER: [GilrsButton; BUTTON_SLOTS - 1] = [
    GilrsButton::South,
    GilrsButton::East,
    GilrsButton::West,
    GilrsButton::North,
    GilrsButton::LeftTrigger,
    GilrsButton::RightTrigger,
    GilrsButton::Select,
    GilrsButton::Start,
    GilrsButton::LeftThumb,
    GilrsButton::RightThumb,
];

/// Input source backed by the first connected gamepad
pub struct GamepadSource {
    live: Arc<RwLock<GamepadFrame>>,
    latched: RwLock<GamepadFrame>,
    stop: Arc<AtomicBool>,
    collector: Option<JoinHandle<()>>,
}

impl GamepadSource {
    /// Starts the collector thread and waits until gilrs is up.
    pub fn spawn(settings: Option<GamepadSettings>) -> Result<Self, SourceError> {
        let settings = settings.unwrap_or_default();
        info!("Spawning gamepad collector with settings: {:?}", settings);

        let live = Arc::new(RwLock::new(GamepadFrame::default()));
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_live = live.clone();
        let thread_stop = stop.clone();
        let collector = std::thread::Builder::new()
            .name("gamepad-collector".to_string())
            .spawn(move || {
                match GamepadCollector::create(settings, thread_live, thread_stop) {
                    Ok(collector) => {
                        let _ = ready_tx.send(Ok(()));
                        collector.initialize().run();
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| SourceError::CollectorThread(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("Gamepad source ready");
                Ok(Self {
                    live,
                    latched: RwLock::new(GamepadFrame::default()),
                    stop,
                    collector: Some(collector),
                })
            }
            Ok(Err(e)) => {
                let _ = collector.join();
                Err(e)
            }
            Err(e) => Err(SourceError::CollectorThread(e.to_string())),
        }
    }
}

impl InputSource for GamepadSource {
    fn read_boolean(&self, raw_index: u32) -> bool {
        match self.latched.read().buttons.get(raw_index as usize) {
            Some(pressed) if raw_index > 0 => *pressed,
            _ => {
                debug!("No gamepad button at raw index {}", raw_index);
                false
            }
        }
    }

    fn read_axis(&self, raw_index: u32) -> f64 {
        match self.latched.read().axes.get(raw_index as usize) {
            Some(value) => *value,
            None => {
                debug!("No gamepad axis at raw index {}", raw_index);
                0.0
            }
        }
    }

    fn latch(&self) {
        let frame = *self.live.read();
        *self.latched.write() = frame;
    }
}

impl Drop for GamepadSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(collector) = self.collector.take() {
            if collector.join().is_err() {
                error!("Gamepad collector thread panicked");
            }
        }
    }
}

// Rescale the value to the range outside the deadzone
fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else {
        let sign = if value < 0.0 { -1.0 } else { 1.0 };
        sign * (value.abs() - deadzone) / (1.0 - deadzone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadzone_zeroes_small_values_and_rescales_the_rest() {
        assert_eq!(apply_deadzone(0.04, 0.05), 0.0);
        assert_eq!(apply_deadzone(-0.04, 0.05), 0.0);
        assert!((apply_deadzone(1.0, 0.05) - 1.0).abs() < f32::EPSILON);
        assert!((apply_deadzone(-1.0, 0.05) + 1.0).abs() < f32::EPSILON);
        assert!((apply_deadzone(0.525, 0.05) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn default_refresh_is_fast_enough_without_spinning() {
        let refresh = GamepadSettings::default().refresh_interval_ms;
        let poll = crate::listener::ManagerSettings::default().poll_interval_ms;
        assert!(refresh >= 5);
        assert!(refresh <= poll);
    }

    #[test]
    fn latched_frame_serves_reads_until_next_latch() {
        let source = GamepadSource {
            live: Arc::new(RwLock::new(GamepadFrame::default())),
            latched: RwLock::new(GamepadFrame::default()),
            stop: Arc::new(AtomicBool::new(false)),
            collector: None,
        };

        source.live.write().buttons[1] = true;
        source.live.write().axes[4] = 0.75;
        assert!(!source.read_boolean(1));

        source.latch();
        assert!(source.read_boolean(1));
        assert_eq!(source.read_axis(4), 0.75);
    }

    #[test]
    fn out_of_range_indices_read_neutral() {
        let source = GamepadSource {
            live: Arc::new(RwLock::new(GamepadFrame::default())),
            latched: RwLock::new(GamepadFrame {
                buttons: [true; BUTTON_SLOTS],
                axes: [1.0; AXIS_SLOTS],
            }),
            stop: Arc::new(AtomicBool::new(false)),
            collector: None,
        };

        assert!(!source.read_boolean(0));
        assert!(!source.read_boolean(99));
        assert_eq!(source.read_axis(6), 0.0);
    }
}
