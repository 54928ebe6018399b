//! Channel catalog
//!
//! Every input the dispatcher knows about is a [`Listenable`]. Buttons appear
//! twice, once as a press identity ([`Listenable::Down`]) and once as a release
//! identity ([`Listenable::Up`]); both refer to the same physical control.
//! Axes have a single identity each.
//!
//! ```text
//! Down(A) .. Down(R3) │ Up(A) .. Up(R3) │ Axis(JOY1X) .. Axis(JOY2Y)
//!   sampled           │   derived (!down) │   sampled
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical buttons of the controller, in catalog order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Button {
    A,
    B,
    X,
    Y,
    LeftBumper,
    RightBumper,
    Back,
    Start,
    LeftStick,
    RightStick,
}

impl Button {
    pub const COUNT: usize = 10;

    pub const ALL: [Button; Button::COUNT] = [
        Button::A,
        Button::B,
        Button::X,
        Button::Y,
        Button::LeftBumper,
        Button::RightBumper,
        Button::Back,
        Button::Start,
        Button::LeftStick,
        Button::RightStick,
    ];

    /// Dense position of this button inside [`Button::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    fn label(self) -> &'static str {
        match self {
            Button::A => "A",
            Button::B => "B",
            Button::X => "X",
            Button::Y => "Y",
            Button::LeftBumper => "LB",
            Button::RightBumper => "RB",
            Button::Back => "BACK",
            Button::Start => "START",
            Button::LeftStick => "L3",
            Button::RightStick => "R3",
        }
    }
}

/// Continuous channels of the controller, in catalog order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Axis {
    Joy1X,
    Joy1Y,
    Triggers,
    Joy2X,
    Joy2Y,
}

impl Axis {
    pub const COUNT: usize = 5;

    pub const ALL: [Axis; Axis::COUNT] = [
        Axis::Joy1X,
        Axis::Joy1Y,
        Axis::Triggers,
        Axis::Joy2X,
        Axis::Joy2Y,
    ];

    /// Dense position of this axis inside [`Axis::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    fn label(self) -> &'static str {
        match self {
            Axis::Joy1X => "JOY1X",
            Axis::Joy1Y => "JOY1Y",
            Axis::Triggers => "TRIGGERS",
            Axis::Joy2X => "JOY2X",
            Axis::Joy2Y => "JOY2Y",
        }
    }
}

/// The range a [`Listenable`] belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    BooleanDown,
    BooleanUp,
    Axis,
}

impl ChannelKind {
    pub fn is_boolean(self) -> bool {
        matches!(self, ChannelKind::BooleanDown | ChannelKind::BooleanUp)
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::BooleanDown | ChannelKind::BooleanUp => write!(f, "boolean"),
            ChannelKind::Axis => write!(f, "axis"),
        }
    }
}

/// Identity of a channel listeners can register for
///
/// Ordering is total: all press identities, then all release identities,
/// then all axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Listenable {
    /// Fires when the button goes from released to pressed
    Down(Button),
    /// Fires when the button goes from pressed to released
    Up(Button),
    /// Fires whenever the axis value changes
    Axis(Axis),
}

impl Listenable {
    pub fn kind(self) -> ChannelKind {
        match self {
            Listenable::Down(_) => ChannelKind::BooleanDown,
            Listenable::Up(_) => ChannelKind::BooleanUp,
            Listenable::Axis(_) => ChannelKind::Axis,
        }
    }

    /// The opposite edge of the same button, `None` for axes
    pub fn paired(self) -> Option<Listenable> {
        match self {
            Listenable::Down(button) => Some(Listenable::Up(button)),
            Listenable::Up(button) => Some(Listenable::Down(button)),
            Listenable::Axis(_) => None,
        }
    }

    /// Every identity in catalog order
    pub fn all() -> impl Iterator<Item = Listenable> {
        Button::ALL
            .into_iter()
            .map(Listenable::Down)
            .chain(Button::ALL.into_iter().map(Listenable::Up))
            .chain(Axis::ALL.into_iter().map(Listenable::Axis))
    }
}

impl fmt::Display for Listenable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Listenable::Down(button) => write!(f, "{}DOWN", button.label()),
            Listenable::Up(button) => write!(f, "{}UP", button.label()),
            Listenable::Axis(axis) => write!(f, "{}", axis.label()),
        }
    }
}
