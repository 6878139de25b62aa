// NV7 Controller — Buttons, Channels & Published Events

use std::fmt;

// ---------------------------------------------------------------------------
// Button identity (one analog ladder, several voltage bands)
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Button {
    #[default]
    None,
    Channel,
    Mode,
    Speed,
    Colour,
}

impl Button {
    /// Label used on the event boundary.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Channel => "CHANNEL",
            Self::Mode => "MODE",
            Self::Speed => "SPEED",
            Self::Colour => "COLOUR",
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Output channel — exactly one is active
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Channel {
    #[default]
    A,
    B,
}

impl Channel {
    pub const COUNT: usize = 2;

    /// Ordinal used to index per-channel arrays.
    pub fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Gestures produced by the debouncer
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// Button classified for `accuracy` consecutive polls.
    Press(Button),
    /// Button classified continuously for longer than the hold duration.
    Hold(Button),
}

// ---------------------------------------------------------------------------
// Events emitted to publishers
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Start,
    ButtonPress,
    ButtonHold,
    ChannelTurnedOn,
    ChannelTurnedOff,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::ButtonPress => "BUTTON_PRESS",
            Self::ButtonHold => "BUTTON_HOLD",
            Self::ChannelTurnedOn => "CHANNEL_TURNED_ON",
            Self::ChannelTurnedOff => "CHANNEL_TURNED_OFF",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application state as seen by subscribers after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    /// Display speed (internal level + 1).
    pub speed: u8,
    pub theme: String,
    pub colour: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub button: Button,
    pub channel: Channel,
    pub state: StateSnapshot,
}
