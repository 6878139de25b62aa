// NV7 Controller — Application State Machine
//
// Owns the active channel, per-channel on/off + theme/colour cursors and the
// global speed level. Gestures come in, events go out to the publishers.
// Only the controller poll thread touches this, so there is no locking.

use crate::config::{ThemeConfig, SPEED_LEVELS};
use crate::events::{Button, Channel, Event, EventKind, Gesture, StateSnapshot};
use crate::publisher::PublisherSet;

/// Named palette with a cyclic colour cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    name: String,
    colours: Vec<String>,
    colour_index: usize,
}

impl Theme {
    pub fn new(name: impl Into<String>, colours: Vec<String>) -> Self {
        Self {
            name: name.into(),
            colours,
            colour_index: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn colour(&self) -> &str {
        self.colours
            .get(self.colour_index)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn colour_index(&self) -> usize {
        self.colour_index
    }

    pub fn next_colour(&mut self) {
        if !self.colours.is_empty() {
            self.colour_index = (self.colour_index + 1) % self.colours.len();
        }
    }
}

impl From<&ThemeConfig> for Theme {
    fn from(cfg: &ThemeConfig) -> Self {
        Self::new(cfg.name.clone(), cfg.colours.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelState {
    pub is_on: bool,
    theme_index: usize,
    themes: Vec<Theme>,
}

impl ChannelState {
    fn new(themes: Vec<Theme>) -> Self {
        Self {
            is_on: true,
            theme_index: 0,
            themes,
        }
    }

    pub fn theme_index(&self) -> usize {
        self.theme_index
    }

    pub fn theme(&self) -> Option<&Theme> {
        self.themes.get(self.theme_index)
    }

    fn next_theme(&mut self) {
        if !self.themes.is_empty() {
            self.theme_index = (self.theme_index + 1) % self.themes.len();
        }
    }

    fn next_colour(&mut self) {
        if let Some(theme) = self.themes.get_mut(self.theme_index) {
            theme.next_colour();
        }
    }
}

pub struct StateMachine {
    channel: Channel,
    channels: [ChannelState; Channel::COUNT],
    speed: u8,
    publishers: PublisherSet,
}

impl StateMachine {
    /// Starts on channel A with both channels on, first theme, lowest speed,
    /// and publishes `Start` straight away.
    pub fn new(themes: &[ThemeConfig], publishers: PublisherSet) -> Self {
        let themes: Vec<Theme> = themes.iter().map(Theme::from).collect();
        let mut machine = Self {
            channel: Channel::A,
            channels: [ChannelState::new(themes.clone()), ChannelState::new(themes)],
            speed: 0,
            publishers,
        };
        machine.emit(EventKind::Start, Button::None);
        machine
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn channel_state(&self, channel: Channel) -> &ChannelState {
        &self.channels[channel.index()]
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let theme = self.active().theme();
        StateSnapshot {
            speed: self.speed + 1,
            theme: theme.map(|t| t.name().to_string()).unwrap_or_default(),
            colour: theme.map(|t| t.colour().to_string()).unwrap_or_default(),
        }
    }

    /// Apply one gesture; returns the events published for it, in order.
    pub fn apply(&mut self, gesture: Gesture) -> Vec<Event> {
        match gesture {
            Gesture::Press(button) => self.handle_press(button),
            Gesture::Hold(button) => self.handle_hold(button),
        }
    }

    fn handle_press(&mut self, button: Button) -> Vec<Event> {
        let mut events = Vec::with_capacity(2);

        match button {
            Button::Channel => self.channel = self.channel.toggled(),
            Button::Mode => {
                let active = self.active_mut();
                if active.is_on {
                    active.next_theme();
                } else {
                    // Waking a channel does not also skip its theme.
                    active.is_on = true;
                    events.push(self.emit(EventKind::ChannelTurnedOn, button));
                }
            }
            Button::Speed => self.speed = (self.speed + 1) % SPEED_LEVELS,
            Button::Colour => self.active_mut().next_colour(),
            Button::None => {}
        }

        events.push(self.emit(EventKind::ButtonPress, button));
        events
    }

    fn handle_hold(&mut self, button: Button) -> Vec<Event> {
        let mut events = Vec::with_capacity(2);

        if button == Button::Mode {
            self.active_mut().is_on = false;
            events.push(self.emit(EventKind::ChannelTurnedOff, button));
        }

        events.push(self.emit(EventKind::ButtonHold, button));
        events
    }

    fn active(&self) -> &ChannelState {
        &self.channels[self.channel.index()]
    }

    fn active_mut(&mut self) -> &mut ChannelState {
        &mut self.channels[self.channel.index()]
    }

    fn emit(&mut self, kind: EventKind, button: Button) -> Event {
        let event = Event {
            kind,
            button,
            channel: self.channel,
            state: self.snapshot(),
        };
        self.publishers.publish(&event);
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_themes;

    fn machine() -> StateMachine {
        StateMachine::new(&default_themes(), PublisherSet::new())
    }

    fn kinds(events: &[Event]) -> Vec<EventKind> {
        events.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn initial_state() {
        let m = machine();
        assert_eq!(m.channel(), Channel::A);
        assert!(m.channel_state(Channel::A).is_on);
        assert!(m.channel_state(Channel::B).is_on);
        assert_eq!(m.speed(), 0);
        assert_eq!(
            m.snapshot(),
            StateSnapshot { speed: 1, theme: "Theme 1".into(), colour: "red".into() }
        );
    }

    #[test]
    fn channel_press_twice_returns_to_start() {
        let mut m = machine();
        let events = m.apply(Gesture::Press(Button::Channel));
        assert_eq!(events[0].channel, Channel::B);
        m.apply(Gesture::Press(Button::Channel));
        assert_eq!(m.channel(), Channel::A);
    }

    #[test]
    fn channels_keep_independent_state() {
        let mut m = machine();
        m.apply(Gesture::Press(Button::Colour));
        m.apply(Gesture::Press(Button::Channel));
        assert_eq!(m.snapshot().colour, "red");
        m.apply(Gesture::Press(Button::Channel));
        assert_eq!(m.snapshot().colour, "green");
    }

    #[test]
    fn speed_wraps_after_three_levels() {
        let mut m = machine();
        let speeds: Vec<u8> = (0..4)
            .map(|_| m.apply(Gesture::Press(Button::Speed))[0].state.speed)
            .collect();
        assert_eq!(speeds, vec![2, 3, 1, 2]);
    }

    #[test]
    fn colour_cursor_wraps() {
        let mut m = machine();
        for _ in 0..3 {
            m.apply(Gesture::Press(Button::Colour));
        }
        assert_eq!(m.channel_state(Channel::A).theme().unwrap().colour_index(), 0);
        assert_eq!(m.snapshot().colour, "red");
    }

    #[test]
    fn mode_press_on_advances_theme() {
        let mut m = machine();
        let events = m.apply(Gesture::Press(Button::Mode));
        assert_eq!(kinds(&events), vec![EventKind::ButtonPress]);
        assert_eq!(events[0].state.theme, "Theme 2");
    }

    #[test]
    fn theme_index_wraps() {
        let mut m = machine();
        for _ in 0..3 {
            m.apply(Gesture::Press(Button::Mode));
        }
        assert_eq!(m.channel_state(Channel::A).theme_index(), 0);
    }

    #[test]
    fn colour_cursor_survives_theme_change() {
        let mut m = machine();
        m.apply(Gesture::Press(Button::Colour));
        m.apply(Gesture::Press(Button::Mode));
        m.apply(Gesture::Press(Button::Mode));
        m.apply(Gesture::Press(Button::Mode));
        assert_eq!(m.snapshot().theme, "Theme 1");
        assert_eq!(m.snapshot().colour, "green");
    }

    #[test]
    fn mode_hold_turns_channel_off() {
        let mut m = machine();
        let events = m.apply(Gesture::Hold(Button::Mode));
        assert_eq!(kinds(&events), vec![EventKind::ChannelTurnedOff, EventKind::ButtonHold]);
        assert!(!m.channel_state(Channel::A).is_on);
        assert!(m.channel_state(Channel::B).is_on);

        // Already off: still off, still reported.
        let events = m.apply(Gesture::Hold(Button::Mode));
        assert_eq!(kinds(&events), vec![EventKind::ChannelTurnedOff, EventKind::ButtonHold]);
        assert!(!m.channel_state(Channel::A).is_on);
    }

    #[test]
    fn mode_press_while_off_turns_on_without_advancing() {
        let mut m = machine();
        m.apply(Gesture::Hold(Button::Mode));

        let events = m.apply(Gesture::Press(Button::Mode));
        assert_eq!(kinds(&events), vec![EventKind::ChannelTurnedOn, EventKind::ButtonPress]);
        assert!(m.channel_state(Channel::A).is_on);
        assert_eq!(m.snapshot().theme, "Theme 1");

        m.apply(Gesture::Press(Button::Mode));
        assert_eq!(m.snapshot().theme, "Theme 2");
    }

    #[test]
    fn other_holds_only_report() {
        let mut m = machine();
        for button in [Button::Channel, Button::Speed, Button::Colour, Button::None] {
            let events = m.apply(Gesture::Hold(button));
            assert_eq!(kinds(&events), vec![EventKind::ButtonHold]);
            assert_eq!(events[0].button, button);
        }
        assert_eq!(m.channel(), Channel::A);
        assert_eq!(m.speed(), 0);
    }
}
