// NV7 Controller — Gesture Debouncer
//
// Turns the stream of classified ladder readings into discrete press and
// hold gestures. Designed to be fed once per controller poll.
//
// A button has to be classified on `accuracy` consecutive polls before a
// press is confirmed. Any poll that classifies nothing clears the register,
// so a single noisy read restarts the count.

use std::time::{Duration, Instant};

use crate::events::{Button, Gesture};

/// Tracks the button currently suspected to be down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ButtonRegister {
    button: Button,
    since: Instant,
    accuracy: u32,
    held: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Suspected(Button),
    Confirmed(Button),
    Held(Button),
}

pub struct GestureDebouncer {
    accuracy_target: u32,
    hold_duration: Duration,
    register: Option<ButtonRegister>,
}

impl GestureDebouncer {
    pub fn new(accuracy_target: u32, hold_duration: Duration) -> Self {
        Self {
            accuracy_target: accuracy_target.max(1),
            hold_duration,
            register: None,
        }
    }

    /// Feed one poll's classification. Returns the gestures it completes,
    /// press before hold when both land on the same poll.
    pub fn observe(&mut self, classified: Option<Button>, now: Instant) -> Vec<Gesture> {
        let mut gestures = Vec::new();

        let Some(button) = classified else {
            self.register = None;
            return gestures;
        };

        if self.register.is_some_and(|reg| reg.button != button) {
            self.register = None;
        }
        let register = self.register.get_or_insert(ButtonRegister {
            button,
            since: now,
            accuracy: 0,
            held: false,
        });

        register.accuracy = register.accuracy.saturating_add(1);
        if register.accuracy == self.accuracy_target {
            gestures.push(Gesture::Press(button));
        }

        if !register.held && now.saturating_duration_since(register.since) > self.hold_duration {
            register.held = true;
            gestures.push(Gesture::Hold(button));
        }

        gestures
    }

    pub fn state(&self) -> DebounceState {
        match self.register {
            None => DebounceState::Idle,
            Some(reg) if reg.held => DebounceState::Held(reg.button),
            Some(reg) if reg.accuracy >= self.accuracy_target => DebounceState::Confirmed(reg.button),
            Some(reg) => DebounceState::Suspected(reg.button),
        }
    }
}
