//! Key-down / key-up edges derived from polled keypad levels.

/// One transition of the 4x4 keypad.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KeyEvent {
    Down(u8),
    Up(u8),
}

/// Turns the "key currently held" level into discrete events.
///
/// Only one event is produced per poll. Rolling from one key straight onto
/// another reports the release first and the new press on the next poll.
///
/// After [`disarm`](Self::disarm) a key that is already down is released
/// silently; only an `Up` whose `Down` was reported afterwards gets through.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct KeypadTracker {
    held: Option<u8>,
    armed: bool,
}

impl KeypadTracker {
    pub const fn new() -> Self {
        Self {
            held: None,
            armed: true,
        }
    }

    pub fn poll(&mut self, level: Option<u8>) -> Option<KeyEvent> {
        match self.edge(level) {
            Some(KeyEvent::Down(key)) => {
                self.armed = true;
                Some(KeyEvent::Down(key))
            }
            Some(KeyEvent::Up(_)) if !self.armed => None,
            event => event,
        }
    }

    /// Swallows the release of whatever key is currently held.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    fn edge(&mut self, level: Option<u8>) -> Option<KeyEvent> {
        match (self.held, level) {
            (None, Some(key)) => {
                self.held = Some(key);
                Some(KeyEvent::Down(key))
            }
            (Some(held), None) => {
                self.held = None;
                Some(KeyEvent::Up(held))
            }
            (Some(held), Some(key)) if held != key => {
                self.held = None;
                Some(KeyEvent::Up(held))
            }
            _ => None,
        }
    }

    pub const fn held(&self) -> Option<u8> {
        self.held
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for KeypadTracker {
    fn default() -> Self {
        Self::new()
    }
}
