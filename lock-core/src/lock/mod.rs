//! Combination lock state machine.
//!
//! [`LockController`] is polled once per main-loop tick. Each call drains at
//! most one direction edge from the quadrature decoder, reads the panel, moves
//! through LOCKED / UNLOCKED / CHANGING / ALARMED, drives the servo and LEDs,
//! and finally redraws the display. ALARMED is never left; only an external
//! reset recovers the device.

use core::fmt::{self, Write};

use heapless::String;

use crate::encoder::{Direction, QuadratureDecoder};
use crate::hal::{BlockingDelay, CharacterDisplay, ControlPanel};
use crate::servo::{Servo, ServoPosition};
use crate::telemetry::{LockEvent, LockEvents};

pub mod combination;
pub mod entry;
pub mod keypad;

pub use combination::{
    CHANGE_SLOTS, COMBINATION_LEN, ChangeBuffer, Combination, CombinationError, Keystroke,
    MAX_DIGIT, RetainedCombination,
};
pub use entry::{DIAL_POSITIONS, EntryProgress, EntryStep};
pub use keypad::{KeyEvent, KeypadTracker};

/// Failed attempts that latch the alarm.
pub const MAX_BAD_TRIES: u8 = 3;

pub const STATUS_ROW: u8 = 0;
pub const ENTRY_ROW: u8 = 1;
pub const BAD_TRIES_ROW: u8 = 2;
pub const STAGING_ROW: u8 = 3;

const ROW_CAPACITY: usize = 32;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LockState {
    Locked,
    Unlocked,
    Changing,
    /// Terminal until reset.
    Alarmed,
}

impl LockState {
    /// Status-row text.
    pub const fn label(self) -> &'static str {
        match self {
            LockState::Locked => "LOCKED",
            LockState::Unlocked => "OPEN",
            LockState::Changing => "CHANGING",
            LockState::Alarmed => "alert!",
        }
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LockState::Locked => "locked",
            LockState::Unlocked => "unlocked",
            LockState::Changing => "changing",
            LockState::Alarmed => "alarmed",
        })
    }
}

/// LED blink timing for failed attempts and the alarm.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BlinkConfig {
    pub on_ms: u32,
    pub off_ms: u32,
    /// Cycles played after a failed attempt.
    pub feedback_cycles: u8,
}

pub const LOCK_BLINK: BlinkConfig = BlinkConfig {
    on_ms: 250,
    off_ms: 250,
    feedback_cycles: 2,
};

pub struct LockController<'a, P, D, W> {
    panel: P,
    display: D,
    delay: W,
    decoder: &'a QuadratureDecoder,
    servo: Servo<'a>,
    combination: &'a RetainedCombination,
    blink: BlinkConfig,
    state: LockState,
    bad_tries: u8,
    entry: EntryProgress,
    keypad: KeypadTracker,
    staging: ChangeBuffer,
}

impl<'a, P, D, W> LockController<'a, P, D, W>
where
    P: ControlPanel,
    D: CharacterDisplay,
    W: BlockingDelay,
{
    pub fn new(
        panel: P,
        display: D,
        delay: W,
        decoder: &'a QuadratureDecoder,
        servo: Servo<'a>,
        combination: &'a RetainedCombination,
    ) -> Self {
        Self {
            panel,
            display,
            delay,
            decoder,
            servo,
            combination,
            blink: LOCK_BLINK,
            state: LockState::Locked,
            bad_tries: 0,
            entry: EntryProgress::new(),
            keypad: KeypadTracker::new(),
            staging: ChangeBuffer::new(),
        }
    }

    #[must_use]
    pub fn with_blink(mut self, blink: BlinkConfig) -> Self {
        self.blink = blink;
        self
    }

    /// Puts the lock in its power-on state: LOCKED, no bad tries, left LED on,
    /// bolt thrown. A retained combination that fails validation is replaced
    /// by the default.
    pub fn initialize(&mut self) -> LockEvents {
        let mut events = LockEvents::new();
        if self.combination.recover() {
            emit(&mut events, LockEvent::CombinationRecovered);
        }

        self.state = LockState::Locked;
        self.bad_tries = 0;
        self.entry.clear();
        self.keypad.reset();
        self.staging.clear();
        self.show_locked_outputs();

        emit(&mut events, LockEvent::Initialized);
        self.refresh_display();
        events
    }

    /// One main-loop tick.
    pub fn control_lock(&mut self) -> LockEvents {
        let mut events = LockEvents::new();

        if self.state == LockState::Alarmed {
            self.blink_cycle();
        } else {
            let direction = self.decoder.get_direction();
            let key = self.keypad.poll(self.panel.keypad_key());
            match self.state {
                LockState::Locked => self.control_locked(direction, &mut events),
                LockState::Unlocked => self.control_unlocked(&mut events),
                LockState::Changing => self.control_changing(key, &mut events),
                LockState::Alarmed => {}
            }
        }

        self.refresh_display();
        events
    }

    /// Whether the current entry opens the lock.
    pub fn check_combination(&self) -> bool {
        self.entry.matches(&self.combination.get())
    }

    pub fn get_combination(&self) -> Combination {
        self.combination.get()
    }

    /// Restores the factory combination.
    pub fn force_combination_reset(&mut self) {
        self.combination.force_reset();
    }

    /// Runs the servo exercise mode against the current panel inputs.
    pub fn exercise_servo(&mut self) -> ServoPosition {
        self.servo.test_servo(&mut self.panel)
    }

    pub const fn state(&self) -> LockState {
        self.state
    }

    pub const fn bad_tries(&self) -> u8 {
        self.bad_tries
    }

    pub const fn entry(&self) -> &EntryProgress {
        &self.entry
    }

    pub const fn staging(&self) -> &ChangeBuffer {
        &self.staging
    }

    pub const fn servo(&self) -> &Servo<'a> {
        &self.servo
    }

    pub const fn decoder(&self) -> &'a QuadratureDecoder {
        self.decoder
    }

    pub const fn panel(&self) -> &P {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut P {
        &mut self.panel
    }

    pub const fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub const fn delay(&self) -> &W {
        &self.delay
    }

    fn control_locked(&mut self, direction: Direction, events: &mut LockEvents) {
        let combination = self.combination.get();
        match self.entry.apply(direction, &combination) {
            EntryStep::Idle => {}
            EntryStep::Stepped { dial, counted } => {
                emit(events, LockEvent::DialStepped { direction, dial });
                if counted {
                    let stage = self.entry.stage();
                    let count = self.entry.visible_counts()[stage];
                    emit(events, LockEvent::DigitPassed { stage, count });
                }
            }
            EntryStep::Advanced { stage } => emit(events, LockEvent::StageAdvanced { stage }),
            EntryStep::Cleared => emit(events, LockEvent::EntryCleared),
        }

        if self.entry.is_complete() && self.panel.left_button_pressed() {
            self.evaluate_entry(events);
        }
    }

    fn evaluate_entry(&mut self, events: &mut LockEvents) {
        if self.check_combination() {
            self.servo.rotate_full_counterclockwise();
            self.panel.set_left_led(false);
            self.panel.set_right_led(true);
            self.transition(LockState::Unlocked, events);
            return;
        }

        self.bad_tries = self.bad_tries.saturating_add(1);
        emit(
            events,
            LockEvent::BadTry {
                count: self.bad_tries,
            },
        );
        if self.bad_tries >= MAX_BAD_TRIES {
            self.transition(LockState::Alarmed, events);
            return;
        }

        self.entry.clear();
        emit(events, LockEvent::EntryCleared);
        for _ in 0..self.blink.feedback_cycles {
            self.blink_cycle();
        }
        self.show_locked_outputs();
    }

    fn control_unlocked(&mut self, events: &mut LockEvents) {
        let left = self.panel.left_button_pressed();
        let right = self.panel.right_button_pressed();

        if left && right {
            self.entry.clear();
            self.bad_tries = 0;
            self.show_locked_outputs();
            emit(events, LockEvent::EntryCleared);
            self.transition(LockState::Locked, events);
        } else if right && !self.panel.left_switch_in_left() {
            self.staging.clear();
            // a key held across the transition must not become a digit
            self.keypad.disarm();
            self.transition(LockState::Changing, events);
        }
    }

    fn control_changing(&mut self, key: Option<KeyEvent>, events: &mut LockEvents) {
        match key {
            Some(KeyEvent::Down(key)) => emit(events, LockEvent::KeyDown(key)),
            Some(KeyEvent::Up(key)) => {
                emit(events, LockEvent::KeyUp(key));
                if let Keystroke::Filled { slot, value } = self.staging.push_digit(key) {
                    emit(events, LockEvent::SlotFilled { slot, value });
                }
            }
            None => {}
        }

        if self.panel.left_switch_in_left() {
            match self.staging.validate() {
                Ok(combination) => {
                    self.combination.store(combination);
                    emit(events, LockEvent::CombinationChanged(combination));
                }
                Err(error) => emit(events, LockEvent::CombinationRejected(error)),
            }
            self.staging.clear();
            self.transition(LockState::Unlocked, events);
        }
    }

    fn transition(&mut self, to: LockState, events: &mut LockEvents) {
        let from = self.state;
        self.state = to;
        emit(events, LockEvent::StateChanged { from, to });
    }

    fn show_locked_outputs(&mut self) {
        self.panel.set_left_led(true);
        self.panel.set_right_led(false);
        self.servo.rotate_full_clockwise();
    }

    /// Both LEDs on, then off, busy-waiting through each half.
    fn blink_cycle(&mut self) {
        self.panel.set_left_led(true);
        self.panel.set_right_led(true);
        self.delay.delay_ms(self.blink.on_ms);
        self.panel.set_left_led(false);
        self.panel.set_right_led(false);
        self.delay.delay_ms(self.blink.off_ms);
    }

    fn refresh_display(&mut self) {
        let mut line: String<ROW_CAPACITY> = String::new();

        let _ = line.push_str(self.state.label());
        self.display.display_string(STATUS_ROW, &line);

        line.clear();
        let _ = write!(line, "{}", self.entry);
        self.display.display_string(ENTRY_ROW, &line);

        line.clear();
        let _ = write!(line, "bad tries {}", self.bad_tries);
        self.display.display_string(BAD_TRIES_ROW, &line);

        line.clear();
        if self.state == LockState::Changing {
            let _ = line.push_str("new ");
            for value in self.staging.filled() {
                let _ = write!(line, "{value:02}");
            }
            if let Some(tens) = self.staging.pending_tens() {
                let _ = write!(line, "{tens}_");
            }
        }
        let _ = line.push('\n');
        self.display.display_string(STAGING_ROW, &line);
    }
}

fn emit(events: &mut LockEvents, event: LockEvent) {
    let _ = events.push(event);
}
