//! Capability traits that stand between the lock logic and the board.
//!
//! Firmware implements these over Embassy GPIO and timers; the emulator and
//! the tests implement them over plain structs. Nothing in this module knows
//! about a particular MCU.

/// Interrupt service routine signature stored by the timer registries.
pub type Isr = fn();

/// Pin-level access to the two encoder wipers.
pub trait WiperInputs {
    /// Returns the 2-bit quadrature code: wiper A in bit 1, wiper B in bit 0.
    fn read_wipers(&mut self) -> u8;
}

/// Single actuator output driven by the software PWM.
pub trait PulseOutput {
    fn set_high(&mut self);
    fn set_low(&mut self);
}

/// Buttons, slide switches, keypad, and indicator LEDs on the front panel.
pub trait ControlPanel {
    fn left_button_pressed(&mut self) -> bool;
    fn right_button_pressed(&mut self) -> bool;

    /// `true` when the left slide switch sits in its left position.
    fn left_switch_in_left(&mut self) -> bool;

    /// `true` when the right slide switch sits in its left position.
    fn right_switch_in_left(&mut self) -> bool;

    /// Returns the key currently held on the keypad, if any (values 0-15).
    fn keypad_key(&mut self) -> Option<u8>;

    fn set_left_led(&mut self, on: bool);
    fn set_right_led(&mut self, on: bool);
}

/// Row-oriented character display.
///
/// Text ending in `\n` refreshes the panel immediately; text without the
/// trailing newline is buffered until the next refresh.
pub trait CharacterDisplay {
    fn display_string(&mut self, row: u8, text: &str);
}

/// Blocking delay used by the feedback and alarm blink paths.
pub trait BlockingDelay {
    fn delay_ms(&mut self, millis: u32);
}

/// Free-running microsecond counter.
pub trait MicrosCounter {
    fn now_micros(&mut self) -> u32;
}

/// [`BlockingDelay`] that spins against a [`MicrosCounter`].
#[derive(Debug)]
pub struct SpinDelay<C> {
    counter: C,
}

impl<C: MicrosCounter> SpinDelay<C> {
    pub const fn new(counter: C) -> Self {
        Self { counter }
    }

    /// Returns the wrapped counter.
    pub fn into_inner(self) -> C {
        self.counter
    }
}

impl<C: MicrosCounter> BlockingDelay for SpinDelay<C> {
    fn delay_ms(&mut self, millis: u32) {
        let budget = millis.saturating_mul(1_000);
        let start = self.counter.now_micros();
        // wrapping_sub keeps the comparison valid across counter rollover
        while self.counter.now_micros().wrapping_sub(start) < budget {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SteppingCounter {
        now: u32,
        step: u32,
        reads: u32,
    }

    impl MicrosCounter for SteppingCounter {
        fn now_micros(&mut self) -> u32 {
            self.reads += 1;
            let current = self.now;
            self.now = self.now.wrapping_add(self.step);
            current
        }
    }

    #[test]
    fn spin_delay_waits_for_full_budget() {
        let mut delay = SpinDelay::new(SteppingCounter {
            now: 0,
            step: 100,
            reads: 0,
        });
        delay.delay_ms(1);
        let counter = delay.into_inner();
        // one read for the start plus ten polls to cover 1000us in 100us steps
        assert_eq!(counter.reads, 11);
    }

    #[test]
    fn spin_delay_survives_counter_rollover() {
        let mut delay = SpinDelay::new(SteppingCounter {
            now: u32::MAX - 150,
            step: 250,
            reads: 0,
        });
        delay.delay_ms(1);
        let counter = delay.into_inner();
        assert_eq!(counter.reads, 5);
    }
}
