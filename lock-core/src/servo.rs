//! Servo actuator that throws the physical bolt.
//!
//! Positions are fixed pulse widths written straight into the shared
//! [`SoftPwm`]; the timer ISR picks the new width up at the next frame.

use core::fmt;

use crate::hal::{ControlPanel, Isr};
use crate::pwm::SoftPwm;
use crate::timer::{PeriodicTicker, PeriodicTimers};

/// The three positions the lock drives the servo to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ServoPosition {
    /// Bolt thrown; used while LOCKED.
    FullClockwise,
    Center,
    /// Bolt withdrawn; used while UNLOCKED.
    FullCounterclockwise,
}

impl ServoPosition {
    pub const fn pulse_width_us(self) -> i32 {
        match self {
            Self::FullClockwise => 500,
            Self::Center => 1_500,
            Self::FullCounterclockwise => 2_500,
        }
    }

    /// Maps a pulse width back onto a named position.
    pub const fn from_pulse_width_us(width_us: i32) -> Option<Self> {
        match width_us {
            500 => Some(Self::FullClockwise),
            1_500 => Some(Self::Center),
            2_500 => Some(Self::FullCounterclockwise),
            _ => None,
        }
    }
}

impl fmt::Display for ServoPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FullClockwise => "full-cw",
            Self::Center => "center",
            Self::FullCounterclockwise => "full-ccw",
        })
    }
}

/// Command surface over the PWM pulse width.
#[derive(Copy, Clone, Debug)]
pub struct Servo<'a> {
    pwm: &'a SoftPwm,
}

impl<'a> Servo<'a> {
    pub const fn new(pwm: &'a SoftPwm) -> Self {
        Self { pwm }
    }

    /// Centers the servo and hooks `tick_isr` onto a periodic timer at the
    /// PWM tick rate. `tick_isr` is expected to call [`SoftPwm::on_tick`].
    pub fn initialize<T: PeriodicTicker, const N: usize>(
        &self,
        timers: &mut PeriodicTimers<T, N>,
        timer_number: usize,
        tick_isr: Isr,
    ) -> bool {
        self.center();
        let increment = self.pwm.config().tick_increment_us.unsigned_abs();
        timers.register_periodic_timer_isr(timer_number, increment, tick_isr)
    }

    pub fn center(&self) {
        self.move_to(ServoPosition::Center);
    }

    pub fn rotate_full_clockwise(&self) {
        self.move_to(ServoPosition::FullClockwise);
    }

    pub fn rotate_full_counterclockwise(&self) {
        self.move_to(ServoPosition::FullCounterclockwise);
    }

    pub fn move_to(&self, position: ServoPosition) {
        self.pwm.set_pulse_width_us(position.pulse_width_us());
    }

    /// Position currently commanded, if the width matches a named one.
    pub fn position(&self) -> Option<ServoPosition> {
        ServoPosition::from_pulse_width_us(self.pwm.pulse_width_us())
    }

    /// Manual exercise mode: left button centers, otherwise the left switch
    /// picks full clockwise (left) or full counterclockwise (right).
    pub fn test_servo<P: ControlPanel>(&self, panel: &mut P) -> ServoPosition {
        let position = if panel.left_button_pressed() {
            ServoPosition::Center
        } else if panel.left_switch_in_left() {
            ServoPosition::FullClockwise
        } else {
            ServoPosition::FullCounterclockwise
        };
        self.move_to(position);
        position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pwm::SERVO_PWM;
    use core::time::Duration;

    #[test]
    fn named_positions_set_expected_widths() {
        let pwm = SoftPwm::new(SERVO_PWM);
        let servo = Servo::new(&pwm);

        servo.rotate_full_clockwise();
        assert_eq!(pwm.pulse_width_us(), 500);
        servo.center();
        assert_eq!(pwm.pulse_width_us(), 1_500);
        servo.rotate_full_counterclockwise();
        assert_eq!(pwm.pulse_width_us(), 2_500);
        assert_eq!(servo.position(), Some(ServoPosition::FullCounterclockwise));
    }

    struct Ticker {
        period: Option<Duration>,
    }

    impl PeriodicTicker for Ticker {
        fn attach(&mut self, _: Isr, period: Duration) {
            self.period = Some(period);
        }

        fn detach(&mut self) {
            self.period = None;
        }
    }

    fn tick() {}

    #[test]
    fn initialize_centers_and_registers_tick() {
        let pwm = SoftPwm::new(SERVO_PWM);
        let servo = Servo::new(&pwm);
        let mut timers = PeriodicTimers::new([Ticker { period: None }]);

        assert!(servo.initialize(&mut timers, 0, tick));
        assert_eq!(servo.position(), Some(ServoPosition::Center));
        assert_eq!(
            timers.ticker(0).and_then(|ticker| ticker.period),
            Some(Duration::from_micros(500))
        );
    }

    struct Panel {
        left_button: bool,
        left_switch_left: bool,
    }

    impl ControlPanel for Panel {
        fn left_button_pressed(&mut self) -> bool {
            self.left_button
        }
        fn right_button_pressed(&mut self) -> bool {
            false
        }
        fn left_switch_in_left(&mut self) -> bool {
            self.left_switch_left
        }
        fn right_switch_in_left(&mut self) -> bool {
            true
        }
        fn keypad_key(&mut self) -> Option<u8> {
            None
        }
        fn set_left_led(&mut self, _: bool) {}
        fn set_right_led(&mut self, _: bool) {}
    }

    #[test]
    fn test_servo_follows_panel() {
        let pwm = SoftPwm::new(SERVO_PWM);
        let servo = Servo::new(&pwm);
        let mut panel = Panel {
            left_button: true,
            left_switch_left: false,
        };
        assert_eq!(servo.test_servo(&mut panel), ServoPosition::Center);

        panel.left_button = false;
        assert_eq!(
            servo.test_servo(&mut panel),
            ServoPosition::FullCounterclockwise
        );

        panel.left_switch_left = true;
        assert_eq!(servo.test_servo(&mut panel), ServoPosition::FullClockwise);
        assert_eq!(pwm.pulse_width_us(), 500);
    }
}
