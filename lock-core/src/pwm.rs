//! Single-channel software PWM synthesized from fixed-size timer ticks.
//!
//! A periodic ISR calls [`SoftPwm::on_tick`] every `tick_increment_us`. Two
//! signed countdowns track the next rising and falling edge; when the rising
//! countdown expires the output goes high and the falling countdown is loaded
//! with the current pulse width. Resolution is therefore one tick, which is
//! plenty for the three servo positions the lock uses.

use portable_atomic::{AtomicI32, Ordering};

use crate::hal::PulseOutput;

/// Tick spacing and frame length of the synthesized signal.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PwmConfig {
    pub tick_increment_us: i32,
    pub signal_period_us: i32,
}

/// 500us ticks inside the 20ms hobby-servo frame.
pub const SERVO_PWM: PwmConfig = PwmConfig {
    tick_increment_us: 500,
    signal_period_us: 20_000,
};

/// Pulse-width state shared between the main loop and the timer ISR.
#[derive(Debug)]
pub struct SoftPwm {
    config: PwmConfig,
    pulse_width_us: AtomicI32,
    next_rising_edge: AtomicI32,
    next_falling_edge: AtomicI32,
}

impl SoftPwm {
    pub const fn new(config: PwmConfig) -> Self {
        Self {
            config,
            pulse_width_us: AtomicI32::new(0),
            next_rising_edge: AtomicI32::new(0),
            next_falling_edge: AtomicI32::new(0),
        }
    }

    pub const fn config(&self) -> PwmConfig {
        self.config
    }

    /// Sets the high time used from the next frame onwards.
    pub fn set_pulse_width_us(&self, width_us: i32) {
        self.pulse_width_us.store(width_us, Ordering::Relaxed);
    }

    pub fn pulse_width_us(&self) -> i32 {
        self.pulse_width_us.load(Ordering::Relaxed)
    }

    /// Periodic ISR body: advances both countdowns and drives the pin.
    pub fn on_tick<P: PulseOutput>(&self, pin: &mut P) {
        let increment = self.config.tick_increment_us;
        let mut rising = self.next_rising_edge.load(Ordering::Relaxed) - increment;
        let mut falling = self.next_falling_edge.load(Ordering::Relaxed) - increment;

        if rising <= 0 {
            pin.set_high();
            rising = self.config.signal_period_us;
            falling = self.pulse_width_us();
        }
        if falling <= 0 {
            pin.set_low();
        }

        self.next_rising_edge.store(rising, Ordering::Relaxed);
        self.next_falling_edge.store(falling, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pin model that integrates how long the output stays high per frame.
    #[derive(Default)]
    struct ScopePin {
        high: bool,
        rising_edges: u32,
    }

    impl PulseOutput for ScopePin {
        fn set_high(&mut self) {
            if !self.high {
                self.rising_edges += 1;
            }
            self.high = true;
        }

        fn set_low(&mut self) {
            self.high = false;
        }
    }

    fn measure_high_ticks(pwm: &SoftPwm, pin: &mut ScopePin, ticks: u32) -> u32 {
        let mut high = 0;
        for _ in 0..ticks {
            pwm.on_tick(pin);
            if pin.high {
                high += 1;
            }
        }
        high
    }

    #[test]
    fn first_tick_starts_a_frame() {
        let pwm = SoftPwm::new(SERVO_PWM);
        pwm.set_pulse_width_us(1_500);
        let mut pin = ScopePin::default();
        pwm.on_tick(&mut pin);
        assert!(pin.high);
        assert_eq!(pin.rising_edges, 1);
    }

    #[test]
    fn frame_repeats_every_signal_period() {
        let pwm = SoftPwm::new(SERVO_PWM);
        pwm.set_pulse_width_us(1_500);
        let mut pin = ScopePin::default();
        // frames start on ticks 1 and 41 of 500us each
        measure_high_ticks(&pwm, &mut pin, 41);
        assert_eq!(pin.rising_edges, 2);
    }

    #[test]
    fn high_time_tracks_pulse_width() {
        for (width, expected_ticks) in [(500, 1), (1_500, 3), (2_500, 5)] {
            let pwm = SoftPwm::new(SERVO_PWM);
            pwm.set_pulse_width_us(width);
            let mut pin = ScopePin::default();
            let high = measure_high_ticks(&pwm, &mut pin, 80);
            assert_eq!(high, 2 * expected_ticks, "pulse width {width}us");
        }
    }

    #[test]
    fn width_change_applies_on_next_frame() {
        let pwm = SoftPwm::new(SERVO_PWM);
        pwm.set_pulse_width_us(2_500);
        let mut pin = ScopePin::default();
        let first = measure_high_ticks(&pwm, &mut pin, 2);
        pwm.set_pulse_width_us(500);
        let rest_of_frame = measure_high_ticks(&pwm, &mut pin, 38);
        let next_frame = measure_high_ticks(&pwm, &mut pin, 40);

        assert_eq!(first + rest_of_frame, 5);
        assert_eq!(next_frame, 1);
    }
}
