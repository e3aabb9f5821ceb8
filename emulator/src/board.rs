//! Host stand-ins for the lock's peripherals.
//!
//! The shared state the ISRs touch lives in statics, the same way it does on
//! the microcontroller; everything else is a plain struct the session owns.

use std::time::Duration;

use lock_core::encoder::{CLOCKWISE_STEP, COUNTERCLOCKWISE_STEP, Direction, QuadratureDecoder};
use lock_core::hal::{BlockingDelay, ControlPanel, Isr, PulseOutput};
use lock_core::lock::RetainedCombination;
use lock_core::pwm::{SERVO_PWM, SoftPwm};
use lock_core::timer::{PeriodicTicker, TimerId, TimerRegisters};
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

pub static DECODER: QuadratureDecoder = QuadratureDecoder::new();
pub static SERVO_PWM_STATE: SoftPwm = SoftPwm::new(SERVO_PWM);
pub static COMBINATION: RetainedCombination = RetainedCombination::new();

static SERVO_LINE_HIGH: AtomicBool = AtomicBool::new(false);
static SERVO_HIGH_TICKS: AtomicU32 = AtomicU32::new(0);
static TIMER_INTERRUPTS: AtomicU32 = AtomicU32::new(0);

/// Servo signal line; counts the ticks it spends high.
pub struct ServoLine;

impl PulseOutput for ServoLine {
    fn set_high(&mut self) {
        SERVO_LINE_HIGH.store(true, Ordering::Relaxed);
    }

    fn set_low(&mut self) {
        SERVO_LINE_HIGH.store(false, Ordering::Relaxed);
    }
}

/// Periodic ISR that synthesizes the servo signal.
pub fn servo_tick() {
    SERVO_PWM_STATE.on_tick(&mut ServoLine);
    if SERVO_LINE_HIGH.load(Ordering::Relaxed) {
        SERVO_HIGH_TICKS.fetch_add(1, Ordering::Relaxed);
    }
}

/// ISR installed on a hardware timer by the `timer` command.
pub fn count_timer_interrupt() {
    TIMER_INTERRUPTS.fetch_add(1, Ordering::Relaxed);
}

pub fn timer_interrupts() -> u32 {
    TIMER_INTERRUPTS.load(Ordering::Relaxed)
}

/// Feeds one detent worth of wiper codes into the decoder.
pub fn turn_detent(direction: Direction) {
    let codes = match direction {
        Direction::Clockwise => CLOCKWISE_STEP,
        Direction::Counterclockwise => COUNTERCLOCKWISE_STEP,
        Direction::Stationary => return,
    };
    for code in codes {
        DECODER.process_code(code);
    }
}

/// Front panel whose inputs are set by console commands.
#[derive(Debug, Default)]
pub struct SimulatedPanel {
    pub left_button: bool,
    pub right_button: bool,
    pub left_switch_left: bool,
    pub right_switch_left: bool,
    pub key: Option<u8>,
    pub left_led: bool,
    pub right_led: bool,
}

impl SimulatedPanel {
    pub fn release_all(&mut self) {
        self.left_button = false;
        self.right_button = false;
        self.key = None;
    }
}

impl ControlPanel for SimulatedPanel {
    fn left_button_pressed(&mut self) -> bool {
        self.left_button
    }

    fn right_button_pressed(&mut self) -> bool {
        self.right_button
    }

    fn left_switch_in_left(&mut self) -> bool {
        self.left_switch_left
    }

    fn right_switch_in_left(&mut self) -> bool {
        self.right_switch_left
    }

    fn keypad_key(&mut self) -> Option<u8> {
        self.key
    }

    fn set_left_led(&mut self, on: bool) {
        self.left_led = on;
    }

    fn set_right_led(&mut self, on: bool) {
        self.right_led = on;
    }
}

/// Delay that advances a virtual clock instead of sleeping.
#[derive(Debug, Default)]
pub struct VirtualDelay {
    elapsed: Duration,
}

impl VirtualDelay {
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

impl BlockingDelay for VirtualDelay {
    fn delay_ms(&mut self, millis: u32) {
        self.elapsed += Duration::from_millis(u64::from(millis));
    }
}

/// Periodic ticker driven by the session rather than by wall time.
#[derive(Debug, Default)]
pub struct VirtualTicker {
    attached: Option<(Isr, Duration)>,
}

impl VirtualTicker {
    /// Fires the attached ISR as often as it would run during `window`.
    pub fn run_for(&self, window: Duration) {
        let Some((isr, period)) = self.attached else {
            return;
        };
        if period.is_zero() {
            return;
        }
        let fires = window.as_micros() / period.as_micros();
        for _ in 0..fires {
            isr();
        }
    }
}

impl PeriodicTicker for VirtualTicker {
    fn attach(&mut self, isr: Isr, period: Duration) {
        self.attached = Some((isr, period));
    }

    fn detach(&mut self) {
        self.attached = None;
    }
}

/// Measures the servo high time over one PWM frame.
pub fn measure_servo_frame(ticker: &VirtualTicker) -> u32 {
    let config = SERVO_PWM_STATE.config();
    SERVO_HIGH_TICKS.store(0, Ordering::Relaxed);
    ticker.run_for(Duration::from_micros(
        u64::from(config.signal_period_us.unsigned_abs()),
    ));
    SERVO_HIGH_TICKS.load(Ordering::Relaxed) * config.tick_increment_us.unsigned_abs()
}

/// Last values written to each timer's registers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegisterImage {
    pub control: [u8; 2],
    pub counter: u32,
    pub compare_a: u32,
    pub compare_b: u32,
    pub interrupt_mask: u8,
}

#[derive(Debug, Default)]
pub struct SimulatedTimers {
    images: [RegisterImage; 2],
}

impl SimulatedTimers {
    pub fn image(&self, timer: TimerId) -> &RegisterImage {
        &self.images[usize::from(timer.number() - 1)]
    }

    fn image_mut(&mut self, timer: TimerId) -> &mut RegisterImage {
        &mut self.images[usize::from(timer.number() - 1)]
    }
}

impl TimerRegisters for SimulatedTimers {
    fn write_control(&mut self, timer: TimerId, control: [u8; 2]) {
        self.image_mut(timer).control = control;
    }

    fn write_counter(&mut self, timer: TimerId, value: u32) {
        self.image_mut(timer).counter = value;
    }

    fn write_compare(&mut self, timer: TimerId, compare_a: u32, compare_b: u32) {
        let image = self.image_mut(timer);
        image.compare_a = compare_a;
        image.compare_b = compare_b;
    }

    fn write_interrupt_mask(&mut self, timer: TimerId, mask: u8) {
        self.image_mut(timer).interrupt_mask = mask;
    }
}
