//! Hardware timer configuration and interrupt slot bookkeeping.
//!
//! [`TimerBank`] models the two general-purpose timers of an AVR-class part
//! clocked at 16 MHz. Configuring a timer searches every prescaler for the
//! counter value whose period lands closest to the requested one, then picks
//! free-running (normal) mode when the whole counter range is consumed or
//! clear-on-compare (CTC) mode otherwise. The selected mode decides how many
//! interrupt slots can be handed out through [`TimerBank::register_timer_isr`].
//!
//! Platforms that provide arbitrary-period tickers use [`periodic`] instead.

use core::fmt;

use crate::hal::Isr;

pub mod periodic;

pub use periodic::{MAX_PERIODIC_TIMERS, PeriodicTicker, PeriodicTimers};

/// Core clock feeding the prescalers, in cycles per microsecond.
pub const SYSTEM_CLOCK_CYCLES_PER_US: u64 = 16;

/// Widest prescaler table among the modeled timers.
pub const MAX_PRESCALERS: usize = 7;

/// Overflow, compare-A, and compare-B.
pub const MAX_ISR_SLOTS: usize = 3;

/// Hardware timers that may be configured by application code.
///
/// Timer 0 drives the platform's own timekeeping and is never handed out.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimerId {
    Timer1,
    Timer2,
}

impl TimerId {
    /// Maps a raw timer number onto a configurable timer.
    pub const fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::Timer1),
            2 => Some(Self::Timer2),
            _ => None,
        }
    }

    pub const fn number(self) -> u8 {
        match self {
            Self::Timer1 => 1,
            Self::Timer2 => 2,
        }
    }

    const fn as_index(self) -> usize {
        match self {
            Self::Timer1 => 0,
            Self::Timer2 => 1,
        }
    }

    /// Static description of the timer's prescalers and mode bits.
    pub const fn spec(self) -> &'static TimerSpec {
        match self {
            Self::Timer1 => &TIMER1_SPEC,
            Self::Timer2 => &TIMER2_SPEC,
        }
    }
}

/// Interrupt vectors raised by a timer, in interrupt-enable bit order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimerVector {
    Overflow = 0,
    CompareA = 1,
    CompareB = 2,
}

impl TimerVector {
    const fn as_index(self) -> usize {
        self as usize
    }
}

/// Register-level description of one hardware timer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TimerSpec {
    /// Available prescalers; `0` marks an unused entry.
    pub prescalers: [u16; MAX_PRESCALERS],
    /// Number of distinct counter values (`1 << width`).
    pub counter_values: u32,
    pub normal_mode_bits: [u8; 2],
    pub ctc_mode_bits: [u8; 2],
    /// Clock-select bits for control registers A and B, indexed by prescaler.
    pub clock_select_bits: [[u8; MAX_PRESCALERS]; 2],
}

/// 16-bit TIMER1.
pub const TIMER1_SPEC: TimerSpec = TimerSpec {
    prescalers: [1, 8, 64, 256, 1024, 0, 0],
    counter_values: 1 << 16,
    normal_mode_bits: [0, 0],
    ctc_mode_bits: [0, 1 << 3],
    clock_select_bits: [[0; MAX_PRESCALERS], [1, 2, 3, 4, 5, 0, 0]],
};

/// 8-bit TIMER2 with the finer prescaler ladder.
pub const TIMER2_SPEC: TimerSpec = TimerSpec {
    prescalers: [1, 8, 32, 64, 128, 256, 1024],
    counter_values: 1 << 8,
    normal_mode_bits: [0, 0],
    ctc_mode_bits: [1 << 1, 0],
    clock_select_bits: [[0; MAX_PRESCALERS], [1, 2, 3, 4, 5, 6, 7]],
};

/// Counting mode selected for a configured timer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimerMode {
    /// Free-running overflow; overflow, compare-A, and compare-B slots.
    Normal,
    /// Clear on compare-A match; compare-A and compare-B slots.
    Ctc,
}

impl TimerMode {
    pub const fn isr_slots(self) -> u8 {
        match self {
            Self::Normal => 3,
            Self::Ctc => 2,
        }
    }
}

/// Winning prescaler/count pair for a requested period.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PrescalerFit {
    pub prescaler_index: usize,
    pub prescaler: u16,
    /// Number of counter ticks per period (`1..=counter_values`).
    pub count: u32,
    /// Absolute error against the request, in system clock cycles.
    pub error_cycles: u64,
}

impl PrescalerFit {
    /// Achieved period in microseconds.
    #[allow(clippy::cast_precision_loss)]
    pub fn period_us(&self) -> f32 {
        let cycles = u64::from(self.count) * u64::from(self.prescaler);
        cycles as f32 / SYSTEM_CLOCK_CYCLES_PER_US as f32
    }
}

/// Converts a requested period to whole system clock cycles.
///
/// Returns `None` below one microsecond (NaN included). Fractional requests
/// round to the nearest cycle; oversized ones saturate and fail the fit later.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn period_cycles(desired_period_us: f32) -> Option<u64> {
    if desired_period_us.is_nan() || desired_period_us < 1.0 {
        return None;
    }
    Some((desired_period_us * SYSTEM_CLOCK_CYCLES_PER_US as f32 + 0.5) as u64)
}

/// Searches every prescaler for the counter value closest to `desired_period_us`.
pub fn best_fit(spec: &TimerSpec, desired_period_us: f32) -> Option<PrescalerFit> {
    period_cycles(desired_period_us).and_then(|cycles| best_fit_cycles(spec, cycles))
}

/// Searches every prescaler for the counter value closest to `desired_cycles`.
///
/// Both the ceiling and the floor of the exact count are considered; counts of
/// zero or above the counter range are discarded. Only a strictly smaller
/// error replaces the current best, so ties keep the smaller prescaler.
pub fn best_fit_cycles(spec: &TimerSpec, desired_cycles: u64) -> Option<PrescalerFit> {
    let mut best: Option<PrescalerFit> = None;

    for (prescaler_index, &prescaler) in spec.prescalers.iter().enumerate() {
        if prescaler == 0 {
            continue;
        }
        let divisor = u64::from(prescaler);
        let above = desired_cycles.div_ceil(divisor);
        let below = desired_cycles / divisor;

        for count in [above, below] {
            if count == 0 || count > u64::from(spec.counter_values) {
                continue;
            }
            let error_cycles = (count * divisor).abs_diff(desired_cycles);
            let improves = best.is_none_or(|current| error_cycles < current.error_cycles);
            if improves && let Ok(count) = u32::try_from(count) {
                best = Some(PrescalerFit {
                    prescaler_index,
                    prescaler,
                    count,
                    error_cycles,
                });
            }
        }
    }

    best
}

/// Complete register image produced by [`TimerBank::configure_timer`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TimerConfiguration {
    pub fit: PrescalerFit,
    pub mode: TimerMode,
    pub control: [u8; 2],
    /// Highest counter value reached before the period restarts.
    pub top: u32,
    pub compare_a: u32,
    pub compare_b: u32,
    pub actual_period_us: f32,
}

impl TimerConfiguration {
    fn from_fit(spec: &TimerSpec, fit: PrescalerFit) -> Self {
        let top = fit.count - 1;
        let (mode, mode_bits, compare_a) = if top == spec.counter_values - 1 {
            (TimerMode::Normal, spec.normal_mode_bits, 2 * top / 3)
        } else {
            (TimerMode::Ctc, spec.ctc_mode_bits, top)
        };
        let control = [
            mode_bits[0] | spec.clock_select_bits[0][fit.prescaler_index],
            mode_bits[1] | spec.clock_select_bits[1][fit.prescaler_index],
        ];

        Self {
            fit,
            mode,
            control,
            top,
            compare_a,
            compare_b: compare_a / 2,
            actual_period_us: fit.period_us(),
        }
    }
}

/// Reasons a timer could not be configured.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TimerError {
    /// The timer number does not name a configurable timer.
    InvalidTimer(u8),
    /// Requested period is below one microsecond, or not a number.
    PeriodTooShort,
    /// No prescaler/count pair fits in the counter.
    Unachievable { desired_period_us: f32 },
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerError::InvalidTimer(number) => write!(f, "timer {number} is not configurable"),
            TimerError::PeriodTooShort => f.write_str("period must be at least 1us"),
            TimerError::Unachievable { desired_period_us } => {
                write!(f, "no prescaler reaches {desired_period_us}us")
            }
        }
    }
}

/// Abstraction over the memory-mapped timer registers.
pub trait TimerRegisters {
    /// Writes both control registers (mode and clock-select bits).
    fn write_control(&mut self, timer: TimerId, control: [u8; 2]);

    /// Writes the running counter.
    fn write_counter(&mut self, timer: TimerId, value: u32);

    /// Writes the compare-A and compare-B registers.
    fn write_compare(&mut self, timer: TimerId, compare_a: u32, compare_b: u32);

    /// Writes the interrupt-enable mask.
    fn write_interrupt_mask(&mut self, timer: TimerId, mask: u8);
}

/// Per-timer record of the active configuration and its ISR slots.
#[derive(Copy, Clone, Debug)]
struct TimerSlots {
    configuration: Option<TimerConfiguration>,
    isr_slots: u8,
    interrupt_mask: u8,
    isrs: [Option<Isr>; MAX_ISR_SLOTS],
}

impl TimerSlots {
    const fn new() -> Self {
        Self {
            configuration: None,
            isr_slots: 0,
            interrupt_mask: 0,
            isrs: [None; MAX_ISR_SLOTS],
        }
    }
}

/// Owns the timer registers plus the fixed-capacity ISR registry.
pub struct TimerBank<R> {
    registers: R,
    timers: [TimerSlots; 2],
}

impl<R: TimerRegisters> TimerBank<R> {
    pub const fn new(registers: R) -> Self {
        Self {
            registers,
            timers: [TimerSlots::new(), TimerSlots::new()],
        }
    }

    /// Configures a timer to interrupt as close to `desired_period_us` as the
    /// hardware allows and returns the achieved period.
    ///
    /// Every ISR slot of the timer is cleared and all of its interrupts are
    /// disabled; callers re-register afterwards. On error nothing is changed.
    pub fn configure_timer(
        &mut self,
        timer_number: u8,
        desired_period_us: f32,
    ) -> Result<f32, TimerError> {
        let timer =
            TimerId::from_number(timer_number).ok_or(TimerError::InvalidTimer(timer_number))?;
        let desired_cycles = period_cycles(desired_period_us).ok_or(TimerError::PeriodTooShort)?;

        let spec = timer.spec();
        let fit = best_fit_cycles(spec, desired_cycles)
            .ok_or(TimerError::Unachievable { desired_period_us })?;
        let configuration = TimerConfiguration::from_fit(spec, fit);

        let slots = &mut self.timers[timer.as_index()];
        slots.isrs = [None; MAX_ISR_SLOTS];
        slots.isr_slots = configuration.mode.isr_slots();
        slots.interrupt_mask = 0;
        slots.configuration = Some(configuration);

        self.registers.write_control(timer, configuration.control);
        self.registers.write_counter(timer, 0);
        self.registers
            .write_compare(timer, configuration.compare_a, configuration.compare_b);
        self.registers.write_interrupt_mask(timer, 0);

        Ok(configuration.actual_period_us)
    }

    /// Installs `isr` in a slot of a configured timer and enables its interrupt.
    ///
    /// Slots are numbered from zero over the vectors the active mode exposes:
    /// overflow, compare-A, compare-B in normal mode; compare-A, compare-B in
    /// CTC mode. Returns `false` for an unknown timer or an out-of-range slot.
    pub fn register_timer_isr(&mut self, timer_number: u8, slot: u8, isr: Isr) -> bool {
        let Some(timer) = TimerId::from_number(timer_number) else {
            return false;
        };
        let slots = &mut self.timers[timer.as_index()];
        if slot >= slots.isr_slots {
            return false;
        }

        let vector = if slots.isr_slots == 2 { slot + 1 } else { slot };
        slots.isrs[usize::from(vector)] = Some(isr);
        slots.interrupt_mask |= 1 << vector;
        let mask = slots.interrupt_mask;
        self.registers.write_interrupt_mask(timer, mask);
        true
    }

    /// Zeroes the running counter without touching the configuration.
    pub fn reset_timer(&mut self, timer_number: u8) {
        if let Some(timer) = TimerId::from_number(timer_number) {
            self.registers.write_counter(timer, 0);
        }
    }

    /// Entry point for the hardware vector: runs the ISR registered for it.
    pub fn dispatch(&self, timer: TimerId, vector: TimerVector) {
        if let Some(isr) = self.timers[timer.as_index()].isrs[vector.as_index()] {
            isr();
        }
    }

    /// Active configuration of `timer`, if it has been configured.
    pub fn configuration(&self, timer: TimerId) -> Option<&TimerConfiguration> {
        self.timers[timer.as_index()].configuration.as_ref()
    }

    /// Number of ISR slots the timer's active mode exposes.
    pub fn isr_slots(&self, timer: TimerId) -> u8 {
        self.timers[timer.as_index()].isr_slots
    }

    pub fn registers(&self) -> &R {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut R {
        &mut self.registers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portable_atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct RecordingRegisters {
        control: [[u8; 2]; 2],
        counter: [u32; 2],
        compare: [(u32, u32); 2],
        mask: [u8; 2],
        counter_writes: u32,
    }

    impl TimerRegisters for RecordingRegisters {
        fn write_control(&mut self, timer: TimerId, control: [u8; 2]) {
            self.control[timer.as_index()] = control;
        }

        fn write_counter(&mut self, timer: TimerId, value: u32) {
            self.counter[timer.as_index()] = value;
            self.counter_writes += 1;
        }

        fn write_compare(&mut self, timer: TimerId, compare_a: u32, compare_b: u32) {
            self.compare[timer.as_index()] = (compare_a, compare_b);
        }

        fn write_interrupt_mask(&mut self, timer: TimerId, mask: u8) {
            self.mask[timer.as_index()] = mask;
        }
    }

    static COMPARE_A_HITS: AtomicU32 = AtomicU32::new(0);

    fn count_compare_a() {
        COMPARE_A_HITS.fetch_add(1, Ordering::Relaxed);
    }

    fn noop() {}

    #[test]
    fn rejects_reserved_and_unknown_timers() {
        let mut bank = TimerBank::new(RecordingRegisters::default());
        assert_eq!(
            bank.configure_timer(0, 1_000.0),
            Err(TimerError::InvalidTimer(0))
        );
        assert_eq!(
            bank.configure_timer(3, 1_000.0),
            Err(TimerError::InvalidTimer(3))
        );
        assert!(!bank.register_timer_isr(0, 0, noop));
    }

    #[test]
    fn rejects_sub_microsecond_and_unreachable_periods() {
        let mut bank = TimerBank::new(RecordingRegisters::default());
        assert_eq!(bank.configure_timer(1, 0.0), Err(TimerError::PeriodTooShort));
        // 8-bit counter at /1024 tops out at 16384us
        assert_eq!(
            bank.configure_timer(2, 20_000.0),
            Err(TimerError::Unachievable {
                desired_period_us: 20_000.0
            })
        );
        assert!(bank.configuration(TimerId::Timer2).is_none());
    }

    #[test]
    fn fractional_periods_are_fitted_in_whole_cycles() {
        let mut bank = TimerBank::new(RecordingRegisters::default());
        // 62.5us is exactly 1000 cycles at /1
        let period = bank.configure_timer(1, 62.5).expect("fits TIMER1");
        assert_eq!(period, 62.5);
        let configuration = *bank.configuration(TimerId::Timer1).expect("configured");
        assert_eq!(configuration.fit.prescaler, 1);
        assert_eq!(configuration.fit.count, 1_000);
        assert_eq!(configuration.fit.error_cycles, 0);
        assert_eq!(configuration.mode, TimerMode::Ctc);

        assert_eq!(bank.configure_timer(1, 0.5), Err(TimerError::PeriodTooShort));
        assert_eq!(
            bank.configure_timer(1, f32::NAN),
            Err(TimerError::PeriodTooShort)
        );
        assert_eq!(period_cycles(1.25), Some(20));
    }

    #[test]
    fn exact_period_selects_ctc_mode() {
        let mut bank = TimerBank::new(RecordingRegisters::default());
        let period = bank.configure_timer(2, 1_000.0).expect("1ms fits TIMER2");
        assert_eq!(period, 1_000.0);

        let configuration = *bank.configuration(TimerId::Timer2).expect("configured");
        assert_eq!(configuration.fit.prescaler, 64);
        assert_eq!(configuration.fit.count, 250);
        assert_eq!(configuration.mode, TimerMode::Ctc);
        assert_eq!(configuration.top, 249);
        assert_eq!(configuration.compare_a, 249);
        assert_eq!(configuration.compare_b, 124);
        assert_eq!(bank.isr_slots(TimerId::Timer2), 2);

        let registers = bank.registers();
        assert_eq!(registers.control[1], [1 << 1, 4]);
        assert_eq!(registers.compare[1], (249, 124));
        assert_eq!(registers.counter[1], 0);
        assert_eq!(registers.mask[1], 0);
    }

    #[test]
    fn full_counter_range_selects_normal_mode() {
        let mut bank = TimerBank::new(RecordingRegisters::default());
        // 4096us on TIMER1 at /1 needs 65536 ticks: exactly the whole counter
        let period = bank.configure_timer(1, 4_096.0).expect("fits TIMER1");
        assert_eq!(period, 4_096.0);

        let configuration = *bank.configuration(TimerId::Timer1).expect("configured");
        assert_eq!(configuration.fit.prescaler, 1);
        assert_eq!(configuration.mode, TimerMode::Normal);
        assert_eq!(configuration.top, 65_535);
        assert_eq!(configuration.compare_a, 43_690);
        assert_eq!(configuration.compare_b, 21_845);
        assert_eq!(bank.isr_slots(TimerId::Timer1), 3);
        assert_eq!(bank.registers().control[0], [0, 1]);
    }

    #[test]
    fn slot_numbering_follows_mode() {
        let mut bank = TimerBank::new(RecordingRegisters::default());
        bank.configure_timer(2, 1_000.0).expect("ctc");
        assert!(bank.register_timer_isr(2, 0, noop));
        assert_eq!(bank.registers().mask[1], 1 << 1);
        assert!(bank.register_timer_isr(2, 1, noop));
        assert_eq!(bank.registers().mask[1], (1 << 1) | (1 << 2));
        assert!(!bank.register_timer_isr(2, 2, noop));

        bank.configure_timer(1, 4_096.0).expect("normal");
        assert!(bank.register_timer_isr(1, 0, noop));
        assert!(bank.register_timer_isr(1, 2, noop));
        assert_eq!(bank.registers().mask[0], (1 << 0) | (1 << 2));
        assert!(!bank.register_timer_isr(1, 3, noop));
    }

    #[test]
    fn unconfigured_timer_has_no_slots() {
        let mut bank = TimerBank::new(RecordingRegisters::default());
        assert!(!bank.register_timer_isr(1, 0, noop));
    }

    #[test]
    fn dispatch_runs_registered_isr_and_reconfigure_clears_it() {
        let mut bank = TimerBank::new(RecordingRegisters::default());
        bank.configure_timer(2, 500.0).expect("ctc");
        assert!(bank.register_timer_isr(2, 0, count_compare_a));

        let before = COMPARE_A_HITS.load(Ordering::Relaxed);
        bank.dispatch(TimerId::Timer2, TimerVector::CompareA);
        bank.dispatch(TimerId::Timer2, TimerVector::CompareB);
        bank.dispatch(TimerId::Timer2, TimerVector::Overflow);
        assert_eq!(COMPARE_A_HITS.load(Ordering::Relaxed), before + 1);

        bank.configure_timer(2, 500.0).expect("ctc");
        bank.dispatch(TimerId::Timer2, TimerVector::CompareA);
        assert_eq!(COMPARE_A_HITS.load(Ordering::Relaxed), before + 1);
    }

    #[test]
    fn reset_timer_only_touches_counter() {
        let mut bank = TimerBank::new(RecordingRegisters::default());
        bank.configure_timer(1, 1_000.0).expect("ctc");
        let control = bank.registers().control[0];
        bank.registers_mut().counter[0] = 1_234;

        bank.reset_timer(1);
        assert_eq!(bank.registers().counter[0], 0);
        assert_eq!(bank.registers().control[0], control);

        let writes = bank.registers().counter_writes;
        bank.reset_timer(7);
        assert_eq!(bank.registers().counter_writes, writes);
    }
}
