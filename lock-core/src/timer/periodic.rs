//! Periodic ISR scheduling for platforms with arbitrary-period tickers.
//!
//! Instead of searching prescalers, each slot owns a [`PeriodicTicker`] that
//! is attached directly to a microsecond period. Resetting a slot detaches and
//! re-attaches the ticker with its stored period and callback, which restarts
//! its phase.

use core::time::Duration;

use crate::hal::Isr;

/// Number of periodic timers a board exposes.
pub const MAX_PERIODIC_TIMERS: usize = 8;

/// Platform ticker that calls an ISR at a fixed period.
pub trait PeriodicTicker {
    /// Starts (or restarts) calling `isr` every `period`.
    fn attach(&mut self, isr: Isr, period: Duration);

    /// Stops calling the attached ISR.
    fn detach(&mut self);
}

#[derive(Debug)]
struct PeriodicSlot<T> {
    ticker: T,
    period: Duration,
    isr: Option<Isr>,
}

/// Fixed set of periodic tickers addressed by timer number.
#[derive(Debug)]
pub struct PeriodicTimers<T, const N: usize = MAX_PERIODIC_TIMERS> {
    slots: [PeriodicSlot<T>; N],
}

impl<T: PeriodicTicker, const N: usize> PeriodicTimers<T, N> {
    /// Wraps one ticker per timer number.
    pub fn new(tickers: [T; N]) -> Self {
        Self {
            slots: tickers.map(|ticker| PeriodicSlot {
                ticker,
                period: Duration::ZERO,
                isr: None,
            }),
        }
    }

    /// Attaches `isr` to the timer so it runs every `period_us` microseconds.
    ///
    /// Re-registering an attached timer replaces both period and callback.
    /// Returns `false` when `timer_number` is out of range.
    pub fn register_periodic_timer_isr(
        &mut self,
        timer_number: usize,
        period_us: u32,
        isr: Isr,
    ) -> bool {
        let Some(slot) = self.slots.get_mut(timer_number) else {
            return false;
        };
        slot.period = Duration::from_micros(u64::from(period_us));
        slot.isr = Some(isr);
        slot.ticker.attach(isr, slot.period);
        true
    }

    /// Detaches and re-attaches the timer with its stored period and ISR.
    pub fn reset_periodic_timer(&mut self, timer_number: usize) {
        let Some(slot) = self.slots.get_mut(timer_number) else {
            return;
        };
        let Some(isr) = slot.isr else {
            return;
        };
        slot.ticker.detach();
        slot.ticker.attach(isr, slot.period);
    }

    /// Stored period of an attached timer.
    pub fn period(&self, timer_number: usize) -> Option<Duration> {
        self.slots
            .get(timer_number)
            .filter(|slot| slot.isr.is_some())
            .map(|slot| slot.period)
    }

    pub fn ticker(&self, timer_number: usize) -> Option<&T> {
        self.slots.get(timer_number).map(|slot| &slot.ticker)
    }
}
