//! Periodic ISR emulation on top of `embassy_time::Ticker`.

use core::time::Duration as CoreDuration;

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Ticker};
use lock_core::hal::Isr;
use lock_core::timer::PeriodicTicker;

use super::{SERVO_PIN, SERVO_PWM_STATE};

#[derive(Copy, Clone)]
pub enum TickerCommand {
    Attach { isr: Isr, period: Duration },
    Detach,
}

pub type TickerSignal = Signal<CriticalSectionRawMutex, TickerCommand>;

/// [`PeriodicTicker`] that hands its schedule to [`run`].
pub struct EmbassyTicker {
    commands: &'static TickerSignal,
}

impl EmbassyTicker {
    pub const fn new(commands: &'static TickerSignal) -> Self {
        Self { commands }
    }
}

impl PeriodicTicker for EmbassyTicker {
    fn attach(&mut self, isr: Isr, period: CoreDuration) {
        let micros = u64::try_from(period.as_micros()).unwrap_or(u64::MAX);
        self.commands.signal(TickerCommand::Attach {
            isr,
            period: Duration::from_micros(micros),
        });
    }

    fn detach(&mut self) {
        self.commands.signal(TickerCommand::Detach);
    }
}

/// Servo PWM tick; registered through `Servo::initialize`.
pub fn servo_tick() {
    SERVO_PIN.lock(|pin| {
        if let Some(pin) = pin.borrow_mut().as_mut() {
            SERVO_PWM_STATE.on_tick(pin);
        }
    });
}

#[embassy_executor::task]
pub async fn run(commands: &'static TickerSignal) -> ! {
    let mut command = commands.wait().await;
    loop {
        command = match command {
            TickerCommand::Detach => commands.wait().await,
            TickerCommand::Attach { isr, period } => {
                let mut ticker = Ticker::every(period);
                loop {
                    match select(ticker.next(), commands.wait()).await {
                        Either::First(()) => isr(),
                        Either::Second(next) => break next,
                    }
                }
            }
        };
    }
}
