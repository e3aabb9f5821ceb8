use embassy_time::{Duration, Timer};
use lock_core::hal::SpinDelay;
use lock_core::lock::LockController;
use lock_core::servo::Servo;
use lock_core::timer::PeriodicTimers;

use super::servo_task::{self, EmbassyTicker};
use super::{COMBINATION, DECODER, SERVO_PWM_STATE, SERVO_TICKER};
use crate::hw::{EmbassyMicros, FrontPanel, RttDisplay};
use crate::telemetry::{FirmwareInstant, LockTelemetry};

/// Pause between main-loop passes.
const LOOP_PERIOD: Duration = Duration::from_millis(10);

const SERVO_TIMER: usize = 0;

#[embassy_executor::task]
pub async fn run(panel: FrontPanel) -> ! {
    let mut timers = PeriodicTimers::new([EmbassyTicker::new(&SERVO_TICKER)]);
    let servo = Servo::new(&SERVO_PWM_STATE);
    if !servo.initialize(&mut timers, SERVO_TIMER, servo_task::servo_tick) {
        defmt::error!("servo timer {} unavailable", SERVO_TIMER);
    }

    let mut lock = LockController::new(
        panel,
        RttDisplay::new(),
        SpinDelay::new(EmbassyMicros),
        &DECODER,
        servo,
        &COMBINATION,
    );
    let mut telemetry = LockTelemetry::new();

    let events = lock.initialize();
    telemetry.record_all(&events, FirmwareInstant::now());
    defmt::info!("lock ready");

    loop {
        let events = lock.control_lock();
        if !events.is_empty() {
            telemetry.record_all(&events, FirmwareInstant::now());
        }
        Timer::after(LOOP_PERIOD).await;
    }
}
