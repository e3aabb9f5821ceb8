//! Lock event telemetry for the firmware.
//!
//! Events returned by each controller tick are stamped with the Embassy clock,
//! kept in the shared `lock-core` ring, and mirrored to defmt (or stdout on
//! host builds) so bring-up sessions can follow the lock over RTT.

use core::time::Duration as CoreDuration;

use embassy_time::{Duration, Instant};
use lock_core::telemetry::{EventId, LockEvent, TelemetryInstant, TelemetryRecorder};

/// Embassy instant usable as a `lock-core` telemetry timestamp.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    #[cfg(target_os = "none")]
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub fn as_micros(self) -> u64 {
        self.0.as_micros()
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(instant: Instant) -> Self {
        Self(instant)
    }
}

impl TelemetryInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> CoreDuration {
        let elapsed: Duration = self.0.saturating_duration_since(earlier.0);
        CoreDuration::from_micros(elapsed.as_micros())
    }
}

/// Ring of recent lock events plus the log mirror.
pub struct LockTelemetry {
    recorder: TelemetryRecorder<FirmwareInstant>,
}

impl LockTelemetry {
    pub const fn new() -> Self {
        Self {
            recorder: TelemetryRecorder::new(),
        }
    }

    /// Records and logs every event of one controller tick.
    pub fn record_all(&mut self, events: &[LockEvent], timestamp: FirmwareInstant) {
        for event in events {
            let id = self.recorder.record(*event, timestamp);
            let elapsed = self
                .recorder
                .latest()
                .and_then(|record| record.since_last_transition);
            log_event(id, event, timestamp, elapsed);
        }
    }

    pub fn len(&self) -> usize {
        self.recorder.len()
    }
}

impl Default for LockTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

fn log_event(
    id: EventId,
    event: &LockEvent,
    timestamp: FirmwareInstant,
    elapsed: Option<CoreDuration>,
) {
    let timestamp_us = timestamp.as_micros();
    let elapsed_us = elapsed.map(|value| u64::try_from(value.as_micros()).unwrap_or(u64::MAX));
    emit_log(id, event, timestamp_us, elapsed_us);
}

#[cfg(target_os = "none")]
fn emit_log(id: EventId, event: &LockEvent, timestamp_us: u64, delta_us: Option<u64>) {
    if let Some(delta) = delta_us {
        defmt::info!(
            "telemetry:lock #{} {} t={}us Δ={}us",
            id,
            defmt::Display2Format(event),
            timestamp_us,
            delta
        );
    } else {
        defmt::info!(
            "telemetry:lock #{} {} t={}us",
            id,
            defmt::Display2Format(event),
            timestamp_us
        );
    }
}

#[cfg(not(target_os = "none"))]
fn emit_log(id: EventId, event: &LockEvent, timestamp_us: u64, delta_us: Option<u64>) {
    if let Some(delta) = delta_us {
        println!("telemetry:lock #{id} {event} t={timestamp_us}us Δ={delta}us");
    } else {
        println!("telemetry:lock #{id} {event} t={timestamp_us}us");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lock_core::lock::LockState;

    fn micros(value: u64) -> FirmwareInstant {
        FirmwareInstant::from(Instant::from_micros(value))
    }

    #[test]
    fn records_elapsed_between_state_changes() {
        let mut telemetry = LockTelemetry::new();

        telemetry.record_all(
            &[
                LockEvent::Initialized,
                LockEvent::StateChanged {
                    from: LockState::Locked,
                    to: LockState::Unlocked,
                },
            ],
            micros(100),
        );
        telemetry.record_all(
            &[LockEvent::StateChanged {
                from: LockState::Unlocked,
                to: LockState::Locked,
            }],
            micros(2_600),
        );

        assert_eq!(telemetry.len(), 3);
        let latest = telemetry.recorder.latest().copied().expect("recorded");
        assert_eq!(latest.id, 2);
        assert_eq!(
            latest.since_last_transition,
            Some(CoreDuration::from_micros(2_500))
        );
    }
}
