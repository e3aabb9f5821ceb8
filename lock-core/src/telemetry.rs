//! Lock event catalog and the bounded history it is recorded into.
//!
//! The core never logs directly. [`crate::lock::LockController::control_lock`]
//! returns the events of one tick; firmware forwards them to `defmt` and the
//! emulator prints them, both keeping the most recent ones in a
//! [`TelemetryRecorder`].

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered, Vec};

use crate::encoder::Direction;
use crate::lock::{Combination, CombinationError, LockState};

/// Upper bound of events one `control_lock` call can report.
pub const MAX_EVENTS_PER_TICK: usize = 8;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

pub type EventId = u32;

/// Events produced by a single controller tick.
pub type LockEvents = Vec<LockEvent, MAX_EVENTS_PER_TICK>;

/// Observable things the lock controller did.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LockEvent {
    Initialized,
    /// Retained combination was unreadable and the default was restored.
    CombinationRecovered,
    StateChanged { from: LockState, to: LockState },
    DialStepped { direction: Direction, dial: u8 },
    /// Dial landed on the stage's digit; `count` is the new visible count.
    DigitPassed { stage: usize, count: u8 },
    StageAdvanced { stage: usize },
    EntryCleared,
    BadTry { count: u8 },
    KeyDown(u8),
    KeyUp(u8),
    SlotFilled { slot: usize, value: u8 },
    CombinationChanged(Combination),
    CombinationRejected(CombinationError),
    CombinationReset,
}

impl fmt::Display for LockEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockEvent::Initialized => f.write_str("initialized"),
            LockEvent::CombinationRecovered => f.write_str("combination-recovered"),
            LockEvent::StateChanged { from, to } => write!(f, "state {from} -> {to}"),
            LockEvent::DialStepped { direction, dial } => write!(f, "dial {direction} {dial:02}"),
            LockEvent::DigitPassed { stage, count } => {
                write!(f, "digit-passed stage={stage} count={count}")
            }
            LockEvent::StageAdvanced { stage } => write!(f, "stage-advanced {stage}"),
            LockEvent::EntryCleared => f.write_str("entry-cleared"),
            LockEvent::BadTry { count } => write!(f, "bad-try {count}"),
            LockEvent::KeyDown(key) => write!(f, "key-down {key}"),
            LockEvent::KeyUp(key) => write!(f, "key-up {key}"),
            LockEvent::SlotFilled { slot, value } => write!(f, "slot {slot} = {value}"),
            LockEvent::CombinationChanged(combination) => {
                write!(f, "combination-changed {combination}")
            }
            LockEvent::CombinationRejected(error) => write!(f, "combination-rejected: {error}"),
            LockEvent::CombinationReset => f.write_str("combination-reset"),
        }
    }
}

/// Trait implemented by monotonic instant wrappers used for telemetry tracking.
pub trait TelemetryInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

impl TelemetryInstant for Duration {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        self.saturating_sub(earlier)
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: LockEvent,
    /// Time since the previous state change, for state-change records.
    pub since_last_transition: Option<Duration>,
}

/// Records lock events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>,
    last_transition_at: Option<TInstant>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_transition_at: None,
            next_event_id: 0,
        }
    }

    /// Appends `event`, evicting the oldest record when full.
    pub fn record(&mut self, event: LockEvent, timestamp: TInstant) -> EventId {
        let since_last_transition = if matches!(event, LockEvent::StateChanged { .. }) {
            let elapsed = self
                .last_transition_at
                .map(|previous| timestamp.saturating_duration_since(previous));
            self.last_transition_at = Some(timestamp);
            elapsed
        } else {
            None
        };

        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            since_last_transition,
        });
        id
    }

    /// Records every event of one tick under the same timestamp.
    pub fn record_all(&mut self, events: &[LockEvent], timestamp: TInstant) {
        for event in events {
            self.record(*event, timestamp);
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    #[test]
    fn state_changes_carry_elapsed_time() {
        let mut recorder: TelemetryRecorder<Duration, 4> = TelemetryRecorder::new();
        recorder.record(
            LockEvent::StateChanged {
                from: LockState::Locked,
                to: LockState::Unlocked,
            },
            Duration::from_millis(10),
        );
        recorder.record(LockEvent::EntryCleared, Duration::from_millis(15));
        recorder.record(
            LockEvent::StateChanged {
                from: LockState::Unlocked,
                to: LockState::Locked,
            },
            Duration::from_millis(40),
        );

        let latest = recorder.latest().expect("recorded");
        assert_eq!(latest.id, 2);
        assert_eq!(latest.since_last_transition, Some(Duration::from_millis(30)));
        let first = recorder.oldest_first().next().expect("recorded");
        assert_eq!(first.since_last_transition, None);
    }

    #[test]
    fn ring_keeps_most_recent_records() {
        let mut recorder: TelemetryRecorder<Duration, 2> = TelemetryRecorder::new();
        for count in 1..=3 {
            recorder.record(LockEvent::BadTry { count }, Duration::ZERO);
        }
        assert_eq!(recorder.len(), 2);
        let events: Vec<LockEvent, 2> = recorder.oldest_first().map(|record| record.event).collect();
        assert_eq!(
            events.as_slice(),
            &[LockEvent::BadTry { count: 2 }, LockEvent::BadTry { count: 3 }]
        );
    }

    #[test]
    fn events_render_for_logs() {
        let mut text = heapless::String::<48>::new();
        write!(
            text,
            "{}",
            LockEvent::DialStepped {
                direction: Direction::Counterclockwise,
                dial: 7
            }
        )
        .expect("fits");
        assert_eq!(text.as_str(), "dial ccw 07");
    }
}
