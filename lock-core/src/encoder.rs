//! Interrupt-driven quadrature decoder for the dial's rotary encoder.
//!
//! The pin-change handler runs [`QuadratureDecoder::handle_interrupt`] on every
//! edge of either wiper, while the main loop drains detected steps through
//! [`QuadratureDecoder::get_direction`]. All shared fields are single-word
//! atomics so both contexts can hold a shared reference.
//!
//! A step is only counted after the full HIGH_HIGH → HIGH_LOW → LOW_LOW
//! (clockwise) or HIGH_HIGH → LOW_HIGH → LOW_LOW (counterclockwise) sequence.
//! Contact bounce that does not complete one of those sequences is absorbed
//! without producing an edge.

use core::fmt::{self, Write};

use heapless::String;
use portable_atomic::{AtomicU8, AtomicU32, Ordering};

use crate::hal::WiperInputs;

/// Longest [`QuadratureDecoder::count_rotations`] text: `CW:4294967295 CCW:4294967295`.
pub const ROTATIONS_TEXT_LEN: usize = 28;

/// Last sampled Gray code of the two wipers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum QuadratureState {
    HighHigh = 0,
    HighLow = 1,
    LowLow = 2,
    LowHigh = 3,
    Unknown = 4,
}

impl QuadratureState {
    /// Maps a 2-bit wiper code onto its state; anything wider is [`Unknown`](Self::Unknown).
    pub const fn from_code(code: u8) -> Self {
        match code {
            0b11 => Self::HighHigh,
            0b10 => Self::HighLow,
            0b00 => Self::LowLow,
            0b01 => Self::LowHigh,
            _ => Self::Unknown,
        }
    }

    const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::HighHigh,
            1 => Self::HighLow,
            2 => Self::LowLow,
            3 => Self::LowHigh,
            _ => Self::Unknown,
        }
    }
}

/// One detected rotation step.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Direction {
    Stationary = 0,
    Clockwise = 1,
    Counterclockwise = 2,
}

impl Direction {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Clockwise,
            2 => Self::Counterclockwise,
            _ => Self::Stationary,
        }
    }

    /// Returns the opposite turning direction; [`Stationary`](Self::Stationary) maps to itself.
    pub const fn reversed(self) -> Self {
        match self {
            Self::Clockwise => Self::Counterclockwise,
            Self::Counterclockwise => Self::Clockwise,
            Self::Stationary => Self::Stationary,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stationary => "stationary",
            Self::Clockwise => "cw",
            Self::Counterclockwise => "ccw",
        })
    }
}

/// Reads both wipers and returns the 2-bit quadrature code.
pub fn sample<W: WiperInputs>(pins: &mut W) -> u8 {
    pins.read_wipers() & 0b11
}

/// Gray-code state machine shared between the pin ISR and the main loop.
#[derive(Debug)]
pub struct QuadratureDecoder {
    state: AtomicU8,
    last_state: AtomicU8,
    direction: AtomicU8,
    clockwise_count: AtomicU32,
    counterclockwise_count: AtomicU32,
}

impl QuadratureDecoder {
    /// Creates a decoder with no known wiper state.
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(QuadratureState::Unknown as u8),
            last_state: AtomicU8::new(QuadratureState::Unknown as u8),
            direction: AtomicU8::new(Direction::Stationary as u8),
            clockwise_count: AtomicU32::new(0),
            counterclockwise_count: AtomicU32::new(0),
        }
    }

    /// Seeds the state from the current wiper levels and drops any pending edge.
    pub fn initialize<W: WiperInputs>(&self, pins: &mut W) {
        let code = sample(pins);
        self.state
            .store(QuadratureState::from_code(code) as u8, Ordering::Relaxed);
        self.direction
            .store(Direction::Stationary as u8, Ordering::Relaxed);
    }

    /// Pin-change handler: samples the wipers and advances the state machine.
    pub fn handle_interrupt<W: WiperInputs>(&self, pins: &mut W) {
        self.process_code(sample(pins));
    }

    /// Advances the state machine with an already sampled code.
    pub fn process_code(&self, code: u8) {
        let previous_state = self.state();
        let last_state = QuadratureState::from_raw(self.last_state.load(Ordering::Relaxed));

        let next = match QuadratureState::from_code(code) {
            QuadratureState::LowLow => {
                if previous_state == QuadratureState::HighLow
                    && last_state == QuadratureState::HighHigh
                {
                    self.clockwise_count.fetch_add(1, Ordering::Relaxed);
                    self.direction
                        .store(Direction::Clockwise as u8, Ordering::Relaxed);
                    QuadratureState::LowLow
                } else if previous_state == QuadratureState::LowHigh
                    && last_state == QuadratureState::HighHigh
                {
                    self.counterclockwise_count.fetch_add(1, Ordering::Relaxed);
                    self.direction
                        .store(Direction::Counterclockwise as u8, Ordering::Relaxed);
                    QuadratureState::LowLow
                } else {
                    previous_state
                }
            }
            other => other,
        };

        self.state.store(next as u8, Ordering::Relaxed);
        self.last_state
            .store(previous_state as u8, Ordering::Relaxed);
    }

    /// Returns the pending edge and resets it to [`Direction::Stationary`].
    pub fn get_direction(&self) -> Direction {
        Direction::from_raw(
            self.direction
                .swap(Direction::Stationary as u8, Ordering::Relaxed),
        )
    }

    /// Current Gray-code state.
    pub fn state(&self) -> QuadratureState {
        QuadratureState::from_raw(self.state.load(Ordering::Relaxed))
    }

    pub fn clockwise_count(&self) -> u32 {
        self.clockwise_count.load(Ordering::Relaxed)
    }

    pub fn counterclockwise_count(&self) -> u32 {
        self.counterclockwise_count.load(Ordering::Relaxed)
    }

    /// Formats the rotation counters as `CW:<n> CCW:<m>`.
    pub fn count_rotations(&self) -> String<ROTATIONS_TEXT_LEN> {
        let mut text = String::new();
        let _ = write!(
            text,
            "CW:{} CCW:{}",
            self.clockwise_count(),
            self.counterclockwise_count()
        );
        text
    }
}

impl Default for QuadratureDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wiper codes visited by one full detent-to-detent clockwise step.
pub const CLOCKWISE_STEP: [u8; 4] = [0b10, 0b00, 0b01, 0b11];

/// Wiper codes visited by one full detent-to-detent counterclockwise step.
pub const COUNTERCLOCKWISE_STEP: [u8; 4] = [0b01, 0b00, 0b10, 0b11];

#[cfg(test)]
mod tests {
    use super::*;

    fn at_rest() -> QuadratureDecoder {
        let decoder = QuadratureDecoder::new();
        decoder.process_code(0b11);
        decoder
    }

    fn feed(decoder: &QuadratureDecoder, codes: &[u8]) {
        for &code in codes {
            decoder.process_code(code);
        }
    }

    fn contains_subsequence(codes: &[u8], pattern: &[u8]) -> bool {
        let mut remaining = pattern.iter().peekable();
        for code in codes {
            if remaining.peek() == Some(&code) {
                remaining.next();
            }
        }
        remaining.peek().is_none()
    }

    #[test]
    fn clockwise_step_emits_one_edge() {
        let decoder = at_rest();
        feed(&decoder, &CLOCKWISE_STEP);
        assert_eq!(decoder.get_direction(), Direction::Clockwise);
        assert_eq!(decoder.clockwise_count(), 1);
        assert_eq!(decoder.counterclockwise_count(), 0);
    }

    #[test]
    fn counterclockwise_step_emits_one_edge() {
        let decoder = at_rest();
        feed(&decoder, &COUNTERCLOCKWISE_STEP);
        assert_eq!(decoder.get_direction(), Direction::Counterclockwise);
        assert_eq!(decoder.counterclockwise_count(), 1);
    }

    #[test]
    fn direction_is_consumed_by_read() {
        let decoder = at_rest();
        feed(&decoder, &CLOCKWISE_STEP);
        assert_eq!(decoder.get_direction(), Direction::Clockwise);
        assert_eq!(decoder.get_direction(), Direction::Stationary);
    }

    #[test]
    fn bounce_without_full_sequence_is_absorbed() {
        let decoder = at_rest();
        // HH -> HL -> HH -> HL -> HH: wiper A chatters but never reaches LL
        feed(&decoder, &[0b10, 0b11, 0b10, 0b11]);
        assert_eq!(decoder.get_direction(), Direction::Stationary);

        // HL jumps straight to LH, so LL is not reached from a HH detent
        feed(&decoder, &[0b10, 0b01, 0b00]);
        assert_eq!(decoder.get_direction(), Direction::Stationary);
        assert_eq!(decoder.clockwise_count(), 0);
        assert_eq!(decoder.counterclockwise_count(), 0);
    }

    #[test]
    fn unmatched_low_low_keeps_previous_state() {
        let decoder = QuadratureDecoder::new();
        decoder.process_code(0b10);
        decoder.process_code(0b00);
        assert_eq!(decoder.state(), QuadratureState::HighLow);
    }

    #[test]
    fn invalid_code_sets_unknown() {
        let decoder = at_rest();
        decoder.process_code(0b111);
        assert_eq!(decoder.state(), QuadratureState::Unknown);
        decoder.process_code(0b00);
        assert_eq!(decoder.get_direction(), Direction::Stationary);
    }

    #[test]
    fn no_edge_without_valid_subsequence_exhaustive() {
        // Every length-4 code sequence that avoids HH,HL,LL and HH,LH,LL stays silent.
        for seq in 0u16..256 {
            let codes = [
                (seq & 0b11) as u8,
                ((seq >> 2) & 0b11) as u8,
                ((seq >> 4) & 0b11) as u8,
                ((seq >> 6) & 0b11) as u8,
            ];
            if contains_subsequence(&codes, &[0b11, 0b10, 0b00])
                || contains_subsequence(&codes, &[0b11, 0b01, 0b00])
            {
                continue;
            }

            let decoder = QuadratureDecoder::new();
            feed(&decoder, &codes);
            assert_eq!(
                decoder.get_direction(),
                Direction::Stationary,
                "sequence {codes:?} must not produce an edge"
            );
        }
    }

    #[test]
    fn count_rotations_reports_both_directions() {
        let decoder = at_rest();
        feed(&decoder, &CLOCKWISE_STEP);
        feed(&decoder, &CLOCKWISE_STEP);
        feed(&decoder, &COUNTERCLOCKWISE_STEP);
        assert_eq!(decoder.count_rotations().as_str(), "CW:2 CCW:1");
    }

    #[test]
    fn count_rotations_fits_saturated_counters() {
        let decoder = at_rest();
        decoder.clockwise_count.store(u32::MAX, Ordering::Relaxed);
        decoder
            .counterclockwise_count
            .store(u32::MAX, Ordering::Relaxed);
        assert_eq!(
            decoder.count_rotations().as_str(),
            "CW:4294967295 CCW:4294967295"
        );
    }
}
