//! Dial entry progress while the lock is closed.
//!
//! Digits are dialed in alternating directions starting clockwise. Turning in
//! the expected direction moves the circular dial one detent; every time it
//! lands on the stored digit for the active stage that digit's visible count
//! goes up. The first edge against the expected direction closes the stage
//! and flips the direction without moving the dial. On the last stage a
//! counterclockwise edge throws the whole entry away.

use core::fmt;

use crate::encoder::Direction;

use super::combination::{COMBINATION_LEN, Combination};

/// Detents on the dial face, numbered `0..DIAL_POSITIONS`.
pub const DIAL_POSITIONS: u8 = 16;

/// Index of the third digit.
pub const FINAL_STAGE: usize = COMBINATION_LEN - 1;

/// Visible counts each digit must reach: at least three passes for the
/// first, exactly two for the second, exactly one for the third.
pub const FIRST_DIGIT_MIN_PASSES: u8 = 3;
pub const SECOND_DIGIT_PASSES: u8 = 2;
pub const THIRD_DIGIT_PASSES: u8 = 1;

/// What a single direction edge did to the entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EntryStep {
    Idle,
    /// Dial moved; `counted` is set when it landed on the stage's digit.
    Stepped { dial: u8, counted: bool },
    /// The reversing edge moved entry on to `stage`.
    Advanced { stage: usize },
    Cleared,
}

/// Moves the dial one detent, wrapping between 0 and 15.
pub const fn step_dial(dial: u8, direction: Direction) -> u8 {
    match direction {
        Direction::Clockwise => {
            if dial + 1 >= DIAL_POSITIONS {
                0
            } else {
                dial + 1
            }
        }
        Direction::Counterclockwise => {
            if dial == 0 {
                DIAL_POSITIONS - 1
            } else {
                dial - 1
            }
        }
        Direction::Stationary => dial,
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EntryProgress {
    dial: u8,
    entered: [Option<u8>; COMBINATION_LEN],
    counts: [u8; COMBINATION_LEN],
    stage: usize,
    expected: Direction,
}

impl EntryProgress {
    pub const fn new() -> Self {
        Self {
            dial: 0,
            entered: [None; COMBINATION_LEN],
            counts: [0; COMBINATION_LEN],
            stage: 0,
            expected: Direction::Clockwise,
        }
    }

    /// Back to dial 0, stage 0, expecting clockwise.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Applies one decoded edge; `combination` supplies the digit whose
    /// passes are counted on the active stage.
    pub fn apply(&mut self, direction: Direction, combination: &Combination) -> EntryStep {
        if direction == Direction::Stationary {
            return EntryStep::Idle;
        }

        if direction == self.expected {
            self.dial = step_dial(self.dial, direction);
            self.entered[self.stage] = Some(self.dial);
            let counted = self.dial == combination.digit(self.stage);
            if counted {
                self.counts[self.stage] = self.counts[self.stage].saturating_add(1);
            }
            return EntryStep::Stepped {
                dial: self.dial,
                counted,
            };
        }

        if self.stage < FINAL_STAGE {
            self.stage += 1;
            self.expected = self.expected.reversed();
            EntryStep::Advanced { stage: self.stage }
        } else {
            self.clear();
            EntryStep::Cleared
        }
    }

    /// True only when every entered digit equals `combination` and the visible
    /// counts meet their thresholds.
    pub fn matches(&self, combination: &Combination) -> bool {
        let digits_match = self
            .entered
            .iter()
            .zip(combination.digits())
            .all(|(entered, digit)| *entered == Some(digit));

        digits_match
            && self.counts[0] >= FIRST_DIGIT_MIN_PASSES
            && self.counts[1] == SECOND_DIGIT_PASSES
            && self.counts[2] == THIRD_DIGIT_PASSES
    }

    pub const fn dial(&self) -> u8 {
        self.dial
    }

    pub const fn entered(&self) -> [Option<u8>; COMBINATION_LEN] {
        self.entered
    }

    pub const fn visible_counts(&self) -> [u8; COMBINATION_LEN] {
        self.counts
    }

    pub const fn stage(&self) -> usize {
        self.stage
    }

    pub const fn expected_direction(&self) -> Direction {
        self.expected
    }

    /// Last stage is active; the left button may now evaluate the entry.
    pub const fn is_complete(&self) -> bool {
        self.stage == FINAL_STAGE
    }
}

impl Default for EntryProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// `05-10-   d05 320`: entered digits, dial, and visible counts.
impl fmt::Display for EntryProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, entered) in self.entered.iter().enumerate() {
            if index > 0 {
                f.write_str("-")?;
            }
            match entered {
                Some(value) => write!(f, "{value:02}")?,
                None => f.write_str("  ")?,
            }
        }
        write!(f, " d{:02} ", self.dial)?;
        for count in self.counts {
            write!(f, "{}", count.min(9))?;
        }
        Ok(())
    }
}
