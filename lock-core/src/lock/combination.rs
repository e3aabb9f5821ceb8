//! Stored combination and the staging buffer used to change it.

use core::fmt;

use heapless::Vec;
use portable_atomic::{AtomicU8, Ordering};

/// Highest value a combination digit may take.
pub const MAX_DIGIT: u8 = 15;

/// Digits in a combination.
pub const COMBINATION_LEN: usize = 3;

/// Slots in the change buffer: the new combination entered twice.
pub const CHANGE_SLOTS: usize = COMBINATION_LEN * 2;

/// Three validated dial values.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Combination([u8; COMBINATION_LEN]);

impl Combination {
    /// Factory combination restored by an explicit reset.
    pub const DEFAULT: Self = Self([5, 10, 15]);

    pub fn new(digits: [u8; COMBINATION_LEN]) -> Result<Self, CombinationError> {
        if let Some((slot, &value)) = digits
            .iter()
            .enumerate()
            .find(|(_, value)| **value > MAX_DIGIT)
        {
            return Err(CombinationError::OutOfRange { slot, value });
        }
        Ok(Self(digits))
    }

    pub const fn digits(&self) -> [u8; COMBINATION_LEN] {
        self.0
    }

    pub const fn digit(&self, stage: usize) -> u8 {
        self.0[stage]
    }
}

impl Default for Combination {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [first, second, third] = self.0;
        write!(f, "{first:02}-{second:02}-{third:02}")
    }
}

/// Reasons a staged combination was refused.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CombinationError {
    /// Fewer than six slots were filled before committing.
    Incomplete { filled: usize },
    /// The second entry differs from the first.
    Mismatch,
    /// A slot holds a value the dial cannot reach.
    OutOfRange { slot: usize, value: u8 },
}

impl fmt::Display for CombinationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CombinationError::Incomplete { filled } => {
                write!(f, "only {filled} of {CHANGE_SLOTS} slots entered")
            }
            CombinationError::Mismatch => f.write_str("entries do not match"),
            CombinationError::OutOfRange { slot, value } => {
                write!(f, "slot {slot} value {value} exceeds {MAX_DIGIT}")
            }
        }
    }
}

/// Combination storage that survives a soft reset.
///
/// Firmware places the static in a RAM section the runtime never zeroes, so
/// the bytes read at boot may be garbage after a power cycle; [`Self::recover`]
/// validates them.
#[derive(Debug)]
pub struct RetainedCombination {
    digits: [AtomicU8; COMBINATION_LEN],
}

impl RetainedCombination {
    pub const fn new() -> Self {
        Self {
            digits: [AtomicU8::new(0), AtomicU8::new(0), AtomicU8::new(0)],
        }
    }

    /// Raw bytes, unvalidated.
    pub fn raw(&self) -> [u8; COMBINATION_LEN] {
        core::array::from_fn(|index| self.digits[index].load(Ordering::Relaxed))
    }

    /// Returns the stored combination, or `Err` with the refusal reason when
    /// the retained bytes are out of range.
    pub fn load(&self) -> Result<Combination, CombinationError> {
        Combination::new(self.raw())
    }

    pub fn store(&self, combination: Combination) {
        for (slot, digit) in self.digits.iter().zip(combination.digits()) {
            slot.store(digit, Ordering::Relaxed);
        }
    }

    /// Overwrites the stored value with [`Combination::DEFAULT`].
    pub fn force_reset(&self) {
        self.store(Combination::DEFAULT);
    }

    /// Validates the retained bytes, resetting them when they are unusable.
    /// Returns `true` when a reset was needed.
    pub fn recover(&self) -> bool {
        if self.load().is_ok() {
            false
        } else {
            self.force_reset();
            true
        }
    }

    /// Stored combination; [`Combination::DEFAULT`] stands in for garbage.
    pub fn get(&self) -> Combination {
        self.load().unwrap_or_default()
    }
}

impl Default for RetainedCombination {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of feeding one keypad digit into the change buffer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Keystroke {
    /// Tens digit held until the ones digit arrives.
    Tens(u8),
    /// Slot completed with the two-digit value.
    Filled { slot: usize, value: u8 },
    /// Non-decimal key, or every slot is already full.
    Ignored,
}

/// Staging buffer for a new combination typed twice on the keypad.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChangeBuffer {
    slots: Vec<u8, CHANGE_SLOTS>,
    tens: Option<u8>,
}

impl ChangeBuffer {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            tens: None,
        }
    }

    /// Adds one decimal digit: the first of a pair is the tens digit, the
    /// second completes the slot. Non-decimal keys are ignored.
    pub fn push_digit(&mut self, digit: u8) -> Keystroke {
        if digit > 9 || self.slots.is_full() {
            return Keystroke::Ignored;
        }
        match self.tens.take() {
            None => {
                self.tens = Some(digit);
                Keystroke::Tens(digit)
            }
            Some(tens) => {
                let value = tens * 10 + digit;
                let slot = self.slots.len();
                if self.slots.push(value).is_err() {
                    return Keystroke::Ignored;
                }
                Keystroke::Filled { slot, value }
            }
        }
    }

    pub fn filled(&self) -> &[u8] {
        &self.slots
    }

    pub const fn pending_tens(&self) -> Option<u8> {
        self.tens
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.tens = None;
    }

    /// Checks that six slots were entered, both halves agree, and every digit
    /// fits on the dial.
    pub fn validate(&self) -> Result<Combination, CombinationError> {
        let filled = self.slots.len();
        if filled < CHANGE_SLOTS {
            return Err(CombinationError::Incomplete { filled });
        }
        let (first, second) = self.slots.split_at(COMBINATION_LEN);
        if first != second {
            return Err(CombinationError::Mismatch);
        }
        Combination::new([first[0], first[1], first[2]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;

    fn type_pairs(buffer: &mut ChangeBuffer, values: &[u8]) {
        for value in values {
            buffer.push_digit(value / 10);
            buffer.push_digit(value % 10);
        }
    }

    #[test]
    fn combination_rejects_out_of_range_digits() {
        assert_eq!(
            Combination::new([1, 16, 3]),
            Err(CombinationError::OutOfRange { slot: 1, value: 16 })
        );

        let mut text = heapless::String::<8>::new();
        write!(text, "{}", Combination::DEFAULT).expect("fits");
        assert_eq!(text.as_str(), "05-10-15");
    }

    #[test]
    fn retained_recovery_resets_garbage_only() {
        let retained = RetainedCombination::new();
        retained.store(Combination::new([1, 2, 3]).expect("valid"));
        assert!(!retained.recover());
        assert_eq!(retained.raw(), [1, 2, 3]);

        retained.digits[2].store(0xAA, Ordering::Relaxed);
        assert_eq!(retained.get(), Combination::DEFAULT);
        assert!(retained.recover());
        assert_eq!(retained.raw(), [5, 10, 15]);
    }

    #[test]
    fn keystrokes_pair_into_slots() {
        let mut buffer = ChangeBuffer::new();
        assert_eq!(buffer.push_digit(1), Keystroke::Tens(1));
        assert_eq!(
            buffer.push_digit(2),
            Keystroke::Filled { slot: 0, value: 12 }
        );
        assert_eq!(buffer.filled(), &[12]);
        assert_eq!(buffer.pending_tens(), None);
    }

    #[test]
    fn validate_requires_matching_complete_entry() {
        let mut buffer = ChangeBuffer::new();
        type_pairs(&mut buffer, &[1, 2, 3, 1, 2]);
        assert_eq!(
            buffer.validate(),
            Err(CombinationError::Incomplete { filled: 5 })
        );

        type_pairs(&mut buffer, &[4]);
        assert_eq!(buffer.validate(), Err(CombinationError::Mismatch));

        buffer.clear();
        type_pairs(&mut buffer, &[1, 22, 3, 1, 22, 3]);
        assert_eq!(
            buffer.validate(),
            Err(CombinationError::OutOfRange { slot: 1, value: 22 })
        );

        buffer.clear();
        type_pairs(&mut buffer, &[7, 14, 0, 7, 14, 0]);
        assert_eq!(
            buffer.validate().map(|combination| combination.digits()),
            Ok([7, 14, 0])
        );
        assert_eq!(buffer.push_digit(9), Keystroke::Ignored);
    }
}
