//! Embassy GPIO adapters for the `lock-core` capability traits.

use embassy_futures::select::select;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Input, Output};
use embassy_time::Instant;
use lock_core::display::{LOCK_DISPLAY, MAX_ROWS, Row, RowDisplay};
use lock_core::hal::{CharacterDisplay, ControlPanel, MicrosCounter, PulseOutput, WiperInputs};

/// Columns on the 4x4 keypad matrix.
const KEYPAD_COLUMNS: u8 = 4;

/// The two encoder wipers, both on EXTI lines.
pub struct EncoderWipers {
    a: ExtiInput<'static>,
    b: ExtiInput<'static>,
}

impl EncoderWipers {
    pub fn new(a: ExtiInput<'static>, b: ExtiInput<'static>) -> Self {
        Self { a, b }
    }

    /// Resolves on the next edge of either wiper.
    pub async fn wait_for_edge(&mut self) {
        select(self.a.wait_for_any_edge(), self.b.wait_for_any_edge()).await;
    }
}

impl WiperInputs for EncoderWipers {
    fn read_wipers(&mut self) -> u8 {
        (u8::from(self.a.is_high()) << 1) | u8::from(self.b.is_high())
    }
}

/// Servo signal pin driven by the software PWM.
pub struct ServoPin(Output<'static>);

impl ServoPin {
    pub fn new(pin: Output<'static>) -> Self {
        Self(pin)
    }
}

impl PulseOutput for ServoPin {
    fn set_high(&mut self) {
        self.0.set_high();
    }

    fn set_low(&mut self) {
        self.0.set_low();
    }
}

/// Buttons and switches are active low with pull-ups.
pub struct FrontPanel {
    pub left_button: Input<'static>,
    pub right_button: Input<'static>,
    pub left_switch: Input<'static>,
    pub right_switch: Input<'static>,
    pub left_led: Output<'static>,
    pub right_led: Output<'static>,
    pub keypad: Keypad,
}

impl ControlPanel for FrontPanel {
    fn left_button_pressed(&mut self) -> bool {
        self.left_button.is_low()
    }

    fn right_button_pressed(&mut self) -> bool {
        self.right_button.is_low()
    }

    fn left_switch_in_left(&mut self) -> bool {
        self.left_switch.is_low()
    }

    fn right_switch_in_left(&mut self) -> bool {
        self.right_switch.is_low()
    }

    fn keypad_key(&mut self) -> Option<u8> {
        self.keypad.scan()
    }

    fn set_left_led(&mut self, on: bool) {
        self.left_led.set_level(on.into());
    }

    fn set_right_led(&mut self, on: bool) {
        self.right_led.set_level(on.into());
    }
}

/// 4x4 matrix keypad: rows driven low one at a time, columns pulled up.
pub struct Keypad {
    rows: [Output<'static>; 4],
    columns: [Input<'static>; 4],
}

impl Keypad {
    pub fn new(rows: [Output<'static>; 4], columns: [Input<'static>; 4]) -> Self {
        Self { rows, columns }
    }

    /// Returns the lowest-numbered key held down.
    pub fn scan(&mut self) -> Option<u8> {
        let mut found = None;
        for (row_index, row) in (0u8..).zip(self.rows.iter_mut()) {
            row.set_low();
            if found.is_none() {
                found = (0u8..)
                    .zip(self.columns.iter())
                    .find(|(_, column)| column.is_low())
                    .map(|(column_index, _)| row_index * KEYPAD_COLUMNS + column_index);
            }
            row.set_high();
        }
        found
    }
}

/// Character display mirrored to the RTT log.
///
/// Rows are buffered in a [`RowDisplay`]; after each refresh the rows that
/// changed since the previous refresh are logged.
pub struct RttDisplay {
    rows: RowDisplay,
    shown: [Row; MAX_ROWS],
    last_refresh: u32,
}

impl RttDisplay {
    pub fn new() -> Self {
        Self {
            rows: RowDisplay::new(LOCK_DISPLAY),
            shown: core::array::from_fn(|_| Row::new()),
            last_refresh: 0,
        }
    }
}

impl Default for RttDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl CharacterDisplay for RttDisplay {
    fn display_string(&mut self, row: u8, text: &str) {
        self.rows.display_string(row, text);
        if self.rows.refresh_count() == self.last_refresh {
            return;
        }
        self.last_refresh = self.rows.refresh_count();

        for ((index, shown), visible) in (0u8..)
            .zip(self.shown.iter_mut())
            .zip(self.rows.visible_rows())
        {
            if shown.as_str() != visible {
                shown.clear();
                let _ = shown.push_str(visible);
                defmt::info!("display:{} |{}|", index, visible);
            }
        }
    }
}

/// Microsecond counter over the Embassy time driver.
pub struct EmbassyMicros;

impl MicrosCounter for EmbassyMicros {
    #[allow(clippy::cast_possible_truncation)]
    fn now_micros(&mut self) -> u32 {
        // wraps every ~71 minutes; SpinDelay compares with wrapping_sub
        Instant::now().as_micros() as u32
    }
}
