//! Row-buffered character display model.
//!
//! Writes land in a pending frame; a row whose text ends in `\n` publishes the
//! whole pending frame to the visible one, mirroring how the OLED driver only
//! pushes pixels on refresh.

use heapless::String;

use crate::hal::CharacterDisplay;

/// Widest supported row.
pub const MAX_COLUMNS: usize = 21;

/// Tallest supported layout.
pub const MAX_ROWS: usize = 8;

/// Characters per row and rows per screen of a text layout.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DisplayGeometry {
    pub columns: u8,
    pub rows: u8,
}

impl DisplayGeometry {
    /// Layout for one of the supported column counts (8, 10, 16, or 21).
    ///
    /// Narrow layouts use the double-height font and fit four rows; wide ones
    /// fit eight.
    pub const fn for_columns(columns: u8) -> Option<Self> {
        match columns {
            8 | 10 => Some(Self { columns, rows: 4 }),
            16 | 21 => Some(Self { columns, rows: 8 }),
            _ => None,
        }
    }
}

/// 16 columns by 8 rows on the 128x64 panel.
pub const LOCK_DISPLAY: DisplayGeometry = DisplayGeometry {
    columns: 16,
    rows: 8,
};

pub type Row = String<MAX_COLUMNS>;

/// In-memory display with separate pending and visible frames.
#[derive(Clone, Debug)]
pub struct RowDisplay {
    geometry: DisplayGeometry,
    pending: [Row; MAX_ROWS],
    visible: [Row; MAX_ROWS],
    refreshes: u32,
}

impl RowDisplay {
    pub fn new(geometry: DisplayGeometry) -> Self {
        let mut display = Self {
            geometry,
            pending: Default::default(),
            visible: Default::default(),
            refreshes: 0,
        };
        for row in 0..geometry.rows {
            display.write_row(row, "");
        }
        display.visible.clone_from(&display.pending);
        display
    }

    pub const fn geometry(&self) -> DisplayGeometry {
        self.geometry
    }

    /// Publishes the pending frame.
    pub fn refresh(&mut self) {
        self.visible.clone_from(&self.pending);
        self.refreshes = self.refreshes.wrapping_add(1);
    }

    /// Text currently shown on `row`, padded to the column count.
    pub fn visible_row(&self, row: u8) -> Option<&str> {
        self.row_index(row).map(|index| self.visible[index].as_str())
    }

    /// Text written to `row` since the last refresh.
    pub fn pending_row(&self, row: u8) -> Option<&str> {
        self.row_index(row).map(|index| self.pending[index].as_str())
    }

    /// Visible rows, top to bottom.
    pub fn visible_rows(&self) -> impl Iterator<Item = &str> {
        self.visible[..usize::from(self.geometry.rows)]
            .iter()
            .map(Row::as_str)
    }

    pub const fn refresh_count(&self) -> u32 {
        self.refreshes
    }

    fn row_index(&self, row: u8) -> Option<usize> {
        (row < self.geometry.rows).then_some(usize::from(row))
    }

    fn write_row(&mut self, row: u8, text: &str) {
        let Some(index) = self.row_index(row) else {
            return;
        };
        let columns = usize::from(self.geometry.columns);
        let slot = &mut self.pending[index];
        slot.clear();
        for ch in text.chars().take(columns) {
            if slot.push(ch).is_err() {
                break;
            }
        }
        while slot.chars().count() < columns {
            if slot.push(' ').is_err() {
                break;
            }
        }
    }
}

impl CharacterDisplay for RowDisplay {
    fn display_string(&mut self, row: u8, text: &str) {
        match text.strip_suffix('\n') {
            Some(line) => {
                self.write_row(row, line);
                self.refresh();
            }
            None => self.write_row(row, text),
        }
    }
}
