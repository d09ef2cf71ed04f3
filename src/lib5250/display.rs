//! Screen buffer for the 5250 display
//!
//! A rows x cols grid of [`ScreenCell`]s addressed either by (row, col) or by
//! a linear buffer address (`row * cols + col`, both zero-based). Every
//! mutation widens a dirty rectangle that listeners drain with
//! [`ScreenBuffer::consume_dirty`].

use std::fmt;

use bitflags::bitflags;

use crate::error::ScreenError;
use crate::lib5250::codes::ATTR_5250_NORMAL;

bitflags! {
    /// Rendering hints decoded from a 5250 display attribute byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct ExtendedAttributes: u8 {
        const REVERSE = 0x01;
        const HIGH_INTENSITY = 0x02;
        const UNDERLINE = 0x04;
        const BLINK = 0x08;
        const COLUMN_SEPARATOR = 0x10;
        const NON_DISPLAY = 0x20;
        /// The cell holds a field attribute byte and shows as blank
        const FIELD_ATTRIBUTE = 0x40;
    }
}

impl ExtendedAttributes {
    /// Decode the low five bits of an attribute byte (0x20..=0x3F).
    pub fn from_attribute(attribute: u8) -> Self {
        if attribute & 0x07 == 0x07 {
            return ExtendedAttributes::NON_DISPLAY;
        }
        ExtendedAttributes::from_bits_truncate(attribute & 0x1F)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScreenCell {
    /// Character after code page conversion; `'\0'` for a null cell
    pub ch: char,
    pub attribute: u8,
    pub extended: ExtendedAttributes,
}

impl Default for ScreenCell {
    fn default() -> Self {
        Self { ch: '\0', attribute: ATTR_5250_NORMAL, extended: ExtendedAttributes::empty() }
    }
}

impl ScreenCell {
    pub fn new(ch: char, attribute: u8) -> Self {
        Self { ch, attribute, extended: ExtendedAttributes::from_attribute(attribute) }
    }

    /// A cell occupied by a field attribute byte.
    pub fn attribute_marker(attribute: u8) -> Self {
        Self {
            ch: ' ',
            attribute,
            extended: ExtendedAttributes::from_attribute(attribute) | ExtendedAttributes::FIELD_ATTRIBUTE,
        }
    }

    pub fn is_attribute_marker(&self) -> bool {
        self.extended.contains(ExtendedAttributes::FIELD_ATTRIBUTE)
    }

    /// Character as it should appear on screen.
    pub fn display_char(&self) -> char {
        if self.ch == '\0'
            || self.is_attribute_marker()
            || self.extended.contains(ExtendedAttributes::NON_DISPLAY)
        {
            ' '
        } else {
            self.ch
        }
    }
}

/// Inclusive rectangle of changed cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirtyRect {
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
}

impl DirtyRect {
    pub fn cell(row: usize, col: usize) -> Self {
        Self { top: row, left: col, bottom: row, right: col }
    }

    pub fn union(self, other: DirtyRect) -> Self {
        Self {
            top: self.top.min(other.top),
            left: self.left.min(other.left),
            bottom: self.bottom.max(other.bottom),
            right: self.right.max(other.right),
        }
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.top..=self.bottom).contains(&row) && (self.left..=self.right).contains(&col)
    }
}

#[derive(Debug, Clone)]
pub struct ScreenBuffer {
    rows: usize,
    cols: usize,
    cells: Vec<ScreenCell>,
    cursor: usize,
    dirty: Option<DirtyRect>,
    size_changed: bool,
}

impl ScreenBuffer {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![ScreenCell::default(); rows * cols],
            cursor: 0,
            dirty: None,
            size_changed: false,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of cells
    pub fn size(&self) -> usize {
        self.cells.len()
    }

    pub fn address(&self, row: usize, col: usize) -> Result<usize, ScreenError> {
        if row >= self.rows || col >= self.cols {
            return Err(ScreenError::PositionOutOfRange { row, col, rows: self.rows, cols: self.cols });
        }
        Ok(row * self.cols + col)
    }

    /// (row, col) of a linear address. The address is not range checked.
    pub fn position(&self, address: usize) -> (usize, usize) {
        (address / self.cols, address % self.cols)
    }

    pub fn check_address(&self, address: usize) -> Result<(), ScreenError> {
        if address >= self.cells.len() {
            return Err(ScreenError::AddressOutOfRange { address, size: self.cells.len() });
        }
        Ok(())
    }

    pub fn write(&mut self, row: usize, col: usize, cell: ScreenCell) -> Result<(), ScreenError> {
        let address = self.address(row, col)?;
        self.write_at(address, cell)
    }

    pub fn write_at(&mut self, address: usize, cell: ScreenCell) -> Result<(), ScreenError> {
        self.check_address(address)?;
        self.cells[address] = cell;
        let (row, col) = self.position(address);
        self.mark_dirty(DirtyRect::cell(row, col));
        Ok(())
    }

    pub fn read(&self, row: usize, col: usize) -> Result<&ScreenCell, ScreenError> {
        let address = self.address(row, col)?;
        Ok(&self.cells[address])
    }

    pub fn cell_at(&self, address: usize) -> Result<&ScreenCell, ScreenError> {
        self.check_address(address)?;
        Ok(&self.cells[address])
    }

    /// Reset cells `start..=end` (linear addresses) to nulls.
    pub fn erase_region(&mut self, start: usize, end: usize) -> Result<(), ScreenError> {
        self.check_address(start)?;
        self.check_address(end)?;
        if start > end {
            return Ok(());
        }
        self.cells[start..=end].fill(ScreenCell::default());
        self.mark_span(start, end);
        Ok(())
    }

    /// Mark the cells `start..=end` as changed.
    pub fn mark_span(&mut self, start: usize, end: usize) {
        let (top, left) = self.position(start);
        let (bottom, right) = self.position(end);
        let rect = if top == bottom {
            DirtyRect { top, left, bottom, right }
        } else {
            DirtyRect { top, left: 0, bottom, right: self.cols.saturating_sub(1) }
        };
        self.mark_dirty(rect);
    }

    pub fn mark_dirty(&mut self, rect: DirtyRect) {
        self.dirty = Some(match self.dirty {
            Some(existing) => existing.union(rect),
            None => rect,
        });
    }

    /// Take the accumulated dirty rectangle, leaving the buffer clean.
    pub fn consume_dirty(&mut self) -> Option<DirtyRect> {
        self.dirty.take()
    }

    fn mark_all(&mut self) {
        if !self.cells.is_empty() {
            self.mark_span(0, self.cells.len() - 1);
        }
    }

    pub fn clear(&mut self) {
        self.cells.fill(ScreenCell::default());
        self.cursor = 0;
        self.mark_all();
    }

    /// Reallocate to a new geometry. Contents are cleared.
    pub fn resize(&mut self, rows: usize, cols: usize) {
        if rows != self.rows || cols != self.cols {
            self.size_changed = true;
        }
        self.rows = rows;
        self.cols = cols;
        self.cells = vec![ScreenCell::default(); rows * cols];
        self.cursor = 0;
        self.dirty = None;
        self.mark_all();
    }

    /// New geometry if a resize happened since the last call.
    pub fn take_size_changed(&mut self) -> Option<(usize, usize)> {
        if std::mem::take(&mut self.size_changed) {
            Some((self.rows, self.cols))
        } else {
            None
        }
    }

    pub fn cursor(&self) -> (usize, usize) {
        self.position(self.cursor)
    }

    pub fn cursor_address(&self) -> usize {
        self.cursor
    }

    pub fn set_cursor(&mut self, row: usize, col: usize) -> Result<(), ScreenError> {
        self.cursor = self.address(row, col)?;
        Ok(())
    }

    pub fn set_cursor_address(&mut self, address: usize) -> Result<(), ScreenError> {
        self.check_address(address)?;
        self.cursor = address;
        Ok(())
    }

    /// Shift rows `top..=bottom` by `lines`; positive rolls down, negative up.
    /// Vacated rows are cleared.
    pub fn roll(&mut self, top: usize, bottom: usize, lines: isize) -> Result<(), ScreenError> {
        let start = self.address(top, 0)?;
        let end = self.address(bottom, self.cols.saturating_sub(1))?;
        if top > bottom {
            return Ok(());
        }
        let span = &mut self.cells[start..=end];
        let shift = lines.unsigned_abs().min(bottom - top + 1) * self.cols;
        if lines > 0 {
            span.rotate_right(shift);
            span[..shift].fill(ScreenCell::default());
        } else {
            span.rotate_left(shift);
            let len = span.len();
            span[len - shift..].fill(ScreenCell::default());
        }
        self.mark_span(start, end);
        Ok(())
    }

    /// Text of one row with nulls and attribute cells shown as blanks.
    pub fn row_text(&self, row: usize) -> Option<String> {
        if row >= self.rows {
            return None;
        }
        let start = row * self.cols;
        Some(self.cells[start..start + self.cols].iter().map(ScreenCell::display_char).collect())
    }
}

impl fmt::Display for ScreenBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.rows {
            if row > 0 {
                writeln!(f)?;
            }
            let start = row * self.cols;
            for cell in &self.cells[start..start + self.cols] {
                write!(f, "{}", cell.display_char())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_read_back() {
        let mut buffer = ScreenBuffer::new(24, 80);
        buffer.write(2, 5, ScreenCell::new('X', 0x22)).unwrap();
        let cell = buffer.read(2, 5).unwrap();
        assert_eq!(cell.ch, 'X');
        assert!(cell.extended.contains(ExtendedAttributes::HIGH_INTENSITY));
        assert_eq!(buffer.consume_dirty(), Some(DirtyRect::cell(2, 5)));
        assert_eq!(buffer.consume_dirty(), None);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut buffer = ScreenBuffer::new(24, 80);
        assert!(buffer.write(24, 0, ScreenCell::default()).is_err());
        assert!(buffer.read(0, 80).is_err());
        assert!(buffer.cell_at(24 * 80).is_err());
    }

    #[test]
    fn test_erase_spanning_rows_marks_full_width() {
        let mut buffer = ScreenBuffer::new(24, 80);
        buffer.write(1, 79, ScreenCell::new('A', 0x20)).unwrap();
        buffer.consume_dirty();
        buffer.erase_region(79, 161).unwrap();
        assert_eq!(buffer.read(0, 79).unwrap().ch, '\0');
        assert_eq!(
            buffer.consume_dirty(),
            Some(DirtyRect { top: 0, left: 0, bottom: 2, right: 79 })
        );
    }

    #[test]
    fn test_resize_reports_once() {
        let mut buffer = ScreenBuffer::new(24, 80);
        buffer.resize(27, 132);
        assert_eq!(buffer.size(), 27 * 132);
        assert_eq!(buffer.take_size_changed(), Some((27, 132)));
        assert_eq!(buffer.take_size_changed(), None);
        buffer.resize(27, 132);
        assert_eq!(buffer.take_size_changed(), None);
    }

    #[test]
    fn test_non_display_hides_text() {
        let cell = ScreenCell::new('P', 0x27);
        assert_eq!(cell.display_char(), ' ');
        assert_eq!(ScreenCell::attribute_marker(0x20).display_char(), ' ');
    }

    #[test]
    fn test_roll_up_clears_bottom() {
        let mut buffer = ScreenBuffer::new(3, 2);
        buffer.write(1, 0, ScreenCell::new('B', 0x20)).unwrap();
        buffer.write(2, 0, ScreenCell::new('C', 0x20)).unwrap();
        buffer.roll(0, 2, -1).unwrap();
        assert_eq!(buffer.row_text(0).unwrap(), "B ");
        assert_eq!(buffer.row_text(1).unwrap(), "C ");
        assert_eq!(buffer.row_text(2).unwrap(), "  ");
    }

    #[test]
    fn test_display_dump() {
        let mut buffer = ScreenBuffer::new(2, 3);
        buffer.write(0, 0, ScreenCell::new('H', 0x20)).unwrap();
        buffer.write(1, 2, ScreenCell::new('I', 0x20)).unwrap();
        assert_eq!(buffer.to_string(), "H  \n  I");
    }
}
