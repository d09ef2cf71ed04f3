//! Input fields of the 5250 format table
//!
//! A field is defined by a Start-of-Field order: two field format words
//! (FFW1/FFW2) decoded once into [`FieldFormat`], a display attribute and a
//! length. [`FieldTable`] keeps fields sorted by start address and never lets
//! two of them overlap.
use std::collections::btree_map::{BTreeMap, Values};
use std::ops::Bound::{Excluded, Unbounded};

use crate::error::{FieldValidationError, ScreenError};
use crate::lib5250::codes::ATTR_5250_NORMAL;

/// FFW1 bit layout
pub const FFW1_MARKER_MASK: u8 = 0xC0;
pub const FFW1_MARKER: u8 = 0x40;
pub const FFW1_BYPASS: u8 = 0x20;
pub const FFW1_DUP_ENABLE: u8 = 0x10;
pub const FFW1_MDT: u8 = 0x08;
pub const FFW1_SHIFT_MASK: u8 = 0x07;

/// FFW2 bit layout
pub const FFW2_AUTO_ENTER: u8 = 0x80;
pub const FFW2_FER: u8 = 0x40;
pub const FFW2_MONOCASE: u8 = 0x20;
pub const FFW2_RESERVED: u8 = 0x10;
pub const FFW2_MANDATORY_ENTER: u8 = 0x08;
pub const FFW2_ADJUST_MASK: u8 = 0x07;

/// Keyboard shift of a field (FFW1 bits 2:0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldShift {
    Alpha,
    AlphaOnly,
    NumericShift,
    Numeric,
    RightToLeft,
    DigitsOnly,
    MagneticStripe,
    SignedNumeric,
}

impl FieldShift {
    pub fn from_bits(bits: u8) -> Self {
        match bits & FFW1_SHIFT_MASK {
            0 => FieldShift::Alpha,
            1 => FieldShift::AlphaOnly,
            2 => FieldShift::NumericShift,
            3 => FieldShift::Numeric,
            4 => FieldShift::RightToLeft,
            5 => FieldShift::DigitsOnly,
            6 => FieldShift::MagneticStripe,
            _ => FieldShift::SignedNumeric,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            FieldShift::Alpha => 0,
            FieldShift::AlphaOnly => 1,
            FieldShift::NumericShift => 2,
            FieldShift::Numeric => 3,
            FieldShift::RightToLeft => 4,
            FieldShift::DigitsOnly => 5,
            FieldShift::MagneticStripe => 6,
            FieldShift::SignedNumeric => 7,
        }
    }
}

/// Mandatory fill / right adjust behaviour (FFW2 bits 2:0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldAdjust {
    None,
    RightAdjustZeroFill,
    RightAdjustBlankFill,
    MandatoryFill,
    /// Values 1..=4 carry no behaviour here but survive re-encoding
    Reserved(u8),
}

impl FieldAdjust {
    pub fn from_bits(bits: u8) -> Self {
        match bits & FFW2_ADJUST_MASK {
            0 => FieldAdjust::None,
            5 => FieldAdjust::RightAdjustZeroFill,
            6 => FieldAdjust::RightAdjustBlankFill,
            7 => FieldAdjust::MandatoryFill,
            other => FieldAdjust::Reserved(other),
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            FieldAdjust::None => 0,
            FieldAdjust::RightAdjustZeroFill => 5,
            FieldAdjust::RightAdjustBlankFill => 6,
            FieldAdjust::MandatoryFill => 7,
            FieldAdjust::Reserved(bits) => bits & FFW2_ADJUST_MASK,
        }
    }
}

/// Decoded field format words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldFormat {
    pub shift: FieldShift,
    pub bypass: bool,
    pub duplicate_enabled: bool,
    pub modified: bool,
    pub auto_enter: bool,
    pub field_exit_required: bool,
    pub monocase: bool,
    pub reserved: bool,
    pub mandatory_enter: bool,
    pub adjust: FieldAdjust,
}

impl Default for FieldFormat {
    fn default() -> Self {
        Self {
            shift: FieldShift::Alpha,
            bypass: false,
            duplicate_enabled: false,
            modified: false,
            auto_enter: false,
            field_exit_required: false,
            monocase: false,
            reserved: false,
            mandatory_enter: false,
            adjust: FieldAdjust::None,
        }
    }
}

impl FieldFormat {
    /// True when `byte` can start a field format word (bits 7:6 = 01).
    pub fn is_ffw(byte: u8) -> bool {
        byte & FFW1_MARKER_MASK == FFW1_MARKER
    }

    pub fn decode(ffw1: u8, ffw2: u8) -> Result<Self, ScreenError> {
        if !Self::is_ffw(ffw1) {
            return Err(ScreenError::InvalidFieldFormat { ffw1 });
        }
        Ok(Self {
            shift: FieldShift::from_bits(ffw1),
            bypass: ffw1 & FFW1_BYPASS != 0,
            duplicate_enabled: ffw1 & FFW1_DUP_ENABLE != 0,
            modified: ffw1 & FFW1_MDT != 0,
            auto_enter: ffw2 & FFW2_AUTO_ENTER != 0,
            field_exit_required: ffw2 & FFW2_FER != 0,
            monocase: ffw2 & FFW2_MONOCASE != 0,
            reserved: ffw2 & FFW2_RESERVED != 0,
            mandatory_enter: ffw2 & FFW2_MANDATORY_ENTER != 0,
            adjust: FieldAdjust::from_bits(ffw2),
        })
    }

    /// Bit-exact inverse of [`FieldFormat::decode`].
    pub fn encode(&self) -> (u8, u8) {
        let flag = |set: bool, bit: u8| if set { bit } else { 0 };
        let ffw1 = FFW1_MARKER
            | flag(self.bypass, FFW1_BYPASS)
            | flag(self.duplicate_enabled, FFW1_DUP_ENABLE)
            | flag(self.modified, FFW1_MDT)
            | self.shift.bits();
        let ffw2 = flag(self.auto_enter, FFW2_AUTO_ENTER)
            | flag(self.field_exit_required, FFW2_FER)
            | flag(self.monocase, FFW2_MONOCASE)
            | flag(self.reserved, FFW2_RESERVED)
            | flag(self.mandatory_enter, FFW2_MANDATORY_ENTER)
            | self.adjust.bits();
        (ffw1, ffw2)
    }
}

fn is_blank(ch: char) -> bool {
    ch == '\0' || ch == ' '
}

fn is_sign(ch: char) -> bool {
    ch == '+' || ch == '-'
}

/// One input field. Content is fixed-length; `'\0'` marks unused positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenField {
    start: usize,
    row: usize,
    col: usize,
    format: FieldFormat,
    attribute: u8,
    content: Vec<char>,
    modified: bool,
}

impl ScreenField {
    fn new(start: usize, cols: usize, format: FieldFormat, attribute: u8, length: usize) -> Self {
        Self {
            start,
            row: start / cols,
            col: start % cols,
            format,
            attribute,
            content: vec!['\0'; length],
            modified: format.modified,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    /// Last address of the field (inclusive).
    pub fn end(&self) -> usize {
        self.start + self.content.len() - 1
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn col(&self) -> usize {
        self.col
    }

    pub fn length(&self) -> usize {
        self.content.len()
    }

    pub fn format(&self) -> &FieldFormat {
        &self.format
    }

    pub fn attribute(&self) -> u8 {
        self.attribute
    }

    pub fn contains(&self, address: usize) -> bool {
        address >= self.start && address <= self.end()
    }

    pub fn offset_of(&self, address: usize) -> Option<usize> {
        self.contains(address).then(|| address - self.start)
    }

    pub fn is_bypass(&self) -> bool {
        self.format.bypass
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    /// Content is stored left to right; right-to-left fields render it reversed.
    pub fn renders_reversed(&self) -> bool {
        self.format.shift == FieldShift::RightToLeft
    }

    pub fn content(&self) -> &[char] {
        &self.content
    }

    pub fn char_at(&self, offset: usize) -> Option<char> {
        self.content.get(offset).copied()
    }

    /// Content with trailing nulls removed and inner nulls shown as blanks.
    pub fn text(&self) -> String {
        let used = self.content.iter().rposition(|&c| c != '\0').map_or(0, |i| i + 1);
        self.content[..used].iter().map(|&c| if c == '\0' { ' ' } else { c }).collect()
    }

    pub fn is_blank(&self) -> bool {
        self.content.iter().all(|&c| is_blank(c))
    }

    /// True when the last position holds data.
    pub fn is_full(&self) -> bool {
        self.content.last().is_some_and(|&c| c != '\0')
    }

    /// Apply the field's keyboard rules to `ch` typed at `offset`.
    /// Returns the character to store (upper-cased for monocase fields).
    pub fn validate_char(&self, offset: usize, ch: char) -> Result<char, FieldValidationError> {
        if self.format.bypass {
            return Err(FieldValidationError::Bypass);
        }
        let ch = if self.format.monocase { ch.to_uppercase().next().unwrap_or(ch) } else { ch };
        match self.format.shift {
            FieldShift::Alpha | FieldShift::NumericShift | FieldShift::RightToLeft => Ok(ch),
            FieldShift::AlphaOnly => {
                if ch.is_alphabetic() || matches!(ch, ' ' | ',' | '.' | '-') {
                    Ok(ch)
                } else {
                    Err(FieldValidationError::AlphaOnly(ch))
                }
            }
            FieldShift::Numeric => {
                if ch.is_ascii_digit() || is_sign(ch) {
                    Ok(ch)
                } else {
                    Err(FieldValidationError::NumericOnly(ch))
                }
            }
            FieldShift::DigitsOnly => {
                if ch.is_ascii_digit() {
                    Ok(ch)
                } else {
                    Err(FieldValidationError::DigitsOnly(ch))
                }
            }
            FieldShift::SignedNumeric => {
                if ch.is_ascii_digit() {
                    Ok(ch)
                } else if is_sign(ch) {
                    let other_sign = self
                        .content
                        .iter()
                        .enumerate()
                        .any(|(i, &c)| i != offset && is_sign(c));
                    if offset == 0 && !other_sign {
                        Ok(ch)
                    } else {
                        Err(FieldValidationError::SignPosition(ch))
                    }
                } else {
                    Err(FieldValidationError::NumericOnly(ch))
                }
            }
            FieldShift::MagneticStripe => Err(FieldValidationError::DataNotAllowed),
        }
    }

    /// Store `ch` at `offset`, replacing what was there. Out-of-range offsets are ignored.
    pub fn put_char(&mut self, offset: usize, ch: char) {
        if let Some(slot) = self.content.get_mut(offset) {
            *slot = ch;
        }
    }

    /// Insert `ch` at `offset`, shifting the rest right. Fails when the last
    /// position is already occupied.
    pub fn insert_char(&mut self, offset: usize, ch: char) -> Result<(), FieldValidationError> {
        if offset >= self.content.len() {
            return Err(FieldValidationError::NoRoom);
        }
        if self.is_full() {
            return Err(FieldValidationError::NoRoom);
        }
        self.content.pop();
        self.content.insert(offset, ch);
        Ok(())
    }

    /// Remove the character at `offset`, shifting the rest left and nulling the last cell.
    pub fn delete_char(&mut self, offset: usize) {
        if offset < self.content.len() {
            self.content.remove(offset);
            self.content.push('\0');
        }
    }

    /// Null everything from `offset` to the end.
    pub fn erase_from(&mut self, offset: usize) {
        if offset < self.content.len() {
            self.content[offset..].fill('\0');
        }
    }

    pub fn clear(&mut self) {
        self.content.fill('\0');
    }

    /// Right-justify the data per the adjust setting. Returns true if content moved.
    pub fn right_adjust(&mut self) -> bool {
        let fill = match self.format.adjust {
            FieldAdjust::RightAdjustZeroFill => '0',
            FieldAdjust::RightAdjustBlankFill => ' ',
            _ => return false,
        };
        let data: Vec<char> = self.content.iter().copied().filter(|&c| c != '\0').collect();
        let pad = self.content.len() - data.len();
        self.content = std::iter::repeat(fill).take(pad).chain(data).collect();
        true
    }
}

/// Format table: non-overlapping fields keyed by start address
#[derive(Debug, Clone)]
pub struct FieldTable {
    rows: usize,
    cols: usize,
    fields: BTreeMap<usize, ScreenField>,
    /// Bumped whenever fields are added, removed or cleared
    revision: u64,
}

impl FieldTable {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols, fields: BTreeMap::new(), revision: 0 }
    }

    /// Forget all fields and adopt a new geometry.
    pub fn resize(&mut self, rows: usize, cols: usize) {
        self.rows = rows;
        self.cols = cols;
        self.clear();
    }

    pub fn clear(&mut self) {
        self.fields.clear();
        self.revision += 1;
    }

    /// Changes whenever the set of fields changes; content edits do not count.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Define a field from raw format words with the default attribute.
    /// Returns the fields it displaced.
    pub fn define_field(
        &mut self,
        position: usize,
        ffw1: u8,
        ffw2: u8,
        length: usize,
    ) -> Result<Vec<ScreenField>, ScreenError> {
        let format = FieldFormat::decode(ffw1, ffw2)?;
        self.insert_field(position, format, ATTR_5250_NORMAL, length)
    }

    /// Define a field from an already decoded format. Any field overlapping
    /// `position..position + length` is removed and returned so the caller
    /// can clear its cells.
    pub fn insert_field(
        &mut self,
        position: usize,
        format: FieldFormat,
        attribute: u8,
        length: usize,
    ) -> Result<Vec<ScreenField>, ScreenError> {
        if length == 0 {
            return Err(ScreenError::EmptyField { start: position });
        }
        let size = self.rows * self.cols;
        if position >= size || position + length > size {
            return Err(ScreenError::FieldPastEnd { start: position, length, size });
        }
        let displaced = self.remove_overlapping(position, length);
        self.fields
            .insert(position, ScreenField::new(position, self.cols, format, attribute, length));
        Ok(displaced)
    }

    /// Remove and return every field sharing a cell with `position..position + length`.
    pub fn remove_overlapping(&mut self, position: usize, length: usize) -> Vec<ScreenField> {
        if length == 0 {
            return Vec::new();
        }
        let end = position + length - 1;
        let overlapping: Vec<usize> = self
            .fields
            .values()
            .filter(|f| f.start() <= end && f.end() >= position)
            .map(ScreenField::start)
            .collect();
        self.revision += 1;
        overlapping
            .into_iter()
            .filter_map(|start| self.fields.remove(&start))
            .collect()
    }

    pub fn get(&self, start: usize) -> Option<&ScreenField> {
        self.fields.get(&start)
    }

    pub fn get_mut(&mut self, start: usize) -> Option<&mut ScreenField> {
        self.fields.get_mut(&start)
    }

    pub fn field_at(&self, row: usize, col: usize) -> Option<&ScreenField> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.field_containing(row * self.cols + col)
    }

    pub fn field_containing(&self, address: usize) -> Option<&ScreenField> {
        self.fields
            .range(..=address)
            .next_back()
            .map(|(_, field)| field)
            .filter(|field| field.contains(address))
    }

    pub fn field_containing_mut(&mut self, address: usize) -> Option<&mut ScreenField> {
        self.fields
            .range_mut(..=address)
            .next_back()
            .map(|(_, field)| field)
            .filter(|field| field.contains(address))
    }

    /// Fields in ascending address order. Clone the iterator to restart it.
    pub fn fields_in_order(&self) -> Values<'_, usize, ScreenField> {
        self.fields.values()
    }

    pub fn input_fields(&self) -> impl Iterator<Item = &ScreenField> + '_ {
        self.fields.values().filter(|f| !f.is_bypass())
    }

    pub fn modified_fields(&self) -> impl Iterator<Item = &ScreenField> + '_ {
        self.fields.values().filter(|f| f.is_modified())
    }

    pub fn first_input_field(&self) -> Option<&ScreenField> {
        self.input_fields().next()
    }

    /// Next non-bypass field after `position`, wrapping to the first one.
    pub fn advance_to_next_field(&self, position: usize) -> Option<&ScreenField> {
        self.fields
            .range((Excluded(position), Unbounded))
            .map(|(_, field)| field)
            .find(|f| !f.is_bypass())
            .or_else(|| self.first_input_field())
    }

    /// Previous non-bypass field before the one holding `position`, wrapping to the last one.
    pub fn previous_field(&self, position: usize) -> Option<&ScreenField> {
        let current = self.field_containing(position).map_or(position, ScreenField::start);
        self.fields
            .range(..current)
            .rev()
            .map(|(_, field)| field)
            .find(|f| !f.is_bypass())
            .or_else(|| self.fields.values().rev().find(|f| !f.is_bypass()))
    }

    /// Clear the MDT flag of non-bypass fields, or of every field.
    pub fn reset_mdt(&mut self, include_bypass: bool) {
        for field in self.fields.values_mut() {
            if include_bypass || !field.is_bypass() {
                field.set_modified(false);
            }
        }
    }

    /// Null the content of non-bypass fields (only modified ones if asked).
    /// Returns the start addresses of the fields that were nulled.
    pub fn null_fields(&mut self, only_modified: bool) -> Vec<usize> {
        let mut nulled = Vec::new();
        for field in self.fields.values_mut() {
            if !field.is_bypass() && (!only_modified || field.is_modified()) {
                field.clear();
                nulled.push(field.start());
            }
        }
        nulled
    }
}
