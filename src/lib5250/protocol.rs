//! 5250 data stream decoding
//!
//! A host record is a GDS header followed by a sequence of `ESC command`
//! orders. [`OrderDecoder`] applies them one at a time to a [`ScreenState`]
//! (screen buffer, format table and OIA) and hands back an immutable
//! [`DecodedOrder`] describing what it did, including any reply record the
//! host expects. Outbound records (AID replies, query replies) are built
//! with [`build_record`].

use std::sync::Arc;

use crate::error::{CharacterConversionError, DecodeErrorKind, ScreenError, StreamDecodeError};
use crate::lib5250::codes::*;
use crate::lib5250::display::{ScreenBuffer, ScreenCell};
use crate::lib5250::field::{FieldFormat, FieldTable};
use crate::lib5250::oia::{LockReason, Oia};
use crate::lib5250::stream::StreamCursor;
use crate::protocol_common::traits::CodePageConverter;

/// Size of the fixed GDS header on every 5250 record
pub const RECORD_HEADER_LEN: usize = 10;

/// Geometry selected by Clear Unit
pub const PRIMARY_SIZE: (usize, usize) = (24, 80);
/// Geometry selected by Clear Unit Alternate
pub const ALTERNATE_SIZE: (usize, usize) = (27, 132);

/// GDS record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub length: usize,
    pub flags: u8,
    pub opcode: u8,
    /// Offset of the first data byte
    pub data_offset: usize,
}

impl RecordHeader {
    pub fn parse(record: &[u8]) -> Result<Self, StreamDecodeError> {
        let mut cursor = StreamCursor::new(record);
        let truncated = |e| StreamDecodeError::new(0, 0, e);
        let length = cursor.read_u16_be().map_err(truncated)? as usize;
        let record_type = cursor.read_u16_be().map_err(truncated)?;
        cursor.skip(2).map_err(truncated)?;
        let var_len = cursor.next_byte().map_err(truncated)? as usize;
        let flags = cursor.next_byte().map_err(truncated)?;
        cursor.skip(1).map_err(truncated)?;
        let opcode = cursor.next_byte().map_err(truncated)?;

        let invalid = |reason| StreamDecodeError::new(0, 0, DecodeErrorKind::InvalidRecord(reason));
        if length != record.len() {
            return Err(invalid("declared length does not match record"));
        }
        if record_type != RECORD_TYPE_GDS {
            return Err(invalid("not a GDS record"));
        }
        if var_len < RECORD_VARIABLE_HEADER_LEN as usize || 6 + var_len > record.len() {
            return Err(invalid("variable header length"));
        }
        Ok(Self { length, flags, opcode, data_offset: 6 + var_len })
    }
}

/// Wrap `data` in a GDS header.
pub fn build_record(flags: u8, opcode: u8, data: &[u8]) -> Vec<u8> {
    let length = (RECORD_HEADER_LEN + data.len()) as u16;
    let [type_hi, type_lo] = RECORD_TYPE_GDS.to_be_bytes();
    let mut record = Vec::with_capacity(RECORD_HEADER_LEN + data.len());
    record.extend_from_slice(&length.to_be_bytes());
    record.extend_from_slice(&[type_hi, type_lo, 0x00, 0x00]);
    record.extend_from_slice(&[RECORD_VARIABLE_HEADER_LEN, flags, 0x00, opcode]);
    record.extend_from_slice(data);
    record
}

/// Which fields an inbound reply carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSelection {
    /// Cursor and AID only
    None,
    /// Fields with MDT set
    Modified,
    /// Every non-bypass field
    AllInput,
}

/// Screen, format table and OIA of one session
#[derive(Debug, Clone)]
pub struct ScreenState {
    pub buffer: ScreenBuffer,
    pub fields: FieldTable,
    pub oia: Oia,
    /// Read command awaiting an AID, if any
    pub read_command: Option<u8>,
}

impl ScreenState {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            buffer: ScreenBuffer::new(rows, cols),
            fields: FieldTable::new(rows, cols),
            oia: Oia::new(),
            read_command: None,
        }
    }

    /// Write a character cell and keep the content of the field holding it in step.
    pub fn write_char(
        &mut self,
        address: usize,
        ch: char,
        attribute: u8,
    ) -> Result<(), crate::error::ScreenError> {
        self.buffer.write_at(address, ScreenCell::new(ch, attribute))?;
        if let Some(field) = self.fields.field_containing_mut(address) {
            let offset = address - field.start();
            field.put_char(offset, ch);
        }
        Ok(())
    }

    /// Redraw the cells of the field starting at `start` from its content.
    pub fn refresh_field(&mut self, start: usize) {
        let Some(field) = self.fields.get(start) else {
            return;
        };
        let attribute = field.attribute();
        for (offset, &ch) in field.content().iter().enumerate() {
            if self.buffer.write_at(start + offset, ScreenCell::new(ch, attribute)).is_err() {
                break;
            }
        }
    }

    /// Null cells `start..=end` and the matching field content.
    pub fn erase(&mut self, start: usize, end: usize) -> Result<(), crate::error::ScreenError> {
        self.buffer.erase_region(start, end)?;
        let starts: Vec<usize> = self
            .fields
            .fields_in_order()
            .filter(|f| f.start() <= end && f.end() >= start)
            .map(|f| f.start())
            .collect();
        for field_start in starts {
            if let Some(field) = self.fields.get_mut(field_start) {
                let from = start.saturating_sub(field_start);
                let to = (end - field_start).min(field.length() - 1);
                for offset in from..=to {
                    field.put_char(offset, '\0');
                }
            }
        }
        Ok(())
    }

    /// Clear Unit: new geometry, empty screen and format table, keyboard locked.
    pub fn clear_unit(&mut self, rows: usize, cols: usize) {
        self.buffer.resize(rows, cols);
        self.fields.resize(rows, cols);
        self.read_command = None;
        self.oia.lock(LockReason::HostOutput);
    }

    pub fn clear_format_table(&mut self) {
        self.fields.clear();
        self.read_command = None;
        self.oia.lock(LockReason::HostOutput);
    }

    /// Inbound payload: cursor, AID and the selected fields as SBA + EBCDIC text.
    /// Fails on the first character the code page cannot encode.
    pub fn field_response(
        &self,
        aid: u8,
        selection: FieldSelection,
        converter: &dyn CodePageConverter,
    ) -> Result<Vec<u8>, CharacterConversionError> {
        let (row, col) = self.buffer.cursor();
        let mut payload = vec![row as u8 + 1, col as u8 + 1, aid];
        for field in self.fields.input_fields() {
            let send = match selection {
                FieldSelection::None => false,
                FieldSelection::Modified => field.is_modified(),
                FieldSelection::AllInput => true,
            };
            if !send {
                continue;
            }
            payload.extend_from_slice(&[SBA, field.row() as u8 + 1, field.col() as u8 + 1]);
            let content = field.content();
            let used = content.iter().rposition(|&c| c != '\0').map_or(0, |i| i + 1);
            for &ch in &content[..used] {
                payload.push(encode_cell(converter, ch)?);
            }
        }
        Ok(payload)
    }

    /// Every cell as EBCDIC; attribute cells carry their attribute byte.
    pub fn screen_image(&self, converter: &dyn CodePageConverter) -> Result<Vec<u8>, CharacterConversionError> {
        (0..self.buffer.size())
            .filter_map(|address| self.buffer.cell_at(address).ok())
            .map(|cell| {
                if cell.is_attribute_marker() {
                    Ok(cell.attribute)
                } else {
                    encode_cell(converter, cell.ch)
                }
            })
            .collect()
    }
}

/// Null cells go out as 0x00; anything else must exist in the code page.
fn encode_cell(converter: &dyn CodePageConverter, ch: char) -> Result<u8, CharacterConversionError> {
    if ch == '\0' {
        return Ok(0x00);
    }
    converter.to_ebcdic(ch)
}

/// Effect of one decoded command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedOrder {
    ClearUnit { rows: usize, cols: usize },
    ClearFormatTable,
    WriteToDisplay { cc1: u8, cc2: u8 },
    WriteErrorCode { message: String },
    /// Read Input Fields or Read MDT Fields; the keyboard is now unlocked
    ReadFields { command: u8 },
    ReadImmediate { reply: Vec<u8> },
    ReadScreen { reply: Vec<u8> },
    Roll { top: usize, bottom: usize, lines: isize },
    StructuredFields { replies: Vec<Vec<u8>> },
}

impl DecodedOrder {
    /// Reply records the host expects for this command.
    pub fn replies(&self) -> &[Vec<u8>] {
        match self {
            DecodedOrder::ReadImmediate { reply } | DecodedOrder::ReadScreen { reply } => {
                std::slice::from_ref(reply)
            }
            DecodedOrder::StructuredFields { replies } => replies,
            _ => &[],
        }
    }
}

/// All commands of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    pub header: RecordHeader,
    pub orders: Vec<DecodedOrder>,
}

impl DecodedRecord {
    pub fn replies(&self) -> impl Iterator<Item = &Vec<u8>> + '_ {
        self.orders.iter().flat_map(DecodedOrder::replies)
    }
}

/// Applies 5250 orders to a [`ScreenState`]
pub struct OrderDecoder {
    converter: Arc<dyn CodePageConverter>,
    terminal_type: String,
    /// Current write address within a Write To Display
    address: usize,
    attribute: u8,
    pending_insert_cursor: Option<usize>,
    faults: Vec<CharacterConversionError>,
}

impl std::fmt::Debug for OrderDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderDecoder")
            .field("code_page", &self.converter.name())
            .field("address", &self.address)
            .field("faults", &self.faults.len())
            .finish()
    }
}

impl OrderDecoder {
    pub fn new(converter: Arc<dyn CodePageConverter>, terminal_type: impl Into<String>) -> Self {
        Self {
            converter,
            terminal_type: terminal_type.into(),
            address: 0,
            attribute: ATTR_5250_NORMAL,
            pending_insert_cursor: None,
            faults: Vec::new(),
        }
    }

    /// Conversion failures recorded since the last call.
    pub fn take_faults(&mut self) -> Vec<CharacterConversionError> {
        std::mem::take(&mut self.faults)
    }

    /// Decode every command of a complete record (header included).
    pub fn decode_record(
        &mut self,
        record: &[u8],
        screen: &mut ScreenState,
    ) -> Result<DecodedRecord, StreamDecodeError> {
        let header = RecordHeader::parse(record)?;
        log::trace!("record opcode 0x{:02X}, {} bytes", header.opcode, header.length);
        match header.opcode {
            OPCODE_MESSAGE_LIGHT_ON => screen.oia.set_message_waiting(true),
            OPCODE_MESSAGE_LIGHT_OFF => screen.oia.set_message_waiting(false),
            OPCODE_SAVE_SCREEN | OPCODE_RESTORE_SCREEN => {
                log::debug!("ignoring save/restore opcode 0x{:02X}", header.opcode)
            }
            _ => {}
        }

        let mut cursor = StreamCursor::at(record, header.data_offset);
        let mut orders = Vec::new();
        while cursor.has_more() {
            orders.push(self.decode_order(&mut cursor, screen)?);
        }
        Ok(DecodedRecord { header, orders })
    }

    /// Decode one `ESC command ...` sequence, leaving `cursor` on the next
    /// escape or at the end of the data.
    pub fn decode_order(
        &mut self,
        cursor: &mut StreamCursor<'_>,
        screen: &mut ScreenState,
    ) -> Result<DecodedOrder, StreamDecodeError> {
        let offset = cursor.position();
        let escape = cursor.next_byte().map_err(|e| StreamDecodeError::new(0, offset, e))?;
        if escape != ESC {
            return Err(StreamDecodeError::new(escape, offset, DecodeErrorKind::MissingEscape(escape)));
        }
        let command = cursor.next_byte().map_err(|e| StreamDecodeError::new(ESC, offset, e))?;
        let fail = |kind: DecodeErrorKind| StreamDecodeError::new(command, offset, kind);
        log::trace!("command 0x{command:02X} at offset {offset}");

        match command {
            CMD_CLEAR_UNIT => {
                let (rows, cols) = PRIMARY_SIZE;
                screen.clear_unit(rows, cols);
                Ok(DecodedOrder::ClearUnit { rows, cols })
            }
            CMD_CLEAR_UNIT_ALTERNATE => {
                let parameter = cursor.next_byte().map_err(|e| fail(e.into()))?;
                if parameter != 0x00 && parameter != 0x80 {
                    return Err(fail(DecodeErrorKind::InvalidRecord("clear unit alternate parameter")));
                }
                let (rows, cols) = ALTERNATE_SIZE;
                screen.clear_unit(rows, cols);
                Ok(DecodedOrder::ClearUnit { rows, cols })
            }
            CMD_CLEAR_FORMAT_TABLE => {
                screen.clear_format_table();
                Ok(DecodedOrder::ClearFormatTable)
            }
            CMD_WRITE_TO_DISPLAY => self.write_to_display(cursor, screen),
            CMD_WRITE_ERROR_CODE => self.write_error_code(cursor, screen),
            CMD_READ_INPUT_FIELDS | CMD_READ_MDT_FIELDS | CMD_READ_MDT_FIELDS_ALT => {
                let _cc1 = cursor.next_byte().map_err(|e| fail(e.into()))?;
                let cc2 = cursor.next_byte().map_err(|e| fail(e.into()))?;
                apply_indicators(screen, cc2);
                screen.read_command = Some(command);
                screen.oia.unlock();
                Ok(DecodedOrder::ReadFields { command })
            }
            CMD_READ_IMMEDIATE => {
                let payload = screen
                    .field_response(AID_NONE, FieldSelection::AllInput, self.converter.as_ref())
                    .map_err(|e| fail(e.into()))?;
                Ok(DecodedOrder::ReadImmediate { reply: build_record(0, OPCODE_NO_OP, &payload) })
            }
            CMD_READ_SCREEN_IMMEDIATE => {
                let image = screen.screen_image(self.converter.as_ref()).map_err(|e| fail(e.into()))?;
                Ok(DecodedOrder::ReadScreen { reply: build_record(0, OPCODE_NO_OP, &image) })
            }
            CMD_ROLL => {
                let control = cursor.next_byte().map_err(|e| fail(e.into()))?;
                let top = cursor.next_byte().map_err(|e| fail(e.into()))? as usize;
                let bottom = cursor.next_byte().map_err(|e| fail(e.into()))? as usize;
                if top == 0 || top > bottom || bottom > screen.buffer.rows() {
                    return Err(fail(DecodeErrorKind::InvalidRollParameter));
                }
                let count = (control & 0x1F) as isize;
                let lines = if control & 0x80 != 0 { count } else { -count };
                screen.buffer.roll(top - 1, bottom - 1, lines).map_err(|e| fail(e.into()))?;
                Ok(DecodedOrder::Roll { top: top - 1, bottom: bottom - 1, lines })
            }
            CMD_WRITE_STRUCTURED_FIELD => self.write_structured_field(cursor, command, offset),
            other => {
                log::debug!("unsupported command 0x{other:02X}");
                Err(fail(DecodeErrorKind::UnknownCommand(other)))
            }
        }
    }

    fn write_to_display(
        &mut self,
        cursor: &mut StreamCursor<'_>,
        screen: &mut ScreenState,
    ) -> Result<DecodedOrder, StreamDecodeError> {
        let offset = cursor.position();
        let cc1 = cursor
            .next_byte()
            .map_err(|e| StreamDecodeError::new(CMD_WRITE_TO_DISPLAY, offset, e))?;
        let cc2 = cursor
            .next_byte()
            .map_err(|e| StreamDecodeError::new(CMD_WRITE_TO_DISPLAY, offset, e))?;

        apply_cc1(screen, cc1);
        self.address = screen.buffer.cursor_address();
        self.pending_insert_cursor = None;

        while cursor.has_more() {
            if cursor.peek().map_err(|e| StreamDecodeError::new(0, cursor.position(), e))? == ESC {
                break;
            }
            self.decode_wtd_order(cursor, screen)?;
        }

        apply_indicators(screen, cc2);
        let unlocked = cc2 & (CC2_UNLOCK | CC2_IC_UNLOCK) != 0;
        if unlocked {
            screen.oia.unlock();
        }
        if let Some(address) = self.pending_insert_cursor.take() {
            let _ = screen.buffer.set_cursor_address(address);
        } else if unlocked {
            if let Some(start) = screen.fields.first_input_field().map(|f| f.start()) {
                let _ = screen.buffer.set_cursor_address(start);
            }
        }
        Ok(DecodedOrder::WriteToDisplay { cc1, cc2 })
    }

    fn decode_wtd_order(
        &mut self,
        cursor: &mut StreamCursor<'_>,
        screen: &mut ScreenState,
    ) -> Result<(), StreamDecodeError> {
        let offset = cursor.position();
        let order = cursor.next_byte().map_err(|e| StreamDecodeError::new(0, offset, e))?;
        let fail = |kind: DecodeErrorKind| StreamDecodeError::new(order, offset, kind);

        match order {
            SOH => {
                let length = cursor.next_byte().map_err(|e| fail(e.into()))?;
                if length == 0 || length > 7 {
                    return Err(fail(DecodeErrorKind::InvalidHeaderLength(length)));
                }
                let header = cursor.take(length as usize).map_err(|e| fail(e.into()))?;
                if let Some(&error_row) = header.get(3) {
                    log::trace!("start of header, error row {error_row}");
                }
                screen.clear_format_table();
            }
            RA => {
                let target = self.read_address(cursor, screen).map_err(fail)?;
                let byte = cursor.next_byte().map_err(|e| fail(e.into()))?;
                if target < self.address {
                    return Err(fail(DecodeErrorKind::RepeatBeforeCurrent {
                        target,
                        current: self.address,
                    }));
                }
                if let Some(ch) = self.convert(byte) {
                    for address in self.address..=target {
                        screen.write_char(address, ch, self.attribute).map_err(|e| fail(e.into()))?;
                    }
                }
                self.address = target + 1;
            }
            EA => {
                let target = self.read_address(cursor, screen).map_err(fail)?;
                let length = cursor.next_byte().map_err(|e| fail(e.into()))?;
                if !(2..=5).contains(&length) {
                    return Err(fail(DecodeErrorKind::InvalidHeaderLength(length)));
                }
                cursor.skip(length as usize - 1).map_err(|e| fail(e.into()))?;
                if target < self.address {
                    return Err(fail(DecodeErrorKind::EraseBeforeCurrent {
                        target,
                        current: self.address,
                    }));
                }
                screen.erase(self.address, target).map_err(|e| fail(e.into()))?;
                self.address = target + 1;
            }
            SBA => {
                self.address = self.read_address(cursor, screen).map_err(fail)?;
            }
            IC => {
                self.pending_insert_cursor = Some(self.read_address(cursor, screen).map_err(fail)?);
            }
            MC => {
                let address = self.read_address(cursor, screen).map_err(fail)?;
                screen.buffer.set_cursor_address(address).map_err(|e| fail(e.into()))?;
            }
            SF => self.start_of_field(cursor, screen).map_err(fail)?,
            attribute if is_attribute(attribute) => {
                if self.address >= screen.buffer.size() {
                    return Err(fail(DecodeErrorKind::WritePastEnd { address: self.address }));
                }
                screen
                    .buffer
                    .write_at(self.address, ScreenCell::attribute_marker(attribute))
                    .map_err(|e| fail(e.into()))?;
                self.attribute = attribute;
                self.address += 1;
            }
            0x00 | 0x40..=0xFE => {
                if self.address >= screen.buffer.size() {
                    return Err(fail(DecodeErrorKind::WritePastEnd { address: self.address }));
                }
                if let Some(ch) = self.convert(order) {
                    screen.write_char(self.address, ch, self.attribute).map_err(|e| fail(e.into()))?;
                }
                self.address += 1;
            }
            other => return Err(fail(DecodeErrorKind::UnknownOrder(other))),
        }
        Ok(())
    }

    /// Read a 1-based (row, col) pair and return its linear address.
    fn read_address(
        &self,
        cursor: &mut StreamCursor<'_>,
        screen: &ScreenState,
    ) -> Result<usize, DecodeErrorKind> {
        let row = cursor.next_byte()?;
        let col = cursor.next_byte()?;
        let (rows, cols) = (screen.buffer.rows(), screen.buffer.cols());
        if row == 0 || col == 0 || row as usize > rows || col as usize > cols {
            return Err(DecodeErrorKind::InvalidAddress { row, col });
        }
        Ok((row as usize - 1) * cols + (col as usize - 1))
    }

    fn start_of_field(
        &mut self,
        cursor: &mut StreamCursor<'_>,
        screen: &mut ScreenState,
    ) -> Result<(), DecodeErrorKind> {
        let format = if FieldFormat::is_ffw(cursor.peek()?) {
            let ffw1 = cursor.next_byte()?;
            let ffw2 = cursor.next_byte()?;
            let format = FieldFormat::decode(ffw1, ffw2)?;
            // Field control words precede the attribute.
            while !is_attribute(cursor.peek()?) {
                cursor.skip(2)?;
            }
            Some(format)
        } else {
            None
        };

        let attribute = cursor.next_byte()?;
        if !is_attribute(attribute) {
            return Err(DecodeErrorKind::InvalidFieldAttribute(attribute));
        }
        let length = cursor.read_u16_be()? as usize;

        let attribute_address = self.address;
        if attribute_address >= screen.buffer.size() {
            return Err(DecodeErrorKind::WritePastEnd { address: attribute_address });
        }
        let start = attribute_address + 1;

        let displaced = match format {
            Some(format) => screen.fields.insert_field(start, format, attribute, length)?,
            None => {
                // Output-only field: nothing to enter, but it still claims its cells.
                let size = screen.buffer.size();
                if start + length > size {
                    return Err(ScreenError::FieldPastEnd { start, length, size }.into());
                }
                screen.fields.remove_overlapping(start, length)
            }
        };
        for field in displaced {
            log::trace!("field at {} replaced by field at {start}", field.start());
            screen.buffer.erase_region(field.start(), field.end())?;
        }
        if format.is_some() {
            // Existing cells become the initial content.
            if let Some(field) = screen.fields.get_mut(start) {
                for offset in 0..field.length() {
                    if let Ok(cell) = screen.buffer.cell_at(start + offset) {
                        if !cell.is_attribute_marker() {
                            field.put_char(offset, cell.ch);
                        }
                    }
                }
            }
        }
        screen.buffer.write_at(attribute_address, ScreenCell::attribute_marker(attribute))?;
        self.attribute = attribute;
        self.address = start;
        Ok(())
    }

    fn write_error_code(
        &mut self,
        cursor: &mut StreamCursor<'_>,
        screen: &mut ScreenState,
    ) -> Result<DecodedOrder, StreamDecodeError> {
        let mut message = String::new();
        while cursor.has_more() {
            let offset = cursor.position();
            let byte = cursor.next_byte().map_err(|e| StreamDecodeError::new(0, offset, e))?;
            if byte == ESC {
                cursor
                    .step_back()
                    .map_err(|e| StreamDecodeError::new(CMD_WRITE_ERROR_CODE, offset, e))?;
                break;
            }
            if byte == 0x00 || is_attribute(byte) {
                continue;
            }
            if let Some(ch) = self.convert(byte) {
                message.push(ch);
            }
        }
        let message = message.trim().to_string();
        log::debug!("host error: {message}");
        screen.oia.host_error(message.clone());
        Ok(DecodedOrder::WriteErrorCode { message })
    }

    fn write_structured_field(
        &mut self,
        cursor: &mut StreamCursor<'_>,
        command: u8,
        command_offset: usize,
    ) -> Result<DecodedOrder, StreamDecodeError> {
        let mut replies = Vec::new();
        loop {
            let offset = cursor.position();
            let fail = |kind: DecodeErrorKind| StreamDecodeError::new(command, offset, kind);
            let declared = cursor.read_u16_be().map_err(|e| fail(e.into()))? as usize;
            let available = cursor.remaining() + 2;
            if declared < 4 || declared > available {
                return Err(fail(DecodeErrorKind::StructuredFieldLength { declared, available }));
            }
            let body = cursor.take(declared - 2).map_err(|e| fail(e.into()))?;
            let (class, sf_type) = (body[0], body[1]);
            match (class, sf_type) {
                (SF_CLASS_5250, SF_5250_QUERY) | (SF_CLASS_5250, SF_5250_QUERY_STATION_STATE) => {
                    log::debug!("5250 query (type 0x{sf_type:02X}), sending query reply");
                    let reply = self.query_reply().map_err(|e| fail(e.into()))?;
                    replies.push(build_record(0, OPCODE_NO_OP, &reply));
                }
                _ => log::debug!(
                    "skipping structured field class 0x{class:02X} type 0x{sf_type:02X} ({declared} bytes)"
                ),
            }
            match cursor.peek() {
                Ok(ESC) | Err(_) => break,
                Ok(_) => continue,
            }
        }
        log::trace!("structured fields at offset {command_offset} produced {} replies", replies.len());
        Ok(DecodedOrder::StructuredFields { replies })
    }

    /// 5250 query reply payload advertising the configured device type.
    pub fn query_reply(&self) -> Result<Vec<u8>, CharacterConversionError> {
        let (device, model) = device_type_and_model(&self.terminal_type);
        let ebcdic = |text: String| -> Result<Vec<u8>, CharacterConversionError> {
            text.chars().map(|ch| self.converter.to_ebcdic(ch)).collect()
        };

        let mut body = vec![SF_CLASS_5250, SF_5250_QUERY, 0x80];
        body.extend_from_slice(&[0x06, 0x00]); // controller hardware class
        body.extend_from_slice(&[0x01, 0x01, 0x00]); // controller code level
        body.extend_from_slice(&[0x00; 16]);
        body.push(0x01); // display emulation
        body.extend(ebcdic(device)?);
        body.extend(ebcdic(model)?);
        body.extend_from_slice(&[0x02, 0x00, 0x00]); // keyboard
        body.extend_from_slice(&[0x00, 0x61, 0x50, 0x00]); // serial number
        body.extend_from_slice(&[0xFF, 0xFF]); // maximum input fields
        body.extend_from_slice(&[0x00, 0x00, 0x00]);
        body.extend_from_slice(&[0x23, 0x31, 0x00, 0x00]); // capabilities
        body.extend_from_slice(&[0x00; 8]);

        let length = (body.len() + 2) as u16;
        let mut payload = vec![0x00, 0x00, AID_INBOUND_WSF];
        payload.extend_from_slice(&length.to_be_bytes());
        payload.extend(body);
        Ok(payload)
    }

    fn convert(&mut self, byte: u8) -> Option<char> {
        match self.converter.to_unicode(byte) {
            Ok(ch) => Some(ch),
            Err(err) => {
                log::debug!("{err}; cell left unchanged");
                self.faults.push(err);
                None
            }
        }
    }
}

/// Split `IBM-3179-2` into a four character device type and a three character model.
fn device_type_and_model(terminal_type: &str) -> (String, String) {
    let mut parts = terminal_type.trim_start_matches("IBM-").splitn(2, '-');
    let device: String = parts.next().unwrap_or_default().chars().take(4).collect();
    let model: String = parts.next().unwrap_or_default().chars().take(3).collect();
    let device = format!("{device:0>4}");
    let model = if model.chars().all(|c| c.is_ascii_digit()) {
        format!("{model:0>3}")
    } else {
        format!("{:<3}", model.to_ascii_uppercase())
    };
    (device, model)
}

/// CC1 bits 7:5: keyboard lock plus MDT reset and field nulling.
fn apply_cc1(screen: &mut ScreenState, cc1: u8) {
    let action = cc1 & 0xE0;
    if action == 0 {
        return;
    }
    screen.oia.lock(LockReason::HostOutput);
    let nulled = match action {
        0x40 => {
            screen.fields.reset_mdt(false);
            Vec::new()
        }
        0x60 => {
            screen.fields.reset_mdt(true);
            Vec::new()
        }
        0x80 => screen.fields.null_fields(true),
        0xA0 => {
            screen.fields.reset_mdt(false);
            screen.fields.null_fields(false)
        }
        0xC0 => {
            let nulled = screen.fields.null_fields(true);
            screen.fields.reset_mdt(false);
            nulled
        }
        _ => {
            screen.fields.reset_mdt(true);
            screen.fields.null_fields(false)
        }
    };
    for start in nulled {
        screen.refresh_field(start);
    }
}

/// CC2 indicator bits other than unlock.
fn apply_indicators(screen: &mut ScreenState, cc2: u8) {
    if cc2 & CC2_ALARM != 0 {
        screen.oia.sound_bell();
    }
    if cc2 & CC2_MESSAGE_ON != 0 {
        screen.oia.set_message_waiting(true);
    } else if cc2 & CC2_MESSAGE_OFF != 0 {
        screen.oia.set_message_waiting(false);
    }
    // Cursor blink belongs to the renderer.
    if cc2 & (CC2_SET_BLINK | CC2_CLEAR_BLINK) != 0 {
        log::trace!("cursor blink {}", if cc2 & CC2_SET_BLINK != 0 { "on" } else { "off" });
    }
}
