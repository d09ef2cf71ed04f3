//! Bounds-checked cursor over one 5250 record.
//!
//! Every read is checked against the buffer: a read at `position == len` is
//! an error, never a silent zero. Reads that fail do not move the cursor.

use crate::error::BufferExhausted;

/// Read position over a borrowed byte slice.
///
/// Invariant: `0 <= position <= buffer.len()`.
#[derive(Debug, Clone)]
pub struct StreamCursor<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> StreamCursor<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Cursor that starts at `position`, clamped to the buffer length.
    pub fn at(buffer: &'a [u8], position: usize) -> Self {
        Self { buffer, position: position.min(buffer.len()) }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    /// True while at least one byte is left to read.
    pub fn has_more(&self) -> bool {
        self.position < self.buffer.len()
    }

    fn exhausted(&self, index: isize) -> BufferExhausted {
        BufferExhausted { index, length: self.buffer.len() }
    }

    /// Reads the byte at the current position and advances.
    pub fn next_byte(&mut self) -> Result<u8, BufferExhausted> {
        match self.buffer.get(self.position) {
            Some(&byte) => {
                self.position += 1;
                Ok(byte)
            }
            None => Err(self.exhausted(self.position as isize)),
        }
    }

    /// Looks at `position + delta` without moving. Negative deltas look back.
    pub fn peek_offset(&self, delta: isize) -> Result<u8, BufferExhausted> {
        let index = self.position as isize + delta;
        if index < 0 || index as usize >= self.buffer.len() {
            return Err(self.exhausted(index));
        }
        Ok(self.buffer[index as usize])
    }

    pub fn peek(&self) -> Result<u8, BufferExhausted> {
        self.peek_offset(0)
    }

    pub fn read_u16_be(&mut self) -> Result<u16, BufferExhausted> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Returns the next `count` bytes as one segment and advances past them.
    pub fn take(&mut self, count: usize) -> Result<&'a [u8], BufferExhausted> {
        if count > self.remaining() {
            let index = self.position.saturating_add(count).saturating_sub(1);
            return Err(self.exhausted(index as isize));
        }
        let segment = &self.buffer[self.position..self.position + count];
        self.position += count;
        Ok(segment)
    }

    pub fn skip(&mut self, count: usize) -> Result<(), BufferExhausted> {
        self.take(count).map(|_| ())
    }

    /// Moves back one byte so the last byte read is read again.
    pub fn step_back(&mut self) -> Result<(), BufferExhausted> {
        if self.position == 0 {
            return Err(self.exhausted(-1));
        }
        self.position -= 1;
        Ok(())
    }

    /// Bytes from the current position to the end.
    pub fn rest(&self) -> &'a [u8] {
        &self.buffer[self.position..]
    }
}
