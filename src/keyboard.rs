//! Keyboard input for 5250 sessions
//!
//! Turns submitted text into key tokens and applies them to the screen in
//! strict left-to-right order. Literal characters go into the input field
//! under the cursor; `[name]` mnemonics select function and editing keys
//! (`[[` and `]]` stand for literal brackets). While the keyboard is locked
//! only the keys that can unlock it run; everything else is queued and
//! replayed once the host unlocks the keyboard.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::{FieldValidationError, InputRejection};
use crate::lib5250::codes::{
    pf_aid, AID_CLEAR, AID_ENTER, AID_HELP, AID_PRINT, AID_ROLL_DOWN, AID_ROLL_UP,
    CMD_READ_INPUT_FIELDS, ERR_BAD_CHAR, FLAG_ATN, FLAG_SRQ, OPCODE_NO_OP, OPCODE_PUT_GET,
};
use crate::lib5250::oia::{KeyboardState, LockReason};
use crate::lib5250::protocol::{build_record, FieldSelection, ScreenState};
use crate::protocol_common::traits::CodePageConverter;

/// Named keys accepted inside `[...]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Enter,
    Tab,
    Backtab,
    /// PF1..PF24
    Pf(u8),
    PageUp,
    PageDown,
    Clear,
    Help,
    Print,
    SysReq,
    Attn,
    Reset,
    FieldExit,
    Home,
    Insert,
    EraseEof,
    Backspace,
    Up,
    Down,
    Left,
    Right,
}

impl Mnemonic {
    /// Look up a mnemonic by name, ignoring case.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        let key = match name.as_str() {
            "enter" => Mnemonic::Enter,
            "tab" => Mnemonic::Tab,
            "backtab" => Mnemonic::Backtab,
            "pgup" => Mnemonic::PageUp,
            "pgdown" => Mnemonic::PageDown,
            "clear" => Mnemonic::Clear,
            "help" => Mnemonic::Help,
            "print" => Mnemonic::Print,
            "sysreq" => Mnemonic::SysReq,
            "attn" => Mnemonic::Attn,
            "reset" => Mnemonic::Reset,
            "fldext" => Mnemonic::FieldExit,
            "home" => Mnemonic::Home,
            "insert" => Mnemonic::Insert,
            "eraseeof" => Mnemonic::EraseEof,
            "backspace" => Mnemonic::Backspace,
            "up" => Mnemonic::Up,
            "down" => Mnemonic::Down,
            "left" => Mnemonic::Left,
            "right" => Mnemonic::Right,
            other => {
                let number: u8 = other.strip_prefix("pf")?.parse().ok()?;
                pf_aid(number)?;
                Mnemonic::Pf(number)
            }
        };
        Some(key)
    }

    /// AID byte for keys that send the input fields to the host.
    pub fn data_aid(self) -> Option<u8> {
        match self {
            Mnemonic::Enter => Some(AID_ENTER),
            Mnemonic::Pf(number) => pf_aid(number),
            Mnemonic::PageUp => Some(AID_ROLL_DOWN),
            Mnemonic::PageDown => Some(AID_ROLL_UP),
            _ => None,
        }
    }

    /// AID byte for keys that send only the cursor position.
    pub fn short_aid(self) -> Option<u8> {
        match self {
            Mnemonic::Clear => Some(AID_CLEAR),
            Mnemonic::Help => Some(AID_HELP),
            Mnemonic::Print => Some(AID_PRINT),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyToken {
    Char(char),
    Key(Mnemonic),
}

/// Split submitted text into tokens. Fails on an unknown or unterminated mnemonic.
pub fn tokenize(text: &str) -> Result<Vec<KeyToken>, InputRejection> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '[' if chars.peek() == Some(&'[') => {
                chars.next();
                tokens.push(KeyToken::Char('['));
            }
            '[' => {
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                match Mnemonic::parse(&name) {
                    Some(key) if closed => tokens.push(KeyToken::Key(key)),
                    _ => return Err(InputRejection::InvalidMnemonic(name)),
                }
            }
            ']' if chars.peek() == Some(&']') => {
                chars.next();
                tokens.push(KeyToken::Char(']'));
            }
            other => tokens.push(KeyToken::Char(other)),
        }
    }
    Ok(tokens)
}

/// Outcome of one submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitReport {
    /// Records for the host, unframed
    pub outbound: Vec<Vec<u8>>,
    /// Tokens waiting for the keyboard to unlock
    pub buffered: usize,
    /// Why processing stopped early
    pub rejection: Option<InputRejection>,
}

pub struct KeyboardInputProcessor {
    converter: Arc<dyn CodePageConverter>,
    pending: VecDeque<KeyToken>,
    /// Start of a field-exit-required field that has been typed into
    fer_pending: Option<usize>,
    /// The last character went into the final cell of a field
    field_filled: bool,
    /// Format table revision the field state above refers to
    format_revision: u64,
    sysreq_response: Option<char>,
}

impl std::fmt::Debug for KeyboardInputProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyboardInputProcessor")
            .field("pending", &self.pending)
            .field("fer_pending", &self.fer_pending)
            .field("field_filled", &self.field_filled)
            .finish()
    }
}

impl KeyboardInputProcessor {
    pub fn new(converter: Arc<dyn CodePageConverter>) -> Self {
        Self {
            converter,
            pending: VecDeque::new(),
            fer_pending: None,
            field_filled: false,
            format_revision: 0,
            sysreq_response: None,
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Apply `text` to the screen.
    pub fn submit(&mut self, text: &str, screen: &mut ScreenState) -> SubmitReport {
        let mut report = SubmitReport::default();
        match tokenize(text) {
            Ok(tokens) => {
                for token in tokens {
                    if let Err(rejection) = self.feed(token, screen, &mut report.outbound) {
                        report.rejection = Some(rejection);
                        break;
                    }
                }
            }
            Err(rejection) => {
                log::debug!("rejected submission: {rejection}");
                screen.oia.set_error(ERR_BAD_CHAR);
                report.rejection = Some(rejection);
            }
        }
        self.finish(screen, report)
    }

    /// Run queued tokens if the keyboard is unlocked.
    pub fn replay_pending(&mut self, screen: &mut ScreenState) -> SubmitReport {
        let mut report = SubmitReport::default();
        if let Err(rejection) = self.replay(screen, &mut report.outbound) {
            report.rejection = Some(rejection);
        }
        self.finish(screen, report)
    }

    fn finish(&mut self, screen: &mut ScreenState, mut report: SubmitReport) -> SubmitReport {
        report.buffered = self.pending.len();
        screen.oia.set_keys_buffered(!self.pending.is_empty());
        report
    }

    fn feed(
        &mut self,
        token: KeyToken,
        screen: &mut ScreenState,
        outbound: &mut Vec<Vec<u8>>,
    ) -> Result<(), InputRejection> {
        self.replay(screen, outbound)?;
        let state = screen.oia.state();
        if state == KeyboardState::Unlocked {
            self.apply(token, screen, outbound)
        } else if runs_while_locked(state, token) {
            self.apply_locked(token, screen, outbound)
        } else {
            log::trace!("keyboard {state:?}, buffering {token:?}");
            self.pending.push_back(token);
            Ok(())
        }
    }

    fn replay(&mut self, screen: &mut ScreenState, outbound: &mut Vec<Vec<u8>>) -> Result<(), InputRejection> {
        while screen.oia.is_unlocked() {
            let Some(token) = self.pending.pop_front() else {
                break;
            };
            log::trace!("replaying {token:?}");
            if let Err(rejection) = self.apply(token, screen, outbound) {
                self.pending.clear();
                return Err(rejection);
            }
        }
        Ok(())
    }

    fn apply_locked(
        &mut self,
        token: KeyToken,
        screen: &mut ScreenState,
        outbound: &mut Vec<Vec<u8>>,
    ) -> Result<(), InputRejection> {
        let in_sysreq = screen.oia.state() == KeyboardState::Locked(LockReason::SystemRequest);
        match token {
            KeyToken::Char(ch) if in_sysreq => {
                if ch.is_ascii_digit() {
                    self.sysreq_response = Some(ch);
                    Ok(())
                } else {
                    Err(key_error(screen, FieldValidationError::InvalidSystemRequest))
                }
            }
            KeyToken::Key(Mnemonic::Enter) if in_sysreq => {
                let Some(digit) = self.sysreq_response.take() else {
                    return Err(key_error(screen, FieldValidationError::InvalidSystemRequest));
                };
                let byte = self
                    .converter
                    .to_ebcdic(digit)
                    .map_err(|_| key_error(screen, FieldValidationError::Unencodable(digit)))?;
                log::debug!("system request option {digit}");
                outbound.push(build_record(FLAG_SRQ, OPCODE_NO_OP, &[byte]));
                screen.oia.unlock();
                Ok(())
            }
            other => self.apply(other, screen, outbound),
        }
    }

    fn apply(
        &mut self,
        token: KeyToken,
        screen: &mut ScreenState,
        outbound: &mut Vec<Vec<u8>>,
    ) -> Result<(), InputRejection> {
        self.track_format(screen);
        let key = match token {
            KeyToken::Char(ch) => return self.insert_char(ch, screen, outbound),
            KeyToken::Key(key) => key,
        };
        if let Some(aid) = key.data_aid() {
            return self.send_data_aid(aid, screen, outbound);
        }
        if let Some(aid) = key.short_aid() {
            let (row, col) = screen.buffer.cursor();
            outbound.push(build_record(0, OPCODE_PUT_GET, &[row as u8 + 1, col as u8 + 1, aid]));
            self.after_aid(screen);
            return Ok(());
        }

        let cursor = screen.buffer.cursor_address();
        let size = screen.buffer.size();
        let cols = screen.buffer.cols();
        match key {
            Mnemonic::SysReq => {
                self.sysreq_response = None;
                screen.oia.lock(LockReason::SystemRequest);
            }
            Mnemonic::Attn => outbound.push(build_record(FLAG_ATN, OPCODE_NO_OP, &[])),
            Mnemonic::Reset => {
                if screen.oia.reset() {
                    self.sysreq_response = None;
                }
            }
            Mnemonic::Insert => screen.oia.toggle_insert_mode(),
            Mnemonic::Tab => {
                self.check_field_exit(screen)?;
                if let Some(next) = screen.fields.advance_to_next_field(cursor).map(|f| f.start()) {
                    self.move_cursor(screen, next);
                }
            }
            Mnemonic::Backtab => {
                self.check_field_exit(screen)?;
                let target = match screen.fields.field_containing(cursor) {
                    Some(field) if !field.is_bypass() && cursor > field.start() => Some(field.start()),
                    _ => screen.fields.previous_field(cursor).map(|f| f.start()),
                };
                if let Some(target) = target {
                    self.move_cursor(screen, target);
                }
            }
            Mnemonic::Home => {
                self.check_field_exit(screen)?;
                let home = screen.fields.first_input_field().map_or(0, |f| f.start());
                self.move_cursor(screen, home);
            }
            Mnemonic::Up => {
                self.check_field_exit(screen)?;
                self.move_cursor(screen, (cursor + size - cols) % size);
            }
            Mnemonic::Down => {
                self.check_field_exit(screen)?;
                self.move_cursor(screen, (cursor + cols) % size);
            }
            Mnemonic::Left => self.move_cursor(screen, (cursor + size - 1) % size),
            Mnemonic::Backspace => {
                let (start, offset) = field_under_cursor(screen)?;
                if offset == 0 {
                    return Err(key_error(screen, FieldValidationError::AtFieldStart));
                }
                if let Some(field) = screen.fields.get_mut(start) {
                    field.delete_char(offset - 1);
                    field.set_modified(true);
                }
                screen.refresh_field(start);
                self.move_cursor(screen, cursor - 1);
            }
            Mnemonic::Right => self.move_cursor(screen, (cursor + 1) % size),
            Mnemonic::EraseEof => {
                let (start, offset) = field_under_cursor(screen)?;
                if let Some(field) = screen.fields.get_mut(start) {
                    field.erase_from(offset);
                    field.set_modified(true);
                }
                screen.refresh_field(start);
                self.field_filled = false;
            }
            Mnemonic::FieldExit => self.field_exit(screen)?,
            _ => {}
        }
        Ok(())
    }

    fn insert_char(
        &mut self,
        ch: char,
        screen: &mut ScreenState,
        outbound: &mut Vec<Vec<u8>>,
    ) -> Result<(), InputRejection> {
        let cursor = screen.buffer.cursor_address();
        let field = screen
            .fields
            .field_containing(cursor)
            .ok_or(FieldValidationError::NoField)?;
        let start = field.start();
        let offset = cursor - start;
        let length = field.length();
        if self.field_filled && offset + 1 == length {
            log::trace!("field at {start} is full, dropping {ch:?}");
            return Ok(());
        }

        let ch = field.validate_char(offset, ch)?;
        self.converter
            .to_ebcdic(ch)
            .map_err(|_| FieldValidationError::Unencodable(ch))?;

        let insert_mode = screen.oia.insert_mode();
        let field = screen
            .fields
            .get_mut(start)
            .ok_or(FieldValidationError::NoField)?;
        if insert_mode {
            field.insert_char(offset, ch)?;
        } else {
            field.put_char(offset, ch);
        }
        field.set_modified(true);
        let format = *field.format();
        screen.refresh_field(start);

        if format.field_exit_required {
            self.fer_pending = Some(start);
        }
        if offset + 1 < length {
            self.move_cursor(screen, cursor + 1);
        } else if format.auto_enter {
            self.fer_pending = None;
            log::debug!("auto-enter field at {start} filled");
            self.check_mandatory(screen)?;
            self.send_aid(AID_ENTER, screen, outbound)?;
        } else {
            self.field_filled = true;
        }
        Ok(())
    }

    fn field_exit(&mut self, screen: &mut ScreenState) -> Result<(), InputRejection> {
        let (start, offset) = field_under_cursor(screen)?;
        if let Some(field) = screen.fields.get_mut(start) {
            if !self.field_filled {
                field.erase_from(offset);
            }
            field.right_adjust();
            field.set_modified(true);
        }
        screen.refresh_field(start);
        self.fer_pending = None;
        let next = screen.fields.advance_to_next_field(start).map_or(start, |f| f.start());
        self.move_cursor(screen, next);
        Ok(())
    }

    fn send_data_aid(
        &mut self,
        aid: u8,
        screen: &mut ScreenState,
        outbound: &mut Vec<Vec<u8>>,
    ) -> Result<(), InputRejection> {
        self.check_field_exit(screen)?;
        self.check_mandatory(screen)?;
        self.send_aid(aid, screen, outbound)
    }

    /// Compose the inbound record for `aid`. Field data the code page cannot
    /// encode refuses the AID and leaves the keyboard in error.
    fn send_aid(
        &mut self,
        aid: u8,
        screen: &mut ScreenState,
        outbound: &mut Vec<Vec<u8>>,
    ) -> Result<(), InputRejection> {
        let selection = if screen.read_command == Some(CMD_READ_INPUT_FIELDS) {
            FieldSelection::AllInput
        } else {
            FieldSelection::Modified
        };
        let payload = match screen.field_response(aid, selection, self.converter.as_ref()) {
            Ok(payload) => payload,
            Err(err) => {
                log::debug!("AID 0x{aid:02X} refused: {err}");
                screen.oia.set_error(ERR_BAD_CHAR);
                return Err(err.into());
            }
        };
        log::debug!("sending AID 0x{aid:02X} with {} bytes", payload.len());
        outbound.push(build_record(0, OPCODE_PUT_GET, &payload));
        self.after_aid(screen);
        Ok(())
    }

    /// Drop field-exit and full-field state left over from a format table
    /// the host has since replaced.
    fn track_format(&mut self, screen: &ScreenState) {
        let revision = screen.fields.revision();
        if revision != self.format_revision {
            if let Some(start) = self.fer_pending.take() {
                log::trace!("format table changed, field exit for {start} no longer pending");
            }
            self.field_filled = false;
            self.format_revision = revision;
        }
    }

    fn after_aid(&mut self, screen: &mut ScreenState) {
        screen.read_command = None;
        screen.oia.lock(LockReason::HostOutput);
        self.fer_pending = None;
        self.field_filled = false;
    }

    fn check_field_exit(&self, screen: &mut ScreenState) -> Result<(), InputRejection> {
        match self.fer_pending {
            Some(start) => Err(key_error(screen, FieldValidationError::FieldExitRequired(start))),
            None => Ok(()),
        }
    }

    /// Refuse an AID while a mandatory-enter field is blank; the cursor moves to it.
    fn check_mandatory(&mut self, screen: &mut ScreenState) -> Result<(), InputRejection> {
        let blank = screen
            .fields
            .input_fields()
            .find(|f| f.format().mandatory_enter && f.is_blank())
            .map(|f| f.start());
        match blank {
            Some(start) => {
                self.move_cursor(screen, start);
                Err(key_error(screen, FieldValidationError::MandatoryEntry(start)))
            }
            None => Ok(()),
        }
    }

    fn move_cursor(&mut self, screen: &mut ScreenState, address: usize) {
        if screen.buffer.set_cursor_address(address).is_ok() {
            self.field_filled = false;
        }
    }
}

/// Keys that act even though the keyboard is not unlocked.
fn runs_while_locked(state: KeyboardState, token: KeyToken) -> bool {
    match (state, token) {
        (_, KeyToken::Key(Mnemonic::Attn)) => true,
        (KeyboardState::Locked(LockReason::SystemRequest), KeyToken::Key(key)) => {
            matches!(key, Mnemonic::Reset | Mnemonic::Enter)
        }
        (KeyboardState::Locked(LockReason::SystemRequest), KeyToken::Char(_)) => true,
        (KeyboardState::Locked(LockReason::ErrorCode(_)), KeyToken::Key(key)) => {
            matches!(key, Mnemonic::SysReq | Mnemonic::Reset)
        }
        (_, KeyToken::Key(Mnemonic::SysReq)) => true,
        _ => false,
    }
}

fn field_under_cursor(screen: &mut ScreenState) -> Result<(usize, usize), InputRejection> {
    let cursor = screen.buffer.cursor_address();
    match screen.fields.field_containing(cursor) {
        Some(field) if !field.is_bypass() => Ok((field.start(), cursor - field.start())),
        Some(_) => Err(key_error(screen, FieldValidationError::Bypass)),
        None => Err(key_error(screen, FieldValidationError::NoField)),
    }
}

/// A key refused by the field rules: lock with the operator error and ring.
fn key_error(screen: &mut ScreenState, error: FieldValidationError) -> InputRejection {
    log::debug!("key rejected: {error}");
    screen.oia.set_error(error.error_code());
    error.into()
}
