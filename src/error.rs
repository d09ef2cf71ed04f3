//! Error taxonomy for the TN5250E engine
//!
//! Each component reports its own error type; [`Tn5250Error`] groups them for
//! the session surface. Running out of input in the middle of a telnet
//! command is not an error: it is reported as
//! [`StreamStatus::NeedMoreData`](crate::lib5250::telnet::StreamStatus).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::lib5250::codes;

/// Result alias used at the session surface.
pub type Result<T> = std::result::Result<T, Tn5250Error>;

/// Top-level error type for TN5250E operations
#[derive(Debug, Error)]
pub enum Tn5250Error {
    /// Telnet layer violations
    #[error("telnet protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// 5250 data stream decoding failures
    #[error("data stream error: {0}")]
    Decode(#[from] StreamDecodeError),
    /// Reads past the end of a buffer outside of order decoding
    #[error(transparent)]
    Buffer(#[from] BufferExhausted),
    /// Code page conversion failures outside of order decoding
    #[error(transparent)]
    Conversion(#[from] CharacterConversionError),
    /// Configuration loading and validation
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Failures reported by a [`Transport`](crate::protocol_common::traits::Transport)
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

/// A read at or past the end of a byte stream, or before its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("read outside stream bounds: index {index}, length {length}")]
pub struct BufferExhausted {
    pub index: isize,
    pub length: usize,
}

/// Telnet framing violations. Fatal to the chunk being processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown telnet command 0x{0:02X} after IAC")]
    UnknownCommand(u8),
    #[error("unterminated subnegotiation for option {option}")]
    UnterminatedSubnegotiation { option: u8, interrupted_by: Option<u8> },
    #[error("subnegotiation for option {option} exceeds {limit} bytes")]
    OversizedSubnegotiation { option: u8, limit: usize },
    #[error("IAC byte inside terminal-type payload")]
    IacInTerminalType,
    #[error("record of {length} bytes exceeds limit of {limit}")]
    OversizedRecord { length: usize, limit: usize },
}

/// Screen and field model violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScreenError {
    #[error("position ({row}, {col}) outside {rows}x{cols} screen")]
    PositionOutOfRange { row: usize, col: usize, rows: usize, cols: usize },
    #[error("address {address} outside screen of {size} cells")]
    AddressOutOfRange { address: usize, size: usize },
    #[error("field at {start} with length {length} extends past end of screen ({size} cells)")]
    FieldPastEnd { start: usize, length: usize, size: usize },
    #[error("zero-length field at {start}")]
    EmptyField { start: usize },
    #[error("invalid field format word 0x{ffw1:02X}")]
    InvalidFieldFormat { ffw1: u8 },
}

/// What went wrong inside a 5250 order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeErrorKind {
    #[error(transparent)]
    Truncated(#[from] BufferExhausted),
    #[error(transparent)]
    Screen(#[from] ScreenError),
    #[error("row/col address ({row}, {col}) not valid")]
    InvalidAddress { row: u8, col: u8 },
    #[error("repeat-to-address target {target} is before current address {current}")]
    RepeatBeforeCurrent { target: usize, current: usize },
    #[error("erase-to-address target {target} is before current address {current}")]
    EraseBeforeCurrent { target: usize, current: usize },
    #[error("write past end of display at address {address}")]
    WritePastEnd { address: usize },
    #[error("start-of-field attribute 0x{0:02X} not valid")]
    InvalidFieldAttribute(u8),
    #[error("start-of-header length {0} not valid")]
    InvalidHeaderLength(u8),
    #[error("expected escape, found 0x{0:02X}")]
    MissingEscape(u8),
    #[error("unsupported command 0x{0:02X}")]
    UnknownCommand(u8),
    #[error("unknown order 0x{0:02X}")]
    UnknownOrder(u8),
    #[error("structured field declares {declared} bytes, {available} available")]
    StructuredFieldLength { declared: usize, available: usize },
    #[error("record header not valid: {0}")]
    InvalidRecord(&'static str),
    #[error("roll parameter not valid")]
    InvalidRollParameter,
    /// A reply the host asked for holds a character the code page cannot encode
    #[error(transparent)]
    Conversion(#[from] CharacterConversionError),
}

impl DecodeErrorKind {
    /// The 5250 negative response code a host would expect for this failure.
    pub fn negative_response_code(&self) -> Option<u8> {
        match self {
            DecodeErrorKind::InvalidAddress { .. } => Some(codes::DSNR_INVCURSPOS),
            DecodeErrorKind::Screen(ScreenError::PositionOutOfRange { .. })
            | DecodeErrorKind::Screen(ScreenError::AddressOutOfRange { .. }) => {
                Some(codes::DSNR_INVCURSPOS)
            }
            DecodeErrorKind::RepeatBeforeCurrent { .. }
            | DecodeErrorKind::EraseBeforeCurrent { .. } => Some(codes::DSNR_RAB4WSA),
            DecodeErrorKind::Screen(ScreenError::FieldPastEnd { .. }) => Some(codes::DSNR_FLDEOD),
            DecodeErrorKind::Screen(_) | DecodeErrorKind::InvalidFieldAttribute(_) => {
                Some(codes::DSNR_INVSFA)
            }
            DecodeErrorKind::WritePastEnd { .. } => Some(codes::DSNR_WRTEOD),
            DecodeErrorKind::InvalidHeaderLength(_) => Some(codes::DSNR_SOHLEN),
            DecodeErrorKind::MissingEscape(_) => Some(codes::DSNR_NO_ESC),
            DecodeErrorKind::InvalidRollParameter => Some(codes::DSNR_ROLLPARM),
            _ => None,
        }
    }
}

/// A malformed or unsupported 5250 order. Aborts the current chunk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("order 0x{order_byte:02X} at offset {offset}: {kind}")]
pub struct StreamDecodeError {
    pub order_byte: u8,
    pub offset: usize,
    pub kind: DecodeErrorKind,
}

impl StreamDecodeError {
    pub fn new(order_byte: u8, offset: usize, kind: impl Into<DecodeErrorKind>) -> Self {
        Self { order_byte, offset, kind: kind.into() }
    }
}

/// A character with no mapping in the active code page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CharacterConversionError {
    #[error("EBCDIC byte 0x{byte:02X} has no mapping in code page {code_page}")]
    Unmappable { byte: u8, code_page: &'static str },
    #[error("character {ch:?} cannot be encoded in code page {code_page}")]
    Unencodable { ch: char, code_page: &'static str },
}

/// Keyboard input refused by the field rules or the OIA.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldValidationError {
    #[error("cursor in protected area of display")]
    NoField,
    #[error("entry of data not allowed in this field")]
    Bypass,
    #[error("field requires alphabetic characters, got {0:?}")]
    AlphaOnly(char),
    #[error("field requires numeric characters, got {0:?}")]
    NumericOnly(char),
    #[error("only characters 0 through 9 allowed, got {0:?}")]
    DigitsOnly(char),
    #[error("sign {0:?} not valid at this position")]
    SignPosition(char),
    #[error("no room to insert data")]
    NoRoom,
    #[error("mandatory entry field at address {0} is blank")]
    MandatoryEntry(usize),
    #[error("field exit required before leaving field at address {0}")]
    FieldExitRequired(usize),
    #[error("keyboard entry not allowed in this field")]
    DataNotAllowed,
    #[error("character {0:?} cannot be sent in the active code page")]
    Unencodable(char),
    #[error("key not valid after system request")]
    InvalidSystemRequest,
    #[error("cursor already at start of field")]
    AtFieldStart,
}

impl FieldValidationError {
    /// Operator error code shown in the OIA for this rejection.
    pub fn error_code(&self) -> u8 {
        match self {
            FieldValidationError::NoField => codes::ERR_NO_FIELD,
            FieldValidationError::Bypass => codes::ERR_BYPASS_FIELD,
            FieldValidationError::AlphaOnly(_) => codes::ERR_ALPHA_ONLY,
            FieldValidationError::NumericOnly(_) => codes::ERR_NUMERIC_ONLY,
            FieldValidationError::DigitsOnly(_) => codes::ERR_DIGITS_ONLY,
            FieldValidationError::SignPosition(_) => codes::ERR_LAST_SIGNED,
            FieldValidationError::NoRoom => codes::ERR_NO_ROOM,
            FieldValidationError::MandatoryEntry(_) => codes::ERR_MANDATORY_ENTRY,
            FieldValidationError::FieldExitRequired(_) => codes::ERR_EXIT_NOT_VALID,
            FieldValidationError::DataNotAllowed => codes::ERR_BYPASS_FIELD,
            FieldValidationError::Unencodable(_) => codes::ERR_BAD_CHAR,
            FieldValidationError::InvalidSystemRequest => codes::ERR_INVALID_SYSREQ,
            FieldValidationError::AtFieldStart => codes::ERR_NO_FIELD,
        }
    }
}

/// Why a keyboard submission was cut short.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputRejection {
    #[error("unrecognised mnemonic [{0}]")]
    InvalidMnemonic(String),
    #[error(transparent)]
    Field(#[from] FieldValidationError),
    /// Field data that cannot be encoded for the host; the AID was not sent
    #[error(transparent)]
    Conversion(#[from] CharacterConversionError),
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot access configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_errors_map_to_negative_responses() {
        let err = StreamDecodeError::new(
            codes::RA,
            12,
            DecodeErrorKind::RepeatBeforeCurrent { target: 3, current: 10 },
        );
        assert_eq!(err.kind.negative_response_code(), Some(codes::DSNR_RAB4WSA));
        assert_eq!(
            err.to_string(),
            "order 0x02 at offset 12: repeat-to-address target 3 is before current address 10"
        );
    }

    #[test]
    fn truncation_converts_into_decode_kind() {
        let kind: DecodeErrorKind = BufferExhausted { index: 4, length: 4 }.into();
        assert!(matches!(kind, DecodeErrorKind::Truncated(_)));
        assert_eq!(kind.negative_response_code(), None);
    }

    #[test]
    fn field_rejections_carry_operator_codes() {
        assert_eq!(FieldValidationError::NumericOnly('a').error_code(), codes::ERR_NUMERIC_ONLY);
        assert_eq!(FieldValidationError::MandatoryEntry(0).error_code(), codes::ERR_MANDATORY_ENTRY);
        assert!(codes::get_error_message(FieldValidationError::NoRoom.error_code()).is_some());
    }

    #[test]
    fn component_errors_lift_into_top_level() {
        let err: Tn5250Error = ProtocolError::IacInTerminalType.into();
        assert!(matches!(err, Tn5250Error::Protocol(_)));
        assert_eq!(err.to_string(), "telnet protocol error: IAC byte inside terminal-type payload");
    }
}
