//! TN5250 protocol constants and codes
//!
//! Command, order, AID and error values of the 5250 data stream as used by
//! the decoder, the keyboard path and the OIA. Values follow lib5250's
//! codes5250.h and RFC 1205.

/// Escape byte that precedes every 5250 command in a record
pub const ESC: u8 = 0x04;

/// 5250 Protocol Commands
pub const CMD_CLEAR_UNIT: u8 = 0x40;
pub const CMD_CLEAR_UNIT_ALTERNATE: u8 = 0x20;
pub const CMD_CLEAR_FORMAT_TABLE: u8 = 0x50;
pub const CMD_WRITE_TO_DISPLAY: u8 = 0x11;
pub const CMD_WRITE_ERROR_CODE: u8 = 0x21;
pub const CMD_READ_INPUT_FIELDS: u8 = 0x42;
pub const CMD_READ_MDT_FIELDS: u8 = 0x52;
pub const CMD_READ_MDT_FIELDS_ALT: u8 = 0x82;
pub const CMD_READ_SCREEN_IMMEDIATE: u8 = 0x62;
pub const CMD_READ_IMMEDIATE: u8 = 0x72;
pub const CMD_ROLL: u8 = 0x23;
pub const CMD_WRITE_STRUCTURED_FIELD: u8 = 0xF3;

/// 5250 Protocol Orders
pub const SOH: u8 = 0x01; // Start of header
pub const RA: u8 = 0x02; // Repeat to address
pub const EA: u8 = 0x03; // Erase to address
pub const SBA: u8 = 0x11; // Set buffer address
pub const IC: u8 = 0x13; // Insert cursor
pub const MC: u8 = 0x14; // Move cursor
pub const SF: u8 = 0x1D; // Start of field

/// Structured field class and types
pub const SF_CLASS_5250: u8 = 0xD9;
pub const SF_5250_QUERY: u8 = 0x70;
pub const SF_5250_QUERY_STATION_STATE: u8 = 0x72;

/// Inbound AID used when replying to a 5250 query
pub const AID_INBOUND_WSF: u8 = 0x88;

/// Record opcodes (RFC 1205 section 3)
pub const OPCODE_NO_OP: u8 = 0x00;
pub const OPCODE_INVITE: u8 = 0x01;
pub const OPCODE_OUTPUT_ONLY: u8 = 0x02;
pub const OPCODE_PUT_GET: u8 = 0x03;
pub const OPCODE_SAVE_SCREEN: u8 = 0x04;
pub const OPCODE_RESTORE_SCREEN: u8 = 0x05;
pub const OPCODE_READ_IMMEDIATE: u8 = 0x06;
pub const OPCODE_READ_SCREEN: u8 = 0x08;
pub const OPCODE_CANCEL_INVITE: u8 = 0x0A;
pub const OPCODE_MESSAGE_LIGHT_ON: u8 = 0x0B;
pub const OPCODE_MESSAGE_LIGHT_OFF: u8 = 0x0C;

/// GDS record type carried in bytes 2-3 of every record
pub const RECORD_TYPE_GDS: u16 = 0x12A0;
pub const RECORD_VARIABLE_HEADER_LEN: u8 = 0x04;

/// Record header flag bits
pub const FLAG_ERR: u8 = 0x80;
pub const FLAG_ATN: u8 = 0x40;
pub const FLAG_SRQ: u8 = 0x04;
pub const FLAG_TRQ: u8 = 0x02;
pub const FLAG_HLP: u8 = 0x01;

/// Write-to-display control character 2
pub const CC2_IC_UNLOCK: u8 = 0x40;
pub const CC2_CLEAR_BLINK: u8 = 0x20;
pub const CC2_SET_BLINK: u8 = 0x10;
pub const CC2_UNLOCK: u8 = 0x08;
pub const CC2_ALARM: u8 = 0x04;
pub const CC2_MESSAGE_OFF: u8 = 0x02;
pub const CC2_MESSAGE_ON: u8 = 0x01;

/// Attention identifiers
pub const AID_ENTER: u8 = 0xF1;
pub const AID_HELP: u8 = 0xF3;
pub const AID_ROLL_DOWN: u8 = 0xF4;
pub const AID_ROLL_UP: u8 = 0xF5;
pub const AID_PRINT: u8 = 0xF6;
pub const AID_CLEAR: u8 = 0xBD;
pub const AID_PF1: u8 = 0x31;
pub const AID_PF13: u8 = 0xB1;
pub const AID_NONE: u8 = 0x00;

/// AID byte for PF1..PF24.
pub fn pf_aid(number: u8) -> Option<u8> {
    match number {
        1..=12 => Some(AID_PF1 + number - 1),
        13..=24 => Some(AID_PF13 + number - 13),
        _ => None,
    }
}

/// Operator Error Codes
/// See 5494 User's Guide (GA27-3960-03) 2.3.4
pub const ERR_HOST_MESSAGE: u8 = 0x00;
pub const ERR_DONT_KNOW: u8 = 0x01;
pub const ERR_BYPASS_FIELD: u8 = 0x04;
pub const ERR_NO_FIELD: u8 = 0x05;
pub const ERR_INVALID_SYSREQ: u8 = 0x06;
pub const ERR_MANDATORY_ENTRY: u8 = 0x07;
pub const ERR_ALPHA_ONLY: u8 = 0x08;
pub const ERR_NUMERIC_ONLY: u8 = 0x09;
pub const ERR_DIGITS_ONLY: u8 = 0x10;
pub const ERR_LAST_SIGNED: u8 = 0x11;
pub const ERR_NO_ROOM: u8 = 0x12;
pub const ERR_EXIT_NOT_VALID: u8 = 0x18;
pub const ERR_NO_FIELD_EXIT: u8 = 0x20;
pub const ERR_BAD_CHAR: u8 = 0x27;

/// Error Messages
pub const MSG_DONT_KNOW: &str = "Keyboard overrun.";
pub const MSG_BYPASS_FIELD: &str = "Entry of data not allowed in this input/output field.";
pub const MSG_NO_FIELD: &str = "Cursor in protected area of display.";
pub const MSG_INVALID_SYSREQ: &str = "Key pressed following System Request key was not valid.";
pub const MSG_MANDATORY_ENTRY: &str = "Mandatory data entry field. Must have data entered.";
pub const MSG_ALPHA_ONLY: &str = "Field requires alphabetic characters.";
pub const MSG_NUMERIC_ONLY: &str = "Field requires numeric characters.";
pub const MSG_DIGITS_ONLY: &str = "Only characters 0 through 9 allowed.";
pub const MSG_LAST_SIGNED: &str = "Key for sign position of field not valid.";
pub const MSG_NO_ROOM: &str = "No room to insert data.";
pub const MSG_EXIT_NOT_VALID: &str = "The key used to exit field not valid.";
pub const MSG_NO_FIELD_EXIT: &str = "Enter key not allowed in field.";
pub const MSG_BAD_CHAR: &str = "Cannot use undefined key.";

/// Data Stream Negative Response Codes
/// From Data Stream Negative Responses (SC30-3533-04) 13.4
pub const DSNR_INVCURSPOS: u8 = 0x22;
pub const DSNR_RAB4WSA: u8 = 0x23;
pub const DSNR_INVSFA: u8 = 0x26;
pub const DSNR_FLDEOD: u8 = 0x28;
pub const DSNR_WRTEOD: u8 = 0x2A;
pub const DSNR_SOHLEN: u8 = 0x2B;
pub const DSNR_ROLLPARM: u8 = 0x2C;
pub const DSNR_NO_ESC: u8 = 0x31;

/// Field Attributes
/// C.f. 5494 Functions Reference (SC30-3533-04), Section 15.6.12.3.
/// Bits 0-2 always set to 001 to identify as an attribute byte.
pub const ATTR_5250_GREEN: u8 = 0x20; // Default
pub const ATTR_5250_WHITE: u8 = 0x22;
pub const ATTR_5250_NONDISP: u8 = 0x27; // Nondisplay
pub const ATTR_5250_RED: u8 = 0x28;
pub const ATTR_5250_NORMAL: u8 = ATTR_5250_GREEN;

/// True for bytes in the 0x20..=0x3F display attribute range.
pub fn is_attribute(byte: u8) -> bool {
    byte & 0xE0 == 0x20
}

/// Helper function to get error message for a given error code
pub fn get_error_message(error_code: u8) -> Option<&'static str> {
    match error_code {
        ERR_DONT_KNOW => Some(MSG_DONT_KNOW),
        ERR_BYPASS_FIELD => Some(MSG_BYPASS_FIELD),
        ERR_NO_FIELD => Some(MSG_NO_FIELD),
        ERR_INVALID_SYSREQ => Some(MSG_INVALID_SYSREQ),
        ERR_MANDATORY_ENTRY => Some(MSG_MANDATORY_ENTRY),
        ERR_ALPHA_ONLY => Some(MSG_ALPHA_ONLY),
        ERR_NUMERIC_ONLY => Some(MSG_NUMERIC_ONLY),
        ERR_DIGITS_ONLY => Some(MSG_DIGITS_ONLY),
        ERR_LAST_SIGNED => Some(MSG_LAST_SIGNED),
        ERR_NO_ROOM => Some(MSG_NO_ROOM),
        ERR_EXIT_NOT_VALID => Some(MSG_EXIT_NOT_VALID),
        ERR_NO_FIELD_EXIT => Some(MSG_NO_FIELD_EXIT),
        ERR_BAD_CHAR => Some(MSG_BAD_CHAR),
        _ => None,
    }
}

/// Enum representation of 5250 protocol commands for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCode {
    ClearUnit = CMD_CLEAR_UNIT as isize,
    ClearUnitAlternate = CMD_CLEAR_UNIT_ALTERNATE as isize,
    ClearFormatTable = CMD_CLEAR_FORMAT_TABLE as isize,
    WriteToDisplay = CMD_WRITE_TO_DISPLAY as isize,
    WriteErrorCode = CMD_WRITE_ERROR_CODE as isize,
    ReadInputFields = CMD_READ_INPUT_FIELDS as isize,
    ReadMdtFields = CMD_READ_MDT_FIELDS as isize,
    ReadMdtFieldsAlt = CMD_READ_MDT_FIELDS_ALT as isize,
    ReadScreenImmediate = CMD_READ_SCREEN_IMMEDIATE as isize,
    ReadImmediate = CMD_READ_IMMEDIATE as isize,
    Roll = CMD_ROLL as isize,
    WriteStructuredField = CMD_WRITE_STRUCTURED_FIELD as isize,
}

impl CommandCode {
    /// Convert a byte value to a CommandCode enum
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            CMD_CLEAR_UNIT => Some(Self::ClearUnit),
            CMD_CLEAR_UNIT_ALTERNATE => Some(Self::ClearUnitAlternate),
            CMD_CLEAR_FORMAT_TABLE => Some(Self::ClearFormatTable),
            CMD_WRITE_TO_DISPLAY => Some(Self::WriteToDisplay),
            CMD_WRITE_ERROR_CODE => Some(Self::WriteErrorCode),
            CMD_READ_INPUT_FIELDS => Some(Self::ReadInputFields),
            CMD_READ_MDT_FIELDS => Some(Self::ReadMdtFields),
            CMD_READ_MDT_FIELDS_ALT => Some(Self::ReadMdtFieldsAlt),
            CMD_READ_SCREEN_IMMEDIATE => Some(Self::ReadScreenImmediate),
            CMD_READ_IMMEDIATE => Some(Self::ReadImmediate),
            CMD_ROLL => Some(Self::Roll),
            CMD_WRITE_STRUCTURED_FIELD => Some(Self::WriteStructuredField),
            _ => None,
        }
    }

    /// Convert CommandCode enum to byte value
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Enum representation of the orders that may appear inside Write To Display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderCode {
    StartOfHeader = SOH as isize,
    RepeatToAddress = RA as isize,
    EraseToAddress = EA as isize,
    SetBufferAddress = SBA as isize,
    InsertCursor = IC as isize,
    MoveCursor = MC as isize,
    StartOfField = SF as isize,
}

impl OrderCode {
    /// Convert a byte value to an OrderCode enum
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            SOH => Some(Self::StartOfHeader),
            RA => Some(Self::RepeatToAddress),
            EA => Some(Self::EraseToAddress),
            SBA => Some(Self::SetBufferAddress),
            IC => Some(Self::InsertCursor),
            MC => Some(Self::MoveCursor),
            SF => Some(Self::StartOfField),
            _ => None,
        }
    }

    /// Convert OrderCode enum to byte value
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_code_conversion() {
        assert_eq!(CommandCode::from_u8(CMD_WRITE_TO_DISPLAY), Some(CommandCode::WriteToDisplay));
        assert_eq!(CommandCode::WriteToDisplay.to_u8(), CMD_WRITE_TO_DISPLAY);
        assert_eq!(CommandCode::from_u8(0xFF), None);
    }

    #[test]
    fn test_order_code_conversion() {
        assert_eq!(OrderCode::from_u8(MC), Some(OrderCode::MoveCursor));
        assert_eq!(OrderCode::StartOfField.to_u8(), SF);
        assert_eq!(OrderCode::from_u8(0xFF), None);
    }

    #[test]
    fn test_pf_aid_ranges() {
        assert_eq!(pf_aid(1), Some(0x31));
        assert_eq!(pf_aid(12), Some(0x3C));
        assert_eq!(pf_aid(13), Some(0xB1));
        assert_eq!(pf_aid(24), Some(0xBC));
        assert_eq!(pf_aid(0), None);
        assert_eq!(pf_aid(25), None);
    }

    #[test]
    fn test_attribute_range() {
        assert!(is_attribute(ATTR_5250_NORMAL));
        assert!(is_attribute(0x3F));
        assert!(!is_attribute(0x40));
        assert!(!is_attribute(SF));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(get_error_message(ERR_NO_FIELD), Some(MSG_NO_FIELD));
        assert_eq!(get_error_message(0xFF), None);
    }
}
