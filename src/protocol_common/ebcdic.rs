//! EBCDIC code page conversion
//!
//! The 5250 data stream carries display text in EBCDIC. Conversion is strict:
//! a byte or character outside the code page is reported as a
//! [`CharacterConversionError`] and never replaced with a placeholder.
//! The null byte (0x00) maps to `'\0'` in both directions since the screen
//! uses it for empty cells.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::error::CharacterConversionError;
use crate::protocol_common::traits::CodePageConverter;

/// First graphic code point of the single-byte EBCDIC range.
const FIRST_GRAPHIC: u8 = 0x40;

/// CP037 (US/Canada) graphics for 0x40..=0xFE.
///
/// 0xFF (EO) and the control range below 0x40 have no displayable mapping.
const CP037_GRAPHICS: [char; 191] = [
    // 0x40-0x4F
    ' ', '\u{00A0}', '\u{00E2}', '\u{00E4}', '\u{00E0}', '\u{00E1}', '\u{00E3}', '\u{00E5}',
    '\u{00E7}', '\u{00F1}', '\u{00A2}', '.', '<', '(', '+', '|',
    // 0x50-0x5F
    '&', '\u{00E9}', '\u{00EA}', '\u{00EB}', '\u{00E8}', '\u{00ED}', '\u{00EE}', '\u{00EF}',
    '\u{00EC}', '\u{00DF}', '!', '$', '*', ')', ';', '\u{00AC}',
    // 0x60-0x6F
    '-', '/', '\u{00C2}', '\u{00C4}', '\u{00C0}', '\u{00C1}', '\u{00C3}', '\u{00C5}',
    '\u{00C7}', '\u{00D1}', '\u{00A6}', ',', '%', '_', '>', '?',
    // 0x70-0x7F
    '\u{00F8}', '\u{00C9}', '\u{00CA}', '\u{00CB}', '\u{00C8}', '\u{00CD}', '\u{00CE}', '\u{00CF}',
    '\u{00CC}', '`', ':', '#', '@', '\'', '=', '"',
    // 0x80-0x8F
    '\u{00D8}', 'a', 'b', 'c', 'd', 'e', 'f', 'g',
    'h', 'i', '\u{00AB}', '\u{00BB}', '\u{00F0}', '\u{00FD}', '\u{00FE}', '\u{00B1}',
    // 0x90-0x9F
    '\u{00B0}', 'j', 'k', 'l', 'm', 'n', 'o', 'p',
    'q', 'r', '\u{00AA}', '\u{00BA}', '\u{00E6}', '\u{00B8}', '\u{00C6}', '\u{00A4}',
    // 0xA0-0xAF
    '\u{00B5}', '~', 's', 't', 'u', 'v', 'w', 'x',
    'y', 'z', '\u{00A1}', '\u{00BF}', '\u{00D0}', '\u{00DD}', '\u{00DE}', '\u{00AE}',
    // 0xB0-0xBF
    '^', '\u{00A3}', '\u{00A5}', '\u{00B7}', '\u{00A9}', '\u{00A7}', '\u{00B6}', '\u{00BC}',
    '\u{00BD}', '\u{00BE}', '[', ']', '\u{00AF}', '\u{00A8}', '\u{00B4}', '\u{00D7}',
    // 0xC0-0xCF
    '{', 'A', 'B', 'C', 'D', 'E', 'F', 'G',
    'H', 'I', '\u{00AD}', '\u{00F4}', '\u{00F6}', '\u{00F2}', '\u{00F3}', '\u{00F5}',
    // 0xD0-0xDF
    '}', 'J', 'K', 'L', 'M', 'N', 'O', 'P',
    'Q', 'R', '\u{00B9}', '\u{00FB}', '\u{00FC}', '\u{00F9}', '\u{00FA}', '\u{00FF}',
    // 0xE0-0xEF
    '\\', '\u{00F7}', 'S', 'T', 'U', 'V', 'W', 'X',
    'Y', 'Z', '\u{00B2}', '\u{00D4}', '\u{00D6}', '\u{00D2}', '\u{00D3}', '\u{00D5}',
    // 0xF0-0xFE
    '0', '1', '2', '3', '4', '5', '6', '7',
    '8', '9', '\u{00B3}', '\u{00DB}', '\u{00DC}', '\u{00D9}', '\u{00DA}',
];

static CP037_REVERSE: Lazy<HashMap<char, u8>> = Lazy::new(|| {
    CP037_GRAPHICS
        .iter()
        .enumerate()
        .map(|(offset, &ch)| (ch, FIRST_GRAPHIC + offset as u8))
        .collect()
});

/// Code page 37, the default for US/Canada IBM i systems.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cp037Converter;

impl Cp037Converter {
    pub const NAME: &'static str = "37";
}

impl CodePageConverter for Cp037Converter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn to_unicode(&self, byte: u8) -> Result<char, CharacterConversionError> {
        match byte {
            0x00 => Ok('\0'),
            FIRST_GRAPHIC..=0xFE => Ok(CP037_GRAPHICS[(byte - FIRST_GRAPHIC) as usize]),
            _ => Err(CharacterConversionError::Unmappable { byte, code_page: Self::NAME }),
        }
    }

    fn to_ebcdic(&self, ch: char) -> Result<u8, CharacterConversionError> {
        if ch == '\0' {
            return Ok(0x00);
        }
        CP037_REVERSE
            .get(&ch)
            .copied()
            .ok_or(CharacterConversionError::Unencodable { ch, code_page: Self::NAME })
    }
}

/// Looks up a converter by code page name ("37", "037", "cp037", "IBM-037").
pub fn converter_for(code_page: &str) -> Option<Arc<dyn CodePageConverter>> {
    let normalized: String = code_page
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    let digits = normalized
        .trim_start_matches("ibm")
        .trim_start_matches("cp")
        .trim_start_matches('0');
    match digits {
        "37" => Some(Arc::new(Cp037Converter)),
        _ => None,
    }
}

/// Converts a whole EBCDIC slice, failing on the first unmappable byte.
pub fn decode_text(
    converter: &dyn CodePageConverter,
    bytes: &[u8],
) -> Result<String, CharacterConversionError> {
    bytes.iter().map(|&b| converter.to_unicode(b)).collect()
}

/// Converts text to EBCDIC, failing on the first unencodable character.
pub fn encode_text(
    converter: &dyn CodePageConverter,
    text: &str,
) -> Result<Vec<u8>, CharacterConversionError> {
    text.chars().map(|c| converter.to_ebcdic(c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_and_digits_map_both_ways() {
        let cp = Cp037Converter;
        assert_eq!(cp.to_unicode(0xC1), Ok('A'));
        assert_eq!(cp.to_unicode(0x81), Ok('a'));
        assert_eq!(cp.to_unicode(0xF0), Ok('0'));
        assert_eq!(cp.to_unicode(0x40), Ok(' '));
        assert_eq!(cp.to_ebcdic('Z'), Ok(0xE9));
        assert_eq!(cp.to_ebcdic('['), Ok(0xBA));
    }

    #[test]
    fn every_graphic_round_trips() {
        let cp = Cp037Converter;
        for byte in FIRST_GRAPHIC..=0xFE {
            let ch = cp.to_unicode(byte).unwrap();
            assert_eq!(cp.to_ebcdic(ch), Ok(byte), "byte 0x{byte:02X}");
        }
    }

    #[test]
    fn controls_are_not_substituted() {
        let cp = Cp037Converter;
        assert!(cp.to_unicode(0x15).is_err());
        assert!(cp.to_unicode(0xFF).is_err());
        assert_eq!(
            cp.to_ebcdic('\u{4E2D}'),
            Err(CharacterConversionError::Unencodable { ch: '\u{4E2D}', code_page: "37" })
        );
    }

    #[test]
    fn null_is_preserved() {
        let cp = Cp037Converter;
        assert_eq!(cp.to_unicode(0x00), Ok('\0'));
        assert_eq!(cp.to_ebcdic('\0'), Ok(0x00));
    }

    #[test]
    fn lookup_accepts_common_spellings() {
        for name in ["37", "037", "cp037", "CP37", "IBM-037"] {
            assert!(converter_for(name).is_some(), "{name}");
        }
        assert!(converter_for("500").is_none());
    }

    #[test]
    fn text_helpers_stop_at_first_failure() {
        let cp = Cp037Converter;
        assert_eq!(decode_text(&cp, &[0xC8, 0xC9]).unwrap(), "HI");
        assert!(decode_text(&cp, &[0xC8, 0x15]).is_err());
        assert_eq!(encode_text(&cp, "OK").unwrap(), vec![0xD6, 0xD2]);
    }
}
